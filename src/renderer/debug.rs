use chrono::Utc;
use serde::Serialize;

use crate::message::Message;

/// Copy of every outgoing message, independent of the retained log.
#[derive(Debug, Default)]
pub struct DebugCapture {
    enabled: bool,
    messages: Vec<Message>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugExport<'a> {
    timestamp: String,
    message_count: usize,
    messages: &'a [Message],
}

impl DebugCapture {
    /// Start capturing. Anything captured earlier is discarded.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.messages.clear();
        tracing::debug!("debug capture enabled");
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn record(&mut self, message: &Message) {
        if self.enabled {
            self.messages.push(message.clone());
        }
    }

    /// Pretty JSON `{timestamp, messageCount, messages}`, or `None` when there
    /// is nothing to export.
    pub fn export(&self) -> Option<String> {
        if !self.enabled {
            tracing::warn!("debug capture is not enabled; call enable_debug() first");
            return None;
        }
        if self.messages.is_empty() {
            tracing::warn!("no debug messages captured");
            return None;
        }

        let export = DebugExport {
            timestamp: Utc::now().to_rfc3339(),
            message_count: self.messages.len(),
            messages: &self.messages,
        };
        match serde_json::to_string_pretty(&export) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize debug capture");
                None
            }
        }
    }
}
