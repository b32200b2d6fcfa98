//! In-process client surfaces.
//!
//! [`MemorySink`] records everything delivered to it and lets the caller play
//! the client's part by emitting inbound payloads. The replay CLI uses it with
//! stdout echo; tests use it to assert on delivered traffic.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::sink::{ClientSink, InboundHandler, ObserverId, SinkError, SurfaceFactory, SurfaceOptions};
use crate::message::{self, Message};

pub struct MemorySink {
    options: SurfaceOptions,
    echo: bool,
    attached: Mutex<bool>,
    sent: Mutex<Vec<String>>,
    observers: Mutex<Vec<(ObserverId, InboundHandler)>>,
    next_observer: AtomicU64,
    delivered: Notify,
}

impl MemorySink {
    pub fn new(options: SurfaceOptions) -> Self {
        Self {
            options,
            echo: false,
            attached: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(0),
            delivered: Notify::new(),
        }
    }

    /// Also write every delivered payload to stdout, one per line.
    pub fn with_stdout_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    pub fn is_attached(&self) -> bool {
        *self.attached.lock()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Raw payloads delivered so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Delivered payloads that decode as messages.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .filter_map(|raw| message::decode(raw).ok())
            .collect()
    }

    /// Act as the client: hand `raw` to every registered observer.
    pub fn emit(&self, raw: impl Into<String>) {
        let raw = raw.into();
        let handlers: Vec<InboundHandler> = self
            .observers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(raw.clone());
        }
    }

    /// Wait until at least `count` payloads have been delivered.
    pub async fn wait_for_sent(&self, count: usize) {
        loop {
            let notified = self.delivered.notified();
            if self.sent.lock().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl ClientSink for MemorySink {
    fn attach(&self) -> Result<(), SinkError> {
        *self.attached.lock() = true;
        Ok(())
    }

    fn observe(&self, handler: InboundHandler) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, handler));
        id
    }

    fn unobserve(&self, observer: ObserverId) {
        self.observers.lock().retain(|(id, _)| *id != observer);
    }

    fn send(&self, payload: &str) -> Result<(), SinkError> {
        if self.echo {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{payload}")?;
        }
        self.sent.lock().push(payload.to_string());
        self.delivered.notify_waiters();
        Ok(())
    }
}

/// Hands out [`MemorySink`]s and remembers every one it created.
#[derive(Default)]
pub struct MemorySurfaceFactory {
    echo: bool,
    created: Mutex<Vec<Arc<MemorySink>>>,
}

impl MemorySurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdout_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn surfaces(&self) -> Vec<Arc<MemorySink>> {
        self.created.lock().clone()
    }

    pub fn latest(&self) -> Option<Arc<MemorySink>> {
        self.created.lock().last().cloned()
    }
}

impl SurfaceFactory for MemorySurfaceFactory {
    fn create(&self, options: &SurfaceOptions) -> Result<Arc<dyn ClientSink>, SinkError> {
        let mut sink = MemorySink::new(options.clone());
        if self.echo {
            sink = sink.with_stdout_echo();
        }
        let sink = Arc::new(sink);
        self.created.lock().push(sink.clone());
        Ok(sink)
    }
}
