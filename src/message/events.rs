use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::trace::TraceId;

/// Process-wide message id source. Ids only ever increase.
static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> u64 {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Name of the metric carrying execution status.
pub const STATUS_METRIC: &str = "status";

/// A single unit exchanged between the trace producer, the sync engine and the
/// client surface.
///
/// On the wire this is a flat object: `{"kind": ..., "id": ..., ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Closed set of message variants, tagged by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Payload {
    #[serde(rename = "TraceMessage")]
    Trace(TracePayload),

    #[serde(rename = "ResetDisplayMessage")]
    ResetDisplay,

    #[serde(rename = "MetricMessage")]
    Metric(MetricPayload),

    #[serde(rename = "ExecutionStartedMessage")]
    ExecutionStarted,

    #[serde(rename = "ExecutionCompletedMessage")]
    ExecutionCompleted(ExecutionCompletedPayload),

    #[serde(rename = "ClientReadyMessage")]
    ClientReady,

    #[serde(rename = "ClientReadyAckMessage")]
    ClientReadyAck,

    #[serde(rename = "OutputRequestMessage")]
    OutputRequest,

    #[serde(rename = "HeartbeatMessage")]
    Heartbeat,
}

/// Opaque attribute recorded on a trace node (text, role markers, captures...).
///
/// Its layout belongs to the client surface; the engine only moves it around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAttr(pub serde_json::Value);

impl NodeAttr {
    pub fn text(value: impl Into<String>) -> Self {
        Self(serde_json::json!({ "text": value.into() }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePayload {
    pub trace_id: TraceId,
    #[serde(default)]
    pub parent_trace_id: Option<TraceId>,
    #[serde(default)]
    pub node_attr: Option<NodeAttr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Series(Vec<f64>),
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub name: String,
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCompletedPayload {
    #[serde(default)]
    pub last_trace_id: Option<TraceId>,
    pub is_err: bool,
}

/// Fieldless discriminant of [`Payload`], matching the wire `kind` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Trace,
    ResetDisplay,
    Metric,
    ExecutionStarted,
    ExecutionCompleted,
    ClientReady,
    ClientReadyAck,
    OutputRequest,
    Heartbeat,
}

impl MessageKind {
    pub const ALL: [MessageKind; 9] = [
        MessageKind::Trace,
        MessageKind::ResetDisplay,
        MessageKind::Metric,
        MessageKind::ExecutionStarted,
        MessageKind::ExecutionCompleted,
        MessageKind::ClientReady,
        MessageKind::ClientReadyAck,
        MessageKind::OutputRequest,
        MessageKind::Heartbeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Trace => "TraceMessage",
            MessageKind::ResetDisplay => "ResetDisplayMessage",
            MessageKind::Metric => "MetricMessage",
            MessageKind::ExecutionStarted => "ExecutionStartedMessage",
            MessageKind::ExecutionCompleted => "ExecutionCompletedMessage",
            MessageKind::ClientReady => "ClientReadyMessage",
            MessageKind::ClientReadyAck => "ClientReadyAckMessage",
            MessageKind::OutputRequest => "OutputRequestMessage",
            MessageKind::Heartbeat => "HeartbeatMessage",
        }
    }

    /// Parse a wire discriminant. Unknown kinds yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TraceMessage" => Some(MessageKind::Trace),
            "ResetDisplayMessage" => Some(MessageKind::ResetDisplay),
            "MetricMessage" => Some(MessageKind::Metric),
            "ExecutionStartedMessage" => Some(MessageKind::ExecutionStarted),
            "ExecutionCompletedMessage" => Some(MessageKind::ExecutionCompleted),
            "ClientReadyMessage" => Some(MessageKind::ClientReady),
            "ClientReadyAckMessage" => Some(MessageKind::ClientReadyAck),
            "OutputRequestMessage" => Some(MessageKind::OutputRequest),
            "HeartbeatMessage" => Some(MessageKind::Heartbeat),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Trace(_) => MessageKind::Trace,
            Payload::ResetDisplay => MessageKind::ResetDisplay,
            Payload::Metric(_) => MessageKind::Metric,
            Payload::ExecutionStarted => MessageKind::ExecutionStarted,
            Payload::ExecutionCompleted(_) => MessageKind::ExecutionCompleted,
            Payload::ClientReady => MessageKind::ClientReady,
            Payload::ClientReadyAck => MessageKind::ClientReadyAck,
            Payload::OutputRequest => MessageKind::OutputRequest,
            Payload::Heartbeat => MessageKind::Heartbeat,
        }
    }
}

impl Message {
    /// Wrap a payload with a fresh id.
    pub fn new(payload: Payload) -> Self {
        Self {
            id: next_message_id(),
            payload,
        }
    }

    pub fn trace(trace_id: TraceId, parent_trace_id: Option<TraceId>, node_attr: Option<NodeAttr>) -> Self {
        Self::new(Payload::Trace(TracePayload {
            trace_id,
            parent_trace_id,
            node_attr,
        }))
    }

    pub fn reset() -> Self {
        Self::new(Payload::ResetDisplay)
    }

    pub fn metric(name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        Self::new(Payload::Metric(MetricPayload {
            name: name.into(),
            value: value.into(),
        }))
    }

    /// Status metric (`"Running"`, `"Done"`, `"Error"`).
    pub fn status(value: &str) -> Self {
        Self::metric(STATUS_METRIC, value)
    }

    pub fn execution_completed(last_trace_id: Option<TraceId>, is_err: bool) -> Self {
        Self::new(Payload::ExecutionCompleted(ExecutionCompletedPayload {
            last_trace_id,
            is_err,
        }))
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn as_trace(&self) -> Option<&TracePayload> {
        match &self.payload {
            Payload::Trace(trace) => Some(trace),
            _ => None,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self.payload, Payload::ResetDisplay)
    }
}
