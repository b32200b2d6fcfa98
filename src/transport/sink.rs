use std::sync::Arc;

use serde::Deserialize;

/// Callback a client sink invokes, on its own thread, with raw inbound data.
pub type InboundHandler = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write to client surface: {0}")]
    Io(#[from] std::io::Error),
}

/// Initial geometry hints for a freshly created client surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SurfaceOptions {
    pub initial_width: String,
    pub initial_height: String,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            initial_width: "100%".to_string(),
            initial_height: "auto".to_string(),
        }
    }
}

/// The displaying end of the protocol (a widget, a terminal, a socket...).
pub trait ClientSink: Send + Sync {
    /// Make the surface visible to the user.
    fn attach(&self) -> Result<(), SinkError>;

    /// Register a handler for data the client sends back.
    fn observe(&self, handler: InboundHandler) -> ObserverId;

    fn unobserve(&self, observer: ObserverId);

    /// Deliver one encoded message.
    fn send(&self, payload: &str) -> Result<(), SinkError>;
}

/// Creates client surfaces on demand (e.g. one per execution context).
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, options: &SurfaceOptions) -> Result<Arc<dyn ClientSink>, SinkError>;
}
