use std::sync::Arc;

use crate::env::HostEnvironment;
use crate::exchange::Exchange;
use crate::runtime::LoopHandle;
use crate::trace::TraceIndex;

/// Shared collaborators a renderer is built from.
///
/// Built once by the host and cloned into every renderer.
#[derive(Clone)]
pub struct RenderContext {
    pub exchange: Arc<Exchange>,
    pub trace_index: Arc<dyn TraceIndex>,
    pub environment: Arc<dyn HostEnvironment>,
    pub loop_handle: LoopHandle,
}

impl RenderContext {
    pub fn new(
        exchange: Arc<Exchange>,
        trace_index: Arc<dyn TraceIndex>,
        environment: Arc<dyn HostEnvironment>,
        loop_handle: LoopHandle,
    ) -> Self {
        Self {
            exchange,
            trace_index,
            environment,
            loop_handle,
        }
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("exchange", &self.exchange)
            .field("environment", &self.environment.kind())
            .field("loop_handle", &self.loop_handle)
            .finish()
    }
}
