//! Shared test utilities for tracesync
//!
//! - A renderer harness wired to an arena, a scripted host and memory sinks
//! - A client model that folds delivered messages into the visible trace path

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tracesync::message::{self, NodeAttr, Payload};
use tracesync::transport::MemorySink;
use tracesync::{
    Config, EnvironmentKind, Exchange, LoopHandle, MemorySurfaceFactory, Message, RenderContext,
    ScriptedEnvironment, SurfaceRenderer, TraceArena, TraceId, TraceIndex, DEFAULT_TOPIC,
};

pub struct Harness {
    pub arena: Arc<TraceArena>,
    pub env: Arc<ScriptedEnvironment>,
    pub exchange: Arc<Exchange>,
    pub factory: Arc<MemorySurfaceFactory>,
    pub renderer: SurfaceRenderer,
}

impl Harness {
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let arena = Arc::new(TraceArena::new());
        let env = Arc::new(ScriptedEnvironment::new(EnvironmentKind::Notebook, "cell-1"));
        let exchange = Arc::new(Exchange::new());
        let factory = Arc::new(MemorySurfaceFactory::new());
        let ctx = RenderContext::new(exchange.clone(), arena.clone(), env.clone(), LoopHandle::current());
        let renderer = SurfaceRenderer::new(&ctx, factory.clone(), &config);

        Self {
            arena,
            env,
            exchange,
            factory,
            renderer,
        }
    }

    /// Record node `id` with one output attribute.
    pub fn node(&self, id: TraceId, parent: Option<TraceId>) {
        self.arena.insert_with_id(id, parent);
        self.arena
            .record_output(id, NodeAttr::text(format!("node-{id}")))
            .expect("node was just inserted");
    }

    /// Publish a trace message for `id` the way a producer would.
    pub fn trace(&self, id: TraceId) {
        let parent = self.arena.lookup(id).ok().and_then(|node| node.parent);
        let message = Message::trace(id, parent, Some(NodeAttr::text(format!("node-{id}"))));
        self.exchange.publish(&message, DEFAULT_TOPIC);
    }

    pub fn publish(&self, message: Message) {
        self.exchange.publish(&message, DEFAULT_TOPIC);
    }

    pub fn surface(&self) -> Arc<MemorySink> {
        self.factory.latest().expect("a client surface should have been created")
    }

    /// Send `ClientReady` from the current surface.
    pub fn client_ready(&self) {
        self.surface().emit(ready_payload());
    }
}

pub fn ready_payload() -> String {
    message::encode(&Message::new(Payload::ClientReady)).expect("ready message encodes")
}

/// Trace ids a client that appends traces and clears on reset would show.
/// Consecutive messages for the same node collapse into one entry.
pub fn client_view(messages: &[Message]) -> Vec<TraceId> {
    let mut view: Vec<TraceId> = Vec::new();
    for message in messages {
        match &message.payload {
            Payload::ResetDisplay => view.clear(),
            Payload::Trace(trace) if view.last() != Some(&trace.trace_id) => view.push(trace.trace_id),
            _ => {}
        }
    }
    view
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
