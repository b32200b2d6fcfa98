//! Scripted replay: drive the full engine from a JSONL description of
//! producer, host and client events.
//!
//! Each line is one step, tagged by `op`:
//!
//! ```text
//! {"op":"node","id":1,"input":[{"text":"Hello"}]}
//! {"op":"node","id":2,"parent":1,"output":[{"text":" world"}]}
//! {"op":"ready"}
//! {"op":"trace","id":1}
//! {"op":"trace","id":2}
//! {"op":"metric","name":"tokens","value":12}
//! {"op":"complete","is_err":false}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::sync::Arc;

use serde::Deserialize;

use crate::config::Config;
use crate::context::RenderContext;
use crate::env::{EnvironmentKind, ScriptedEnvironment};
use crate::error::{Result, SyncError};
use crate::exchange::Exchange;
use crate::message::{self, Message, MetricValue, NodeAttr, Payload};
use crate::renderer::SurfaceRenderer;
use crate::runtime::LoopHandle;
use crate::trace::{TraceArena, TraceId, TraceIndex};
use crate::transport::MemorySurfaceFactory;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Record a trace node in the arena.
    Node {
        id: TraceId,
        #[serde(default)]
        parent: Option<TraceId>,
        #[serde(default)]
        input: Vec<NodeAttr>,
        #[serde(default)]
        output: Vec<NodeAttr>,
    },
    /// Producer publishes a trace message. `parent` defaults to the arena's.
    Trace {
        id: TraceId,
        #[serde(default)]
        parent: Option<TraceId>,
        #[serde(default)]
        attr: Option<NodeAttr>,
    },
    Metric {
        name: String,
        value: MetricValue,
    },
    /// Client reports ready on its current surface.
    Ready,
    /// Client asks for a full replay.
    RequestOutput,
    /// Host finishes the current execution.
    Complete {
        #[serde(default)]
        is_err: bool,
    },
    /// Host moves to a new execution context.
    Session {
        context: String,
    },
    /// Trace producer forgets a node.
    Evict {
        id: TraceId,
    },
}

/// A parsed step with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub line: usize,
    pub step: ScriptStep,
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>> {
    let mut steps = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step = serde_json::from_str::<ScriptStep>(trimmed).map_err(|e| SyncError::Script {
            line: idx + 1,
            message: e.to_string(),
        })?;
        steps.push(ScriptLine { line: idx + 1, step });
    }
    Ok(steps)
}

/// Owns an arena, a scripted host and a surface renderer wired to in-memory
/// client surfaces, and applies script steps to them in order.
pub struct ScriptRunner {
    arena: Arc<TraceArena>,
    environment: Arc<ScriptedEnvironment>,
    exchange: Arc<Exchange>,
    factory: Arc<MemorySurfaceFactory>,
    renderer: SurfaceRenderer,
    topic: String,
    ready_pending: bool,
}

impl ScriptRunner {
    pub fn new(loop_handle: LoopHandle, config: &Config, factory: Arc<MemorySurfaceFactory>) -> Self {
        let arena = Arc::new(TraceArena::new());
        let environment = Arc::new(ScriptedEnvironment::new(EnvironmentKind::Notebook, "context-0"));
        let exchange = Arc::new(Exchange::new());
        let ctx = RenderContext::new(exchange.clone(), arena.clone(), environment.clone(), loop_handle);
        let renderer = SurfaceRenderer::new(&ctx, factory.clone(), config);

        Self {
            arena,
            environment,
            exchange,
            factory,
            renderer,
            topic: config.topic.clone(),
            ready_pending: false,
        }
    }

    pub fn arena(&self) -> &TraceArena {
        &self.arena
    }

    pub fn renderer(&self) -> &SurfaceRenderer {
        &self.renderer
    }

    pub fn factory(&self) -> &MemorySurfaceFactory {
        &self.factory
    }

    pub async fn run(&mut self, steps: &[ScriptLine]) -> Result<()> {
        for step in steps {
            self.step(step).await?;
        }
        Ok(())
    }

    /// Apply one step and wait until the renderer has processed it.
    pub async fn step(&mut self, script_line: &ScriptLine) -> Result<()> {
        let line = script_line.line;
        tracing::debug!(line, step = ?script_line.step, "script step");

        match &script_line.step {
            ScriptStep::Node {
                id,
                parent,
                input,
                output,
            } => {
                if let Some(parent) = parent {
                    if !self.arena.contains(*parent) {
                        return Err(SyncError::Script {
                            line,
                            message: format!("parent {parent} of node {id} is not recorded"),
                        });
                    }
                }
                self.arena.insert_with_id(*id, *parent);
                for attr in input {
                    self.arena.record_input(*id, attr.clone())?;
                }
                for attr in output {
                    self.arena.record_output(*id, attr.clone())?;
                }
            }
            ScriptStep::Trace { id, parent, attr } => {
                let parent = parent.or_else(|| self.arena.lookup(*id).ok().and_then(|node| node.parent));
                self.publish(Message::trace(*id, parent, attr.clone()));
            }
            ScriptStep::Metric { name, value } => {
                self.publish(Message::metric(name.clone(), value.clone()));
            }
            ScriptStep::Ready => self.ready_pending = true,
            ScriptStep::RequestOutput => self.publish(Message::new(Payload::OutputRequest)),
            ScriptStep::Complete { is_err } => {
                if self.environment.complete(*is_err) == 0 {
                    tracing::debug!(line, "complete without a running execution");
                }
            }
            ScriptStep::Session { context } => self.environment.enter_context(context.clone()),
            ScriptStep::Evict { id } => {
                if self.arena.evict(*id).is_none() {
                    tracing::warn!(line, trace_id = id, "evicting unknown trace node");
                }
            }
        }

        self.renderer.settled().await;
        self.deliver_ready()
    }

    /// Close the renderer, wait for delivery to finish and return the debug
    /// export, if capture was on.
    pub async fn finish(self) -> Option<String> {
        self.renderer.closed().await;
        if self.renderer.is_debug_enabled() {
            self.renderer.debug_data()
        } else {
            None
        }
    }

    fn publish(&self, message: Message) {
        self.exchange.publish(&message, &self.topic);
    }

    /// The client can only answer once a surface exists.
    fn deliver_ready(&mut self) -> Result<()> {
        if !self.ready_pending {
            return Ok(());
        }
        if let Some(surface) = self.factory.latest() {
            surface.emit(message::encode(&Message::new(Payload::ClientReady))?);
            self.ready_pending = false;
        }
        Ok(())
    }
}
