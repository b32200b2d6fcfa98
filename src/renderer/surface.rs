//! Renderer that drives a client surface through the async transport.
//!
//! All controller work happens on one driver task on the background loop.
//! Exchange callbacks, completion hooks and public methods only post
//! [`Command`]s to it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::debug::DebugCapture;
use super::Renderer;
use crate::config::Config;
use crate::context::RenderContext;
use crate::env::{CompletionHook, ExecutionOutcome};
use crate::exchange::{Exchange, SubscriptionId};
use crate::message::{self, Message, Payload};
use crate::sync::UpdateController;
use crate::trace::TraceId;
use crate::transport::{ClientSink, InboundPoster, ObserverId, SurfaceFactory, SurfaceOptions, Transport};

enum Command {
    Update(Message),
    ExecutionCompleted(ExecutionOutcome),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct Shared {
    debug: Mutex<DebugCapture>,
    last_trace_id: Mutex<Option<TraceId>>,
}

pub struct SurfaceRenderer {
    commands: mpsc::UnboundedSender<Command>,
    exchange: Arc<Exchange>,
    subscription: Mutex<Option<SubscriptionId>>,
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SurfaceRenderer {
    pub fn new(ctx: &RenderContext, factory: Arc<dyn SurfaceFactory>, config: &Config) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        if config.debug_capture {
            shared.debug.lock().enable();
        }

        let hook_commands = commands.clone();
        let controller = UpdateController::new(ctx.trace_index.clone(), ctx.environment.clone())
            .with_completion_hook(Box::new(move || -> CompletionHook {
                let commands = hook_commands.clone();
                Box::new(move |outcome: ExecutionOutcome| {
                    if commands.send(Command::ExecutionCompleted(outcome)).is_err() {
                        tracing::debug!("renderer gone, dropping execution completion");
                    }
                })
            }));

        let transport = Transport::start(&ctx.loop_handle, ctx.exchange.clone(), config.topic.clone());
        let driver = Driver {
            controller,
            inbound: transport.inbound_poster(),
            transport,
            factory,
            options: config.surface.clone(),
            surface: None,
            shared: shared.clone(),
        };
        let driver = ctx.loop_handle.spawn(driver.run(command_rx));

        let exchange_commands = commands.clone();
        let subscription = ctx.exchange.subscribe(move |message: &Message, _topic: &str| {
            if matches!(
                message.payload,
                Payload::Metric(_) | Payload::OutputRequest | Payload::Trace(_)
            ) {
                if exchange_commands.send(Command::Update(message.clone())).is_err() {
                    tracing::debug!("renderer stopped, dropping exchange message");
                }
            }
        });

        Self {
            commands,
            exchange: ctx.exchange.clone(),
            subscription: Mutex::new(Some(subscription)),
            shared,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Start capturing outgoing messages, discarding any earlier capture.
    pub fn enable_debug(&self) {
        self.shared.debug.lock().enable();
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.shared.debug.lock().is_enabled()
    }

    pub fn clear_debug_data(&self) {
        self.shared.debug.lock().clear();
    }

    /// Export captured messages as pretty JSON.
    pub fn debug_data(&self) -> Option<String> {
        self.shared.debug.lock().export()
    }

    pub fn last_trace_id(&self) -> Option<TraceId> {
        *self.shared.last_trace_id.lock()
    }

    /// Wait until every command posted so far has been applied and its batch
    /// enqueued for delivery.
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Detach from the exchange and ask the driver to close the transport.
    pub fn shutdown(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            self.exchange.unsubscribe(subscription);
            let _ = self.commands.send(Command::Shutdown);
            tracing::debug!("renderer shutting down");
        }
    }

    /// Shut down and wait for the driver and both pumps to stop.
    pub async fn closed(&self) {
        self.shutdown();
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "renderer driver failed");
            }
        }
    }
}

impl Renderer for SurfaceRenderer {
    fn update(&self, message: Message, _topic: &str) {
        if self.commands.send(Command::Update(message)).is_err() {
            tracing::debug!("renderer stopped, dropping update");
        }
    }
}

impl Drop for SurfaceRenderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SurfaceRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceRenderer")
            .field("last_trace_id", &self.last_trace_id())
            .field("subscribed", &self.subscription.lock().is_some())
            .finish()
    }
}

struct AttachedSurface {
    sink: Arc<dyn ClientSink>,
    observer: ObserverId,
}

struct Driver {
    controller: UpdateController,
    transport: Transport,
    inbound: InboundPoster,
    factory: Arc<dyn SurfaceFactory>,
    options: SurfaceOptions,
    surface: Option<AttachedSurface>,
    shared: Arc<Shared>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Update(message) => self.apply(message),
                Command::ExecutionCompleted(outcome) => {
                    let message = Message::execution_completed(self.controller.last_trace_id(), outcome.is_err);
                    tracing::debug!(is_err = outcome.is_err, "execution completed");
                    self.apply(message);
                }
                Command::Flush(reply) => {
                    let _ = reply.send(());
                }
                Command::Shutdown => break,
            }
        }

        self.detach();
        self.transport.closed().await;
        tracing::debug!("renderer driver stopped");
    }

    fn apply(&mut self, message: Message) {
        let batch = self.controller.apply(message);
        if batch.need_new_surface {
            self.replace_surface();
        }

        for message in &batch.outgoing {
            if matches!(message.payload, Payload::ExecutionStarted) {
                self.echo_inbound(message);
            }
            self.shared.debug.lock().record(message);
        }
        if !self.transport.enqueue(batch.outgoing) {
            tracing::warn!("outbound queue closed, dropping batch");
        }
        *self.shared.last_trace_id.lock() = self.controller.last_trace_id();
    }

    /// Let exchange subscribers see the start as if the client had sent it.
    fn echo_inbound(&self, message: &Message) {
        match message::encode(message) {
            Ok(raw) => {
                self.inbound.post(raw);
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode execution start"),
        }
    }

    fn detach(&mut self) {
        if let Some(previous) = self.surface.take() {
            previous.sink.unobserve(previous.observer);
            tracing::debug!("client surface detached");
        }
    }

    fn replace_surface(&mut self) {
        self.detach();

        let sink = match self.factory.create(&self.options) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!(error = %e, "failed to create client surface");
                return;
            }
        };
        let observer = sink.observe(self.inbound.handler());
        if let Err(e) = sink.attach() {
            tracing::warn!(error = %e, "failed to attach client surface");
        }
        self.transport.set_sink(sink.clone());
        self.surface = Some(AttachedSurface { sink, observer });
        tracing::debug!(
            width = %self.options.initial_width,
            height = %self.options.initial_height,
            "client surface attached"
        );
    }
}
