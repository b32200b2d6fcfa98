use std::sync::Arc;

use crate::env::{CompletionHook, ContextId, ExecutionOutcome, HostEnvironment, SessionIdentity};
use crate::message::{Message, Payload, TracePayload};
use crate::sync::divergence::{self, Divergence};
use crate::trace::{TraceId, TraceIndex};

/// Builds the one-shot hook registered each time an execution starts.
pub type HookFactory = Box<dyn Fn() -> CompletionHook + Send + Sync>;

fn noop_hook() -> CompletionHook {
    Box::new(|_: ExecutionOutcome| {})
}

/// Result of one [`UpdateController::apply`] call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateBatch {
    /// Messages to deliver, in order, as one contiguous run.
    pub outgoing: Vec<Message>,
    /// The client surface must be replaced before delivering `outgoing`.
    pub need_new_surface: bool,
}

/// Stateful core deciding what the client surface must receive.
///
/// Owns the retained log: every message currently reflected on the client,
/// whose trace messages always form one ancestor chain ending at the last
/// displayed node. Each `apply` call is one atomic step (`&mut self`).
///
/// Within a call the rules run in a fixed order: session boundary, then
/// completion/start, then divergence, then explicit replay.
pub struct UpdateController {
    index: Arc<dyn TraceIndex>,
    environment: Arc<dyn HostEnvironment>,
    hook_factory: HookFactory,
    log: Vec<Message>,
    /// What the last completion replayed; served to replay requests while idle.
    settled: Vec<Message>,
    running: bool,
    /// A completion hook is registered with the host and has not fired.
    hook_pending: bool,
    last_session: Option<SessionIdentity>,
    last_context: Option<ContextId>,
    last_trace_id: Option<TraceId>,
    /// Whether the client view holds trace content since its last reset.
    view_has_trace: bool,
}

impl UpdateController {
    pub fn new(index: Arc<dyn TraceIndex>, environment: Arc<dyn HostEnvironment>) -> Self {
        Self {
            index,
            environment,
            hook_factory: Box::new(noop_hook),
            log: Vec::new(),
            settled: Vec::new(),
            running: false,
            hook_pending: false,
            last_session: None,
            last_context: None,
            last_trace_id: None,
            view_has_trace: false,
        }
    }

    /// Set the hook registered with the host whenever an execution starts.
    pub fn with_completion_hook(mut self, factory: HookFactory) -> Self {
        self.hook_factory = factory;
        self
    }

    pub fn log(&self) -> &[Message] {
        &self.log
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn last_trace_id(&self) -> Option<TraceId> {
        self.last_trace_id
    }

    pub fn apply(&mut self, message: Message) -> UpdateBatch {
        let mut batch = UpdateBatch::default();

        if matches!(message.payload, Payload::Metric(_)) && !self.running {
            return batch;
        }

        self.check_session(&mut batch);

        match &message.payload {
            Payload::ExecutionCompleted(completed) => {
                self.finish_execution(completed.is_err, &mut batch);
                return batch;
            }
            Payload::Trace(_) if !self.running => self.start_execution(&mut batch),
            _ => {}
        }

        if let Payload::Trace(trace) = &message.payload {
            self.reconcile(trace, &mut batch);
        }

        if matches!(message.payload, Payload::OutputRequest) {
            tracing::debug!(retained = self.log.len(), "replaying on client request");
            self.emit(&mut batch, Message::reset());
            if self.log.is_empty() {
                for message in self.settled.clone() {
                    self.emit(&mut batch, message);
                }
            } else {
                self.replay_log(&mut batch);
            }
            return batch;
        }

        match &message.payload {
            Payload::Trace(trace) => {
                self.last_trace_id = Some(trace.trace_id);
                self.log.push(message.clone());
            }
            Payload::Metric(_) => self.log.push(message.clone()),
            _ => {}
        }
        self.emit(&mut batch, message);
        batch
    }

    fn check_session(&mut self, batch: &mut UpdateBatch) {
        let current = self.environment.current_session();
        if self.last_session.as_ref() == Some(&current) {
            return;
        }

        tracing::debug!(
            context = %current.context,
            seq = current.seq,
            "session boundary, dropping retained state"
        );
        self.log.clear();
        self.settled.clear();
        self.running = false;
        self.last_trace_id = None;
        self.last_session = Some(current);
        batch.need_new_surface = true;
        self.emit(batch, Message::reset());
    }

    fn finish_execution(&mut self, is_err: bool, batch: &mut UpdateBatch) {
        tracing::debug!(is_err, retained = self.log.len(), "execution completed");
        self.running = false;
        self.hook_pending = false;

        // A repeated completion re-sends what the previous one settled on.
        let replay = if self.log.is_empty() {
            std::mem::take(&mut self.settled)
        } else {
            std::mem::take(&mut self.log)
        };
        self.emit(batch, Message::reset());
        for message in &replay {
            self.emit(batch, message.clone());
        }
        self.emit(batch, Message::status(if is_err { "Error" } else { "Done" }));
        self.settled = replay;
    }

    fn start_execution(&mut self, batch: &mut UpdateBatch) {
        tracing::debug!(retained = self.log.len(), "execution started");
        self.running = true;
        self.settled.clear();
        self.emit(batch, Message::new(Payload::ExecutionStarted));
        self.emit(batch, Message::status("Running"));

        // A session boundary ends the run without firing the host's hook.
        let context = if self.hook_pending {
            tracing::debug!("completion hook still pending, not registering another");
            self.environment.current_session().context
        } else {
            self.hook_pending = true;
            self.environment
                .register_completion_hook((self.hook_factory)())
        };
        if self.last_context.as_ref() != Some(&context) {
            tracing::info!(
                previous = ?self.last_context,
                context = %context,
                "execution context changed, new surface needed"
            );
            batch.need_new_surface = true;
        }
        self.last_context = Some(context);
    }

    fn reconcile(&mut self, trace: &TracePayload, batch: &mut UpdateBatch) {
        let Some(displayed) = self.log.iter().rev().find_map(Message::as_trace) else {
            self.anchor(trace, batch);
            return;
        };
        let displayed = displayed.trace_id;

        match divergence::detect(self.index.as_ref(), trace, &self.log) {
            Divergence::Continues => {
                // Fill in any ancestors between the displayed node and this one.
                for message in self.ancestor_messages(trace.trace_id, Some(displayed)) {
                    self.log.push(message.clone());
                    self.emit(batch, message);
                }
            }
            Divergence::Truncate(index) => {
                tracing::debug!(shared_ancestor = index, "diverged, truncating");
                self.log.truncate(index + 1);
                let shared = self.log[index].as_trace().map(|t| t.trace_id);
                let bridge = self.ancestor_messages(trace.trace_id, shared);
                self.log.extend(bridge);
                self.emit(batch, Message::reset());
                self.replay_log(batch);
            }
            Divergence::FullReset => {
                tracing::debug!("diverged without shared ancestor, replaying from root");
                self.log = self.ancestor_messages(trace.trace_id, None);
                self.emit(batch, Message::reset());
                self.replay_log(batch);
            }
        }
    }

    /// First trace step after an empty log: make the view show exactly the
    /// ancestors of the incoming node.
    fn anchor(&mut self, trace: &TracePayload, batch: &mut UpdateBatch) {
        let chain = self.ancestor_messages(trace.trace_id, None);
        if self.view_has_trace {
            self.emit(batch, Message::reset());
            self.log.extend(chain);
            self.replay_log(batch);
        } else {
            for message in chain {
                self.log.push(message.clone());
                self.emit(batch, message);
            }
        }
    }

    /// Trace messages for the ancestors of `trace_id`, root first, each node's
    /// input attributes before its output attributes.
    ///
    /// With `after`, only ancestors strictly below that node are produced; if
    /// it is not an ancestor, nothing is.
    fn ancestor_messages(&self, trace_id: TraceId, after: Option<TraceId>) -> Vec<Message> {
        let mut path = match self.index.path(trace_id) {
            Ok(path) => path,
            Err(err) => {
                tracing::debug!(error = %err, "cannot reconstruct trace path");
                return Vec::new();
            }
        };
        path.pop();

        let start = match after {
            None => 0,
            Some(after) => match path.iter().position(|node| node.id == after) {
                Some(position) => position + 1,
                None => return Vec::new(),
            },
        };

        let mut messages = Vec::new();
        for node in &path[start..] {
            if node.input.is_empty() && node.output.is_empty() {
                messages.push(Message::trace(node.id, node.parent, None));
                continue;
            }
            for attr in node.input.iter().chain(node.output.iter()) {
                messages.push(Message::trace(node.id, node.parent, Some(attr.clone())));
            }
        }
        messages
    }

    fn replay_log(&mut self, batch: &mut UpdateBatch) {
        for message in self.log.clone() {
            self.emit(batch, message);
        }
    }

    fn emit(&mut self, batch: &mut UpdateBatch, message: Message) {
        match message.payload {
            Payload::ResetDisplay => self.view_has_trace = false,
            Payload::Trace(_) => self.view_has_trace = true,
            _ => {}
        }
        batch.outgoing.push(message);
    }
}
