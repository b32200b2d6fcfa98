//! Host environment seam: session identity and execution completion hooks.

use parking_lot::Mutex;

/// Identity of the host's execution context (a notebook cell, a REPL turn...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque (context, sequence) pair. Any change invalidates displayed state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    pub context: ContextId,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub is_err: bool,
}

/// One-shot callback the host runs when the current execution finishes.
pub type CompletionHook = Box<dyn FnOnce(ExecutionOutcome) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentKind {
    /// Interactive host able to display a client surface.
    Notebook,
    Terminal,
    Unknown,
}

pub trait HostEnvironment: Send + Sync {
    fn kind(&self) -> EnvironmentKind;

    fn current_session(&self) -> SessionIdentity;

    /// Register `hook` to run once when the current execution completes.
    /// Returns the context the hook was registered against.
    fn register_completion_hook(&self, hook: CompletionHook) -> ContextId;
}

struct ScriptedState {
    session: SessionIdentity,
    hooks: Vec<CompletionHook>,
}

/// Host environment driven explicitly by the caller.
///
/// Used by the replay CLI and tests: the caller moves between contexts and
/// signals completion; registered hooks fire exactly once.
pub struct ScriptedEnvironment {
    kind: EnvironmentKind,
    state: Mutex<ScriptedState>,
}

impl ScriptedEnvironment {
    pub fn new(kind: EnvironmentKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            state: Mutex::new(ScriptedState {
                session: SessionIdentity {
                    context: ContextId::new(context),
                    seq: 0,
                },
                hooks: Vec::new(),
            }),
        }
    }

    /// Move to a new execution context, bumping the sequence number.
    pub fn enter_context(&self, context: impl Into<String>) {
        let mut state = self.state.lock();
        state.session = SessionIdentity {
            context: ContextId::new(context),
            seq: state.session.seq + 1,
        };
    }

    /// Finish the current execution, firing every pending hook once.
    pub fn complete(&self, is_err: bool) -> usize {
        // Hooks run outside the lock; they may call back into the environment.
        let hooks = std::mem::take(&mut self.state.lock().hooks);
        let fired = hooks.len();
        for hook in hooks {
            hook(ExecutionOutcome { is_err });
        }
        fired
    }

    pub fn pending_hooks(&self) -> usize {
        self.state.lock().hooks.len()
    }
}

impl HostEnvironment for ScriptedEnvironment {
    fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    fn current_session(&self) -> SessionIdentity {
        self.state.lock().session.clone()
    }

    fn register_completion_hook(&self, hook: CompletionHook) -> ContextId {
        let mut state = self.state.lock();
        state.hooks.push(hook);
        state.session.context.clone()
    }
}
