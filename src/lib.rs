pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod exchange;
pub mod message;
pub mod renderer;
pub mod runtime;
pub mod script;
pub mod sync;
pub mod trace;
pub mod transport;

pub use config::Config;
pub use context::RenderContext;
pub use env::{ContextId, EnvironmentKind, ExecutionOutcome, HostEnvironment, ScriptedEnvironment, SessionIdentity};
pub use error::SyncError;
pub use exchange::{Exchange, SubscriptionId, DEFAULT_TOPIC};
pub use message::{Message, MessageKind, Payload};
pub use renderer::{AutoRenderer, NullRenderer, Renderer, RendererKind, SurfaceRenderer};
pub use runtime::{BackgroundLoop, LoopHandle};
pub use script::{parse_script, ScriptRunner, ScriptStep};
pub use sync::{detect, Divergence, UpdateBatch, UpdateController};
pub use trace::{TraceArena, TraceError, TraceId, TraceIndex, TraceNode};
pub use transport::{ClientSink, MemorySink, MemorySurfaceFactory, SurfaceFactory, Transport};
