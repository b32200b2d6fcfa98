//! Crate-level error type.

use crate::config::ConfigError;
use crate::message::CodecError;
use crate::trace::TraceError;
use crate::transport::SinkError;

/// Error for callers that drive the engine end to end (the replay runner).
///
/// The sync core itself never fails: lookup problems fall back to a full
/// replay and transport problems are logged at the pump boundary.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Trace node lookup failed.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// Message could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Client surface failure.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed replay script line.
    #[error("script line {line}: {message}")]
    Script { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;
