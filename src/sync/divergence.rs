//! Decides whether an incoming trace step still continues the displayed path.

use crate::message::{Message, TracePayload};
use crate::trace::TraceIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    /// The incoming step extends the displayed path.
    Continues,
    /// The displayed path must be cut back to the retained-log entry at this
    /// index (the deepest shared ancestor) and replayed.
    Truncate(usize),
    /// No shared ancestor is retained; the display must be rebuilt from the
    /// root.
    FullReset,
}

impl Divergence {
    pub fn is_diverged(&self) -> bool {
        !matches!(self, Divergence::Continues)
    }

    /// `None` for both "no divergence" and "full reset".
    pub fn shared_ancestor_index(&self) -> Option<usize> {
        match self {
            Divergence::Truncate(index) => Some(*index),
            _ => None,
        }
    }
}

/// Compare `incoming` against the retained log.
///
/// A log without trace messages never diverges; the caller anchors the first
/// displayed step itself. Lookup failures are absorbed as [`Divergence::FullReset`].
pub fn detect(index: &dyn TraceIndex, incoming: &TracePayload, log: &[Message]) -> Divergence {
    let Some(last) = log.iter().rev().find_map(Message::as_trace) else {
        return Divergence::Continues;
    };

    let path = match index.path(incoming.trace_id) {
        Ok(path) => path,
        Err(err) => {
            tracing::debug!(error = %err, "incoming trace node unresolvable, full reset");
            return Divergence::FullReset;
        }
    };
    if let Err(err) = index.lookup(last.trace_id) {
        tracing::debug!(error = %err, "displayed trace node unresolvable, full reset");
        return Divergence::FullReset;
    }

    if path.iter().any(|node| node.id == last.trace_id) {
        return Divergence::Continues;
    }

    tracing::debug!(
        incoming = incoming.trace_id,
        displayed = last.trace_id,
        "trace diverged from displayed path"
    );

    let ancestors = match index.ancestors(incoming.trace_id, false) {
        Ok(ancestors) => ancestors,
        Err(_) => return Divergence::FullReset,
    };

    log.iter()
        .enumerate()
        .rev()
        .find_map(|(idx, message)| {
            message
                .as_trace()
                .filter(|trace| ancestors.contains(&trace.trace_id))
                .map(|_| idx)
        })
        .map_or(Divergence::FullReset, Divergence::Truncate)
}
