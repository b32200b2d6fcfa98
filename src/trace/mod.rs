//! Trace tree access.
//!
//! The engine never owns trace nodes. It resolves ids through a
//! [`TraceIndex`], and every navigation step can fail with
//! [`TraceError::NotFound`] once the owning index has evicted a node.

pub mod arena;

use std::collections::HashSet;

use crate::message::NodeAttr;

pub use arena::TraceArena;

pub type TraceId = u64;

/// Snapshot of one recorded execution step.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceNode {
    pub id: TraceId,
    /// Parent id. Weak: the parent may no longer resolve.
    pub parent: Option<TraceId>,
    pub input: Vec<NodeAttr>,
    pub output: Vec<NodeAttr>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceError {
    #[error("trace node {0} not found")]
    NotFound(TraceId),
}

/// Id-addressed view over a trace tree.
pub trait TraceIndex: Send + Sync {
    fn lookup(&self, id: TraceId) -> Result<TraceNode, TraceError>;

    /// Nodes from the root down to `id` inclusive.
    ///
    /// An unresolvable parent ends the walk, so the returned path starts at
    /// the deepest ancestor that still resolves.
    fn path(&self, id: TraceId) -> Result<Vec<TraceNode>, TraceError> {
        let node = self.lookup(id)?;
        let mut seen = HashSet::from([node.id]);
        let mut path = vec![node];

        while let Some(parent_id) = path.last().and_then(|n| n.parent) {
            if !seen.insert(parent_id) {
                tracing::warn!(trace_id = id, parent_id, "cycle in trace parents");
                break;
            }
            match self.lookup(parent_id) {
                Ok(parent) => path.push(parent),
                Err(_) => break,
            }
        }

        path.reverse();
        Ok(path)
    }

    fn ancestors(&self, id: TraceId, include_self: bool) -> Result<HashSet<TraceId>, TraceError> {
        let mut path = self.path(id)?;
        if !include_self {
            path.pop();
        }
        Ok(path.into_iter().map(|node| node.id).collect())
    }

    fn root(&self, id: TraceId) -> Result<TraceNode, TraceError> {
        self.path(id)?
            .into_iter()
            .next()
            .ok_or(TraceError::NotFound(id))
    }
}
