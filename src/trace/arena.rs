use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{TraceError, TraceId, TraceIndex, TraceNode};
use crate::message::NodeAttr;

/// In-memory trace tree keyed by id.
///
/// Nodes only reference their parent by id, so evicting a node leaves its
/// children intact but detached: lookups of the evicted id fail instead of
/// following a dangling link.
#[derive(Debug, Default)]
pub struct TraceArena {
    nodes: RwLock<HashMap<TraceId, TraceNode>>,
    next_id: AtomicU64,
}

impl TraceArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root node with a fresh id.
    pub fn insert_root(&self) -> TraceId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.store(id, None);
        id
    }

    /// Add a child of `parent` with a fresh id.
    pub fn insert_child(&self, parent: TraceId) -> Result<TraceId, TraceError> {
        if !self.contains(parent) {
            return Err(TraceError::NotFound(parent));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.store(id, Some(parent));
        Ok(id)
    }

    /// Add a node under a caller-chosen id, replacing any node with that id.
    pub fn insert_with_id(&self, id: TraceId, parent: Option<TraceId>) {
        self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
        self.store(id, parent);
    }

    fn store(&self, id: TraceId, parent: Option<TraceId>) {
        self.nodes.write().insert(
            id,
            TraceNode {
                id,
                parent,
                input: Vec::new(),
                output: Vec::new(),
            },
        );
    }

    pub fn record_input(&self, id: TraceId, attr: NodeAttr) -> Result<(), TraceError> {
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&id).ok_or(TraceError::NotFound(id))?;
        node.input.push(attr);
        Ok(())
    }

    pub fn record_output(&self, id: TraceId, attr: NodeAttr) -> Result<(), TraceError> {
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&id).ok_or(TraceError::NotFound(id))?;
        node.output.push(attr);
        Ok(())
    }

    /// Drop a node. Children keep their (now unresolvable) parent id.
    pub fn evict(&self, id: TraceId) -> Option<TraceNode> {
        self.nodes.write().remove(&id)
    }

    pub fn contains(&self, id: TraceId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl TraceIndex for TraceArena {
    fn lookup(&self, id: TraceId) -> Result<TraceNode, TraceError> {
        self.nodes
            .read()
            .get(&id)
            .cloned()
            .ok_or(TraceError::NotFound(id))
    }
}
