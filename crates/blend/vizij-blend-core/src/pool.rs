//! Per-clip node pool and the delayed-cleanup queue that feeds it.

use hashbrown::HashMap;

use crate::ids::{ClipId, NodeId};

/// Retired clip nodes, stacked per clip identity.
#[derive(Debug)]
pub(crate) struct NodePool {
    capacity: usize,
    stacks: HashMap<ClipId, Vec<NodeId>>,
}

impl NodePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            stacks: HashMap::new(),
        }
    }

    /// Park `node` under `clip`. Returns false when that clip's stack is full.
    pub fn try_push(&mut self, clip: ClipId, node: NodeId) -> bool {
        let stack = self.stacks.entry(clip).or_default();
        if stack.len() >= self.capacity {
            return false;
        }
        stack.push(node);
        true
    }

    pub fn pop(&mut self, clip: ClipId) -> Option<NodeId> {
        self.stacks.get_mut(&clip)?.pop()
    }

    /// Take a specific node out of the pool, wherever it is parked.
    pub fn remove(&mut self, node: NodeId) -> bool {
        for stack in self.stacks.values_mut() {
            if let Some(pos) = stack.iter().position(|n| *n == node) {
                stack.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.stacks.values().map(Vec::len).sum()
    }

    pub fn len_for(&self, clip: ClipId) -> usize {
        self.stacks.get(&clip).map_or(0, Vec::len)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PendingEntry {
    node: NodeId,
    deadline: f64,
}

/// Zero-weight nodes waiting out the cleanup delay.
#[derive(Debug, Default)]
pub(crate) struct PendingCleanup {
    entries: Vec<PendingEntry>,
}

impl PendingCleanup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `node` for cleanup at `deadline`. A node already waiting keeps its earlier
    /// deadline.
    pub fn schedule(&mut self, node: NodeId, deadline: f64) {
        if !self.contains(node) {
            self.entries.push(PendingEntry { node, deadline });
        }
    }

    pub fn cancel(&mut self, node: NodeId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.node != node);
        self.entries.len() != before
    }

    #[inline]
    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }

    /// Move every node whose deadline has passed into `out`.
    pub fn drain_due(&mut self, now: f64, out: &mut Vec<NodeId>) {
        out.clear();
        self.entries.retain(|e| {
            if e.deadline <= now {
                out.push(e.node);
                false
            } else {
                true
            }
        });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(i: u32) -> NodeId {
        NodeId {
            index: i,
            generation: 0,
        }
    }

    #[test]
    fn pool_respects_capacity_per_clip() {
        let mut pool = NodePool::new(2);
        assert!(pool.try_push(ClipId(0), node(0)));
        assert!(pool.try_push(ClipId(0), node(1)));
        assert!(!pool.try_push(ClipId(0), node(2)));
        assert!(pool.try_push(ClipId(1), node(3)));
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.pop(ClipId(0)), Some(node(1)));
        assert!(pool.remove(node(3)));
        assert_eq!(pool.len_for(ClipId(1)), 0);
    }

    #[test]
    fn cleanup_waits_for_deadline() {
        let mut pending = PendingCleanup::new();
        pending.schedule(node(0), 2.0);
        pending.schedule(node(0), 5.0);
        pending.schedule(node(1), 3.0);
        let mut due = Vec::new();
        pending.drain_due(1.9, &mut due);
        assert!(due.is_empty());
        pending.drain_due(2.5, &mut due);
        assert_eq!(due, vec![node(0)]);
        assert!(pending.cancel(node(1)));
        assert_eq!(pending.len(), 0);
    }
}
