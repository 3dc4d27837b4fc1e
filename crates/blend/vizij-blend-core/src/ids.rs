//! Identifiers and simple allocators for blend-graph entities.

use serde::{Deserialize, Serialize};

/// Identity of a clip registered in the host's clip library.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u32);

/// Generational handle to a node owned by a layer.
///
/// Recycling a node through the pool keeps its id. Destroying it bumps the slot generation, so
/// any copy of the old id resolves to nothing afterwards.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub index: u32,
    pub generation: u32,
}

/// Token returned by every subscribe call; pass it back to unsubscribe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ListenerToken(pub u64);

/// Opaque handle to one playable unit owned by the evaluation backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PlayableHandle(pub u64);

/// Arena keys built from a slot index and generation.
pub(crate) trait SlotKey: Copy {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn index(&self) -> u32;
    fn generation(&self) -> u32;
}

impl SlotKey for NodeId {
    #[inline]
    fn from_parts(index: u32, generation: u32) -> Self {
        NodeId { index, generation }
    }
    #[inline]
    fn index(&self) -> u32 {
        self.index
    }
    #[inline]
    fn generation(&self) -> u32 {
        self.generation
    }
}

/// Monotonic allocator for ClipId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_clip: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_clip(&mut self) -> ClipId {
        let id = ClipId(self.next_clip);
        self.next_clip = self.next_clip.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_clip(), ClipId(0));
        assert_eq!(alloc.alloc_clip(), ClipId(1));
    }

    #[test]
    fn node_id_round_trips_through_slot_parts() {
        let id = NodeId::from_parts(7, 3);
        assert_eq!(id.index(), 7);
        assert_eq!(id.generation(), 3);
        assert_eq!(id, NodeId { index: 7, generation: 3 });
    }
}
