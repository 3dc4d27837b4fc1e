//! Fading-node bookkeeping for a layer.
//!
//! Fade records live in an arena and are referenced by [`FadeId`], so the ordered list can be
//! reshuffled or shrunk without invalidating a record that is being updated.

use crate::arena::Arena;
use crate::ids::{NodeId, SlotKey};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct FadeId {
    index: u32,
    generation: u32,
}

impl SlotKey for FadeId {
    #[inline]
    fn from_parts(index: u32, generation: u32) -> Self {
        FadeId { index, generation }
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

/// One node being displaced by a newer foreground target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FadeSlot {
    pub node: NodeId,
    /// Weight lost per second.
    pub speed: f32,
    pub interrupted: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FadeList {
    slots: Arena<FadeId, FadeSlot>,
    /// Insertion order; oldest first.
    order: Vec<FadeId>,
}

impl FadeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: NodeId, speed: f32, interrupted: bool) -> FadeId {
        let id = self.slots.insert(FadeSlot {
            node,
            speed,
            interrupted,
        });
        self.order.push(id);
        id
    }

    pub fn get(&self, id: FadeId) -> Option<&FadeSlot> {
        self.slots.get(id)
    }

    pub fn find(&self, node: NodeId) -> Option<FadeId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.slots.get(*id).is_some_and(|s| s.node == node))
    }

    #[inline]
    pub fn contains(&self, node: NodeId) -> bool {
        self.find(node).is_some()
    }

    pub fn remove(&mut self, id: FadeId) -> Option<FadeSlot> {
        let slot = self.slots.remove(id)?;
        self.order.retain(|o| *o != id);
        Some(slot)
    }

    pub fn remove_node(&mut self, node: NodeId) -> Option<FadeSlot> {
        let id = self.find(node)?;
        self.remove(id)
    }

    /// Mark every current fade interrupted and speed it up by `multiplier`.
    pub fn interrupt_all(&mut self, multiplier: f32) {
        for (_, slot) in self.slots.iter_mut() {
            slot.interrupted = true;
            slot.speed *= multiplier;
        }
    }

    /// Fade ids in insertion order, copied into `out`.
    pub fn ids_into(&self, out: &mut Vec<FadeId>) {
        out.clear();
        out.extend_from_slice(&self.order);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FadeSlot> {
        self.order.iter().filter_map(|id| self.slots.get(*id))
    }

    /// Remove every record, oldest first.
    pub fn drain(&mut self) -> Vec<FadeSlot> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|id| self.slots.remove(id))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
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
    fn interrupt_doubles_every_fade() {
        let mut list = FadeList::new();
        let a = list.push(node(0), 1.0, false);
        let b = list.push(node(1), 2.0, false);
        list.interrupt_all(2.0);
        assert_eq!(list.get(a).unwrap().speed, 2.0);
        assert_eq!(list.get(b).unwrap().speed, 4.0);
        assert!(list.iter().all(|s| s.interrupted));
    }

    #[test]
    fn ids_survive_removal_of_other_records() {
        let mut list = FadeList::new();
        let a = list.push(node(0), 1.0, false);
        let b = list.push(node(1), 1.0, false);
        let c = list.push(node(2), 1.0, false);
        assert!(list.remove_node(node(1)).is_some());
        assert!(list.get(b).is_none());
        assert_eq!(list.get(a).unwrap().node, node(0));
        assert_eq!(list.get(c).unwrap().node, node(2));
        assert_eq!(list.len(), 2);

        let drained = list.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].node, node(0));
        assert_eq!(list.len(), 0);
    }
}
