//! Generic weighted-sum composite.

use crate::backend::EvaluationBackend;
use crate::ids::PlayableHandle;

use super::BlendNode;

/// Ordered children with a parallel weight table. Child `i` is wired to port `i` of the mixer
/// playable.
#[derive(Debug, Default)]
pub struct MixerNode {
    pub(crate) children: Vec<BlendNode>,
    pub(crate) weights: Vec<f32>,
}

impl MixerNode {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[BlendNode] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&BlendNode> {
        self.children.get(index)
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight of child `index`, 0 when out of range.
    pub fn child_weight(&self, index: usize) -> f32 {
        self.weights.get(index).copied().unwrap_or(0.0)
    }

    pub(crate) fn insert(&mut self, index: usize, child: BlendNode) {
        self.children.insert(index, child);
        self.weights.insert(index, 0.0);
    }

    /// Assign weights rescaled to sum to 1. A zero or negative sum spreads weight evenly.
    /// Missing entries count as 0; extra entries are ignored.
    pub(crate) fn set_normalized(&mut self, weights: &[f32]) {
        let n = self.weights.len();
        if n == 0 {
            return;
        }
        for (i, w) in self.weights.iter_mut().enumerate() {
            *w = weights.get(i).copied().unwrap_or(0.0).max(0.0);
        }
        let sum: f32 = self.weights.iter().sum();
        if sum > 0.0 && sum.is_finite() {
            for w in self.weights.iter_mut() {
                *w /= sum;
            }
        } else {
            let even = 1.0 / n as f32;
            self.weights.iter_mut().for_each(|w| *w = even);
        }
    }

    /// Rewire every port to match the current child order.
    pub(crate) fn connect_all(&self, handle: PlayableHandle, backend: &mut dyn EvaluationBackend) {
        backend.set_input_count(handle, self.children.len());
        for (port, child) in self.children.iter().enumerate() {
            backend.disconnect(handle, port);
            if let Some(ch) = child.handle {
                backend.connect(handle, port, ch);
            }
        }
        self.push_weights(handle, backend);
    }

    /// Wire only the last child; used when an insertion lands at the tail.
    pub(crate) fn connect_tail(&self, handle: PlayableHandle, backend: &mut dyn EvaluationBackend) {
        let Some(port) = self.children.len().checked_sub(1) else {
            return;
        };
        backend.set_input_count(handle, self.children.len());
        if let Some(ch) = self.children[port].handle {
            backend.connect(handle, port, ch);
        }
        self.push_weights(handle, backend);
    }

    pub(crate) fn push_weights(&self, handle: PlayableHandle, backend: &mut dyn EvaluationBackend) {
        for (port, w) in self.weights.iter().enumerate() {
            backend.set_input_weight(handle, port, *w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BlendNode, NodeKind};

    fn mixer_with(n: usize) -> MixerNode {
        let mut m = MixerNode::new();
        for i in 0..n {
            m.insert(i, BlendNode::new(NodeKind::Mixer(MixerNode::new())));
        }
        m
    }

    #[test]
    fn normalizes_to_unit_sum() {
        let mut m = mixer_with(3);
        m.set_normalized(&[1.0, 1.0, 2.0]);
        assert_eq!(m.weights(), &[0.25, 0.25, 0.5]);
    }

    #[test]
    fn zero_weights_spread_evenly() {
        let mut m = mixer_with(2);
        m.set_normalized(&[0.0, -3.0]);
        assert_eq!(m.weights(), &[0.5, 0.5]);
        assert_eq!(m.child_weight(7), 0.0);
    }
}
