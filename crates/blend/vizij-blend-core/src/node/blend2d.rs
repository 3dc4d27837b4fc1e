//! 2-D inverse-distance blend.

use glam::Vec2;

use super::mixer::MixerNode;
use super::BlendNode;

/// Children placed at 2-D positions (insertion order, unsorted).
#[derive(Debug)]
pub struct Blend2DNode {
    pub(crate) mixer: MixerNode,
    positions: Vec<Vec2>,
    parameter: Option<Vec2>,
    exact_match_epsilon: f32,
}

impl Blend2DNode {
    pub fn new(exact_match_epsilon: f32) -> Self {
        Self {
            mixer: MixerNode::new(),
            positions: Vec::new(),
            parameter: None,
            exact_match_epsilon,
        }
    }

    pub fn mixer(&self) -> &MixerNode {
        &self.mixer
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    pub fn parameter(&self) -> Option<Vec2> {
        self.parameter
    }

    pub fn weights(&self) -> &[f32] {
        self.mixer.weights()
    }

    pub(crate) fn push(&mut self, child: BlendNode, position: Vec2) -> usize {
        let index = self.positions.len();
        self.positions.push(position);
        self.mixer.insert(index, child);
        self.recompute();
        index
    }

    pub(crate) fn set_parameter(&mut self, point: Vec2) {
        self.parameter = Some(point);
        self.recompute();
    }

    fn recompute(&mut self) {
        if let Some(point) = self.parameter {
            idw_weights(
                &self.positions,
                point,
                self.exact_match_epsilon,
                &mut self.mixer.weights,
            );
        }
    }
}

/// Inverse-distance weighting with exponent 1.
///
/// A child closer than `epsilon` to `point` takes weight 1 and every other child 0.
pub fn idw_weights(positions: &[Vec2], point: Vec2, epsilon: f32, out: &mut [f32]) {
    let n = positions.len().min(out.len());
    out.iter_mut().for_each(|w| *w = 0.0);
    if n == 0 {
        return;
    }
    if let Some(exact) = positions[..n]
        .iter()
        .position(|p| p.distance(point) < epsilon)
    {
        out[exact] = 1.0;
        return;
    }
    let mut total = 0.0;
    for (w, p) in out[..n].iter_mut().zip(&positions[..n]) {
        *w = 1.0 / p.distance(point);
        total += *w;
    }
    for w in out[..n].iter_mut() {
        *w /= total;
    }
}
