//! 1-D threshold blend.

use super::mixer::MixerNode;
use super::BlendNode;

/// Children sorted by ascending threshold; the parameter picks the bracketing pair.
#[derive(Debug, Default)]
pub struct LinearMixerNode {
    pub(crate) mixer: MixerNode,
    thresholds: Vec<f32>,
    parameter: Option<f32>,
}

impl LinearMixerNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mixer(&self) -> &MixerNode {
        &self.mixer
    }

    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }

    pub fn parameter(&self) -> Option<f32> {
        self.parameter
    }

    pub fn weights(&self) -> &[f32] {
        self.mixer.weights()
    }

    /// Insert keeping thresholds sorted; equal thresholds keep insertion order. Returns the
    /// child's index.
    pub(crate) fn insert(&mut self, child: BlendNode, threshold: f32) -> usize {
        let index = self.thresholds.partition_point(|t| *t <= threshold);
        self.thresholds.insert(index, threshold);
        self.mixer.insert(index, child);
        self.recompute();
        index
    }

    pub(crate) fn set_parameter(&mut self, value: f32) {
        self.parameter = Some(value);
        self.recompute();
    }

    fn recompute(&mut self) {
        if let Some(value) = self.parameter {
            linear_weights(&self.thresholds, value, &mut self.mixer.weights);
        }
    }
}

/// Threshold interpolation over sorted `thresholds`.
///
/// Outside the threshold range the boundary child takes full weight. Inside, the bracketing pair
/// `(t1, t2)` gets `1 - f` and `f` with `f = (value - t1) / (t2 - t1)`; all others get 0.
pub fn linear_weights(thresholds: &[f32], value: f32, out: &mut [f32]) {
    out.iter_mut().for_each(|w| *w = 0.0);
    let n = thresholds.len().min(out.len());
    if n == 0 {
        return;
    }
    if value <= thresholds[0] {
        out[0] = 1.0;
        return;
    }
    if value >= thresholds[n - 1] {
        out[n - 1] = 1.0;
        return;
    }
    // thresholds[i] <= value < thresholds[i + 1], so the span is strictly positive.
    let i = thresholds[..n].partition_point(|t| *t <= value) - 1;
    let (t1, t2) = (thresholds[i], thresholds[i + 1]);
    let f = (value - t1) / (t2 - t1);
    out[i] = 1.0 - f;
    out[i + 1] = f;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(th: &[f32], v: f32) -> Vec<f32> {
        let mut out = vec![0.0; th.len()];
        linear_weights(th, v, &mut out);
        out
    }

    #[test]
    fn clamps_outside_range() {
        assert_eq!(weights(&[0.0, 1.0, 2.0], -5.0), vec![1.0, 0.0, 0.0]);
        assert_eq!(weights(&[0.0, 1.0, 2.0], 9.0), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn interpolates_bracketing_pair() {
        let w = weights(&[0.0, 1.0, 3.0], 2.5);
        assert_eq!(w[0], 0.0);
        assert!((w[1] - 0.25).abs() < 1e-6);
        assert!((w[2] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn duplicate_thresholds_do_not_divide_by_zero() {
        let w = weights(&[0.0, 1.0, 1.0, 2.0], 1.0);
        assert!(w.iter().all(|x| x.is_finite()));
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn exact_threshold_hits_single_child() {
        let w = weights(&[0.0, 1.0, 2.0], 1.0);
        assert_eq!(w, vec![0.0, 1.0, 0.0]);
    }
}
