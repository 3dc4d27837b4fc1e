//! Crossfade curves mapping fade progress to the foreground node's weight.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendCurve {
    #[default]
    Linear,
    SmoothStep,
}

impl BlendCurve {
    /// Map progress in [0, 1] to a weight in [0, 1].
    #[inline]
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            BlendCurve::Linear => t,
            BlendCurve::SmoothStep => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Amount of progress made by a fade running at `speed` for `dt` seconds.
///
/// An infinite speed (instant fade) completes in any step, including `dt == 0`.
#[inline]
pub(crate) fn fade_step(speed: f32, dt: f32) -> f32 {
    if speed.is_finite() {
        speed * dt
    } else {
        1.0
    }
}
