//! Core configuration for vizij-blend-core.

use serde::{Deserialize, Serialize};

use crate::curve::BlendCurve;
use crate::error::BlendError;

/// Tunables shared by every layer of a host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retired clip nodes kept per clip identity; extra nodes are destroyed.
    pub pool_capacity: usize,
    /// Seconds a zero-weight node waits before it is disconnected and recycled.
    pub cleanup_delay: f32,
    /// Fade-speed multiplier applied to fades interrupted by a new play request.
    pub interrupt_multiplier: f32,
    /// Nodes at or below this weight are not ticked unless they are the foreground target.
    pub tick_weight_threshold: f32,
    /// Tolerance under which a fading weight sum counts as zero.
    pub weight_epsilon: f32,
    /// Distance under which a 2-D blend parameter snaps to a single child.
    pub exact_match_epsilon: f32,
    /// Blend curve given to newly created layers.
    pub default_curve: BlendCurve,
    /// Upper bound on frame-driven `update` deltas. Manual stepping is never clamped.
    pub max_frame_delta: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_capacity: 5,
            cleanup_delay: 2.0,
            interrupt_multiplier: 2.0,
            tick_weight_threshold: 0.001,
            weight_epsilon: 1e-6,
            exact_match_epsilon: 1e-5,
            default_curve: BlendCurve::Linear,
            max_frame_delta: 0.25,
        }
    }
}

impl Config {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), BlendError> {
        fn check(field: &'static str, value: f32, ok: bool) -> Result<(), BlendError> {
            if value.is_finite() && ok {
                Ok(())
            } else {
                Err(BlendError::InvalidConfig {
                    field,
                    value: value.to_string(),
                })
            }
        }

        check("cleanup_delay", self.cleanup_delay, self.cleanup_delay >= 0.0)?;
        check(
            "interrupt_multiplier",
            self.interrupt_multiplier,
            self.interrupt_multiplier >= 1.0,
        )?;
        check(
            "tick_weight_threshold",
            self.tick_weight_threshold,
            (0.0..1.0).contains(&self.tick_weight_threshold),
        )?;
        check(
            "weight_epsilon",
            self.weight_epsilon,
            self.weight_epsilon > 0.0 && self.weight_epsilon < 0.5,
        )?;
        check(
            "exact_match_epsilon",
            self.exact_match_epsilon,
            self.exact_match_epsilon > 0.0,
        )?;
        check(
            "max_frame_delta",
            self.max_frame_delta,
            self.max_frame_delta > 0.0,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.pool_capacity, 5);
        assert_eq!(cfg.cleanup_delay, 2.0);
        assert_eq!(cfg.interrupt_multiplier, 2.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_slowing_interrupts_and_nan() {
        let cfg = Config {
            interrupt_multiplier: 0.5,
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(BlendError::InvalidConfig {
                field: "interrupt_multiplier",
                ..
            })
        ));

        let cfg = Config {
            cleanup_delay: f32::NAN,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{ "pool_capacity": 2 }"#).unwrap();
        assert_eq!(cfg.pool_capacity, 2);
        assert_eq!(cfg.cleanup_delay, 2.0);
        assert_eq!(cfg.default_curve, BlendCurve::Linear);
    }
}
