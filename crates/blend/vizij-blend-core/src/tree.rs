//! JSON blend-tree descriptions.
//!
//! A description names clips by their library name. Building resolves every name up front, so an
//! unknown clip fails before any node or backend handle exists.
//!
//! ```json
//! {
//!   "type": "linear",
//!   "parameter": 0.5,
//!   "children": [
//!     { "clip": "walk", "threshold": 0.0 },
//!     { "clip": "run", "threshold": 1.0 }
//!   ]
//! }
//! ```

use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::clip::{ClipData, ClipLibrary};
use crate::error::BlendError;
use crate::ids::ClipId;
use crate::node::{Blend2DNode, BlendNode, ClipNode, LinearMixerNode, MixerNode, NodeKind};

fn one() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedChild {
    pub clip: String,
    #[serde(default = "one")]
    pub weight: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChild {
    pub clip: String,
    pub threshold: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionedChild {
    pub clip: String,
    pub position: [f32; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlendTreeSpec {
    Clip {
        clip: String,
    },
    Mixer {
        children: Vec<WeightedChild>,
    },
    Linear {
        children: Vec<ThresholdChild>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameter: Option<f32>,
    },
    Blend2d {
        children: Vec<PositionedChild>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameter: Option<[f32; 2]>,
    },
}

fn finite(what: &str, value: f32) -> Result<(), BlendError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(BlendError::invalid_tree(format!("{what} must be finite, got {value}")))
    }
}

fn non_empty(kind: &str, len: usize) -> Result<(), BlendError> {
    if len == 0 {
        Err(BlendError::invalid_tree(format!("{kind} has no children")))
    } else {
        Ok(())
    }
}

impl BlendTreeSpec {
    /// Structural checks that do not need a clip library.
    pub fn validate(&self) -> Result<(), BlendError> {
        match self {
            BlendTreeSpec::Clip { clip } => {
                if clip.is_empty() {
                    return Err(BlendError::invalid_tree("clip name must not be empty"));
                }
            }
            BlendTreeSpec::Mixer { children } => {
                non_empty("mixer", children.len())?;
                for c in children {
                    finite("mixer weight", c.weight)?;
                }
            }
            BlendTreeSpec::Linear {
                children,
                parameter,
            } => {
                non_empty("linear", children.len())?;
                for c in children {
                    finite("threshold", c.threshold)?;
                }
                if let Some(p) = parameter {
                    finite("linear parameter", *p)?;
                }
            }
            BlendTreeSpec::Blend2d {
                children,
                parameter,
            } => {
                non_empty("blend2d", children.len())?;
                for c in children {
                    finite("position.x", c.position[0])?;
                    finite("position.y", c.position[1])?;
                }
                if let Some([x, y]) = parameter {
                    finite("blend2d parameter.x", *x)?;
                    finite("blend2d parameter.y", *y)?;
                }
            }
        }
        Ok(())
    }

    /// Clip names referenced by this description, in declaration order.
    pub fn clip_names(&self) -> Vec<&str> {
        match self {
            BlendTreeSpec::Clip { clip } => vec![clip.as_str()],
            BlendTreeSpec::Mixer { children } => children.iter().map(|c| c.clip.as_str()).collect(),
            BlendTreeSpec::Linear { children, .. } => {
                children.iter().map(|c| c.clip.as_str()).collect()
            }
            BlendTreeSpec::Blend2d { children, .. } => {
                children.iter().map(|c| c.clip.as_str()).collect()
            }
        }
    }

    /// Build an uninitialized node tree; the owning layer allocates backend handles.
    pub(crate) fn build(
        &self,
        clips: &ClipLibrary,
        exact_match_epsilon: f32,
    ) -> Result<BlendNode, BlendError> {
        self.validate()?;
        let resolved = self
            .clip_names()
            .into_iter()
            .map(|name| resolve(clips, name))
            .collect::<Result<Vec<_>, _>>()?;
        let mut leaves = resolved.into_iter().map(|(id, data)| {
            BlendNode::new(NodeKind::Clip(ClipNode::new(id, data)))
        });

        let kind = match self {
            BlendTreeSpec::Clip { .. } => {
                return leaves
                    .next()
                    .ok_or_else(|| BlendError::invalid_tree("clip node without a clip"));
            }
            BlendTreeSpec::Mixer { children } => {
                let mut mixer = MixerNode::new();
                for (i, leaf) in leaves.enumerate() {
                    mixer.insert(i, leaf);
                }
                let weights: Vec<f32> = children.iter().map(|c| c.weight).collect();
                mixer.set_normalized(&weights);
                NodeKind::Mixer(mixer)
            }
            BlendTreeSpec::Linear {
                children,
                parameter,
            } => {
                let mut linear = LinearMixerNode::new();
                for (leaf, c) in leaves.zip(children) {
                    linear.insert(leaf, c.threshold);
                }
                if let Some(p) = parameter {
                    linear.set_parameter(*p);
                }
                NodeKind::LinearMixer(linear)
            }
            BlendTreeSpec::Blend2d {
                children,
                parameter,
            } => {
                let mut blend = Blend2DNode::new(exact_match_epsilon);
                for (leaf, c) in leaves.zip(children) {
                    blend.push(leaf, Vec2::from_array(c.position));
                }
                if let Some(p) = parameter {
                    blend.set_parameter(Vec2::from_array(*p));
                }
                NodeKind::Blend2D(blend)
            }
        };
        Ok(BlendNode::new(kind))
    }
}

fn resolve(clips: &ClipLibrary, name: &str) -> Result<(ClipId, Arc<ClipData>), BlendError> {
    let id = clips.by_name(name).ok_or_else(|| BlendError::UnknownClip {
        name: name.to_string(),
    })?;
    let data = clips.get(id).ok_or_else(|| BlendError::UnknownClip {
        name: name.to_string(),
    })?;
    Ok((id, Arc::clone(data)))
}

/// Parse and validate a blend-tree description.
pub fn parse_blend_tree_json(s: &str) -> Result<BlendTreeSpec, BlendError> {
    let spec: BlendTreeSpec = serde_json::from_str(s)?;
    spec.validate()?;
    Ok(spec)
}
