//! Output contracts from the blend graph.
//!
//! Callbacks registered on nodes and layers run synchronously inside the tick. Every event they
//! receive is also appended to [`Outputs`], so hosts that need mutable access to the graph (for
//! example to play a follow-up clip) can react after `update` returns.

use serde::{Deserialize, Serialize};

use crate::curve::BlendCurve;
use crate::ids::{ClipId, NodeId};

/// Discrete signals emitted by layers and nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum BlendEvent {
    /// The layer's foreground node reached full crossfade progress.
    FadeCompleted { layer: usize, node: NodeId },
    /// A non-looping node's cursor reached its length. `child` is set when the node is a child
    /// of the composite `node`.
    NodeFinished {
        layer: usize,
        node: NodeId,
        child: Option<usize>,
    },
    /// A scheduled event key was crossed.
    ScheduledEvent {
        layer: usize,
        node: NodeId,
        child: Option<usize>,
        time: f32,
    },
    /// A clip node was disconnected and parked in the layer's pool.
    NodeRecycled {
        layer: usize,
        node: NodeId,
        clip: ClipId,
    },
    /// A node's backend handle was released and its id invalidated.
    NodeDestroyed { layer: usize, node: NodeId },
}

/// Outputs returned by `GraphHost::update` / `GraphHost::manual_update`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub events: Vec<BlendEvent>,
}

impl Outputs {
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[inline]
    pub fn push_event(&mut self, event: BlendEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Inspection view of one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<ClipId>,
    pub weight: f32,
    pub time: f32,
    pub normalized_time: f32,
    pub speed: f32,
    pub paused: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FadingSnapshot {
    pub node: NodeSnapshot,
    pub speed: f32,
    pub interrupted: bool,
}

/// Inspection view of one layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub index: usize,
    pub weight: f32,
    pub additive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    pub curve: BlendCurve,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<NodeSnapshot>,
    pub fade_progress: f32,
    pub fading: Vec<FadingSnapshot>,
    pub pooled: usize,
    pub pending_cleanup: usize,
}

impl LayerSnapshot {
    /// Target weight plus every fading weight.
    pub fn total_weight(&self) -> f32 {
        self.target.as_ref().map_or(0.0, |t| t.weight)
            + self.fading.iter().map(|f| f.node.weight).sum::<f32>()
    }
}
