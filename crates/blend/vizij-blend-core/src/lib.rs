//! Vizij Blend Core (engine-agnostic)
//!
//! Layered animation blend-graph runtime. A [`GraphHost`] owns a stack of [`Layer`]s; each layer
//! crossfades between blend nodes (clips, weighted mixers, 1-D threshold blends and 2-D
//! inverse-distance blends) while keeping its node weights summing to 1. Retired clip nodes wait
//! out a cleanup delay and are then pooled per clip for reuse.
//!
//! The crate never samples poses. It drives an [`EvaluationBackend`] with handles, time cursors
//! and mixer weights; [`HeadlessBackend`] records that state in memory.

mod arena;
pub mod backend;
pub mod clip;
pub mod config;
pub mod curve;
pub mod error;
mod fade;
pub mod host;
pub mod ids;
pub mod layer;
pub mod listeners;
pub mod mask;
pub mod node;
pub mod outputs;
mod pool;
pub mod schedule;
pub mod tree;

// Re-exports for consumers (adapters)
pub use backend::{EvaluationBackend, HeadlessBackend, LayerRecord, PlayableKind, PlayableRecord};
pub use clip::{parse_clip_library_json, ClipData, ClipLibrary};
pub use config::Config;
pub use curve::BlendCurve;
pub use error::BlendError;
pub use host::{DriveMode, GraphHost, LayerMut};
pub use ids::{ClipId, ListenerToken, NodeId, PlayableHandle};
pub use layer::Layer;
pub use listeners::{Listener, ListenerList};
pub use mask::BoneMask;
pub use node::{
    idw_weights, linear_weights, Blend2DNode, BlendNode, ClipNode, LinearMixerNode, MixerNode,
    NodeKind,
};
pub use outputs::{BlendEvent, FadingSnapshot, LayerSnapshot, NodeSnapshot, Outputs};
pub use schedule::EventSchedule;
pub use tree::{
    parse_blend_tree_json, BlendTreeSpec, PositionedChild, ThresholdChild, WeightedChild,
};
pub use glam::Vec2;
