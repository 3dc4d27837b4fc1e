//! GraphHost: data ownership and public API for a stack of blend layers.
//!
//! Methods:
//! - new, load_clip(s), layer (lazy creation), update / manual_update, snapshot
//!
//! [`LayerMut`] is the mutable view returned by [`GraphHost::layer`]. It borrows the layer, the
//! backend and the clip library together so every graph mutation can reach all three.

use std::ops::Deref;
use std::sync::Arc;

use glam::Vec2;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::backend::{EvaluationBackend, HeadlessBackend};
use crate::clip::{parse_clip_library_json, ClipData, ClipLibrary};
use crate::config::Config;
use crate::curve::BlendCurve;
use crate::error::BlendError;
use crate::ids::{ClipId, ListenerToken, NodeId, PlayableHandle};
use crate::layer::Layer;
use crate::mask::BoneMask;
use crate::node::{BlendNode, ClipNode, NodeKind};
use crate::outputs::{BlendEvent, LayerSnapshot, Outputs};
use crate::tree::BlendTreeSpec;

/// Which entry point advances a host. Locked by the first call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// `update(dt)` once per rendered frame; hitches are clamped to `max_frame_delta`.
    Frame,
    /// `manual_update(dt)` with externally supplied steps, never clamped.
    Manual,
}

/// Owns the clip library, the layers and the evaluation backend.
#[derive(Debug)]
pub struct GraphHost<B: EvaluationBackend = HeadlessBackend> {
    cfg: Config,
    backend: B,
    clips: ClipLibrary,
    layers: Vec<Layer>,
    layer_mixer: PlayableHandle,
    drive: Option<DriveMode>,
    outputs: Outputs,
    elapsed: f64,
}

impl GraphHost<HeadlessBackend> {
    /// Host backed by the in-memory [`HeadlessBackend`].
    pub fn headless(cfg: Config) -> Self {
        Self::new(cfg, HeadlessBackend::new())
    }
}

impl<B: EvaluationBackend> GraphHost<B> {
    /// Create a host. An invalid config is logged and replaced by the defaults.
    pub fn new(cfg: Config, mut backend: B) -> Self {
        let cfg = match cfg.validate() {
            Ok(()) => cfg,
            Err(err) => {
                warn!("{err}; falling back to default config");
                Config::default()
            }
        };
        let layer_mixer = backend.create_mixer_playable(0);
        Self {
            cfg,
            backend,
            clips: ClipLibrary::new(),
            layers: Vec::new(),
            layer_mixer,
            drive: None,
            outputs: Outputs::default(),
            elapsed: 0.0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Register a clip, returning its id.
    pub fn load_clip(&mut self, data: ClipData) -> ClipId {
        debug!("loading clip '{}' ({}s)", data.name, data.length);
        self.clips.insert(data)
    }

    pub fn load_clips<I>(&mut self, clips: I) -> Vec<ClipId>
    where
        I: IntoIterator<Item = ClipData>,
    {
        clips.into_iter().map(|c| self.load_clip(c)).collect()
    }

    /// Parse a JSON clip library and register every clip in it.
    pub fn load_clip_library_json(&mut self, json: &str) -> Result<Vec<ClipId>, BlendError> {
        let clips = parse_clip_library_json(json)?;
        Ok(self.load_clips(clips))
    }

    pub fn clip_by_name(&self, name: &str) -> Option<ClipId> {
        self.clips.by_name(name)
    }

    pub fn clip(&self, id: ClipId) -> Option<&ClipData> {
        self.clips.get(id).map(|d| d.as_ref())
    }

    pub fn clips(&self) -> &ClipLibrary {
        &self.clips
    }

    /// Mutable access to layer `index`, creating layers `0..=index` on first use.
    pub fn layer(&mut self, index: usize) -> LayerMut<'_> {
        while self.layers.len() <= index {
            let next = self.layers.len();
            let layer = Layer::new(next, &self.cfg, self.layer_mixer, &mut self.backend);
            self.layers.push(layer);
        }
        LayerMut {
            layer: &mut self.layers[index],
            backend: &mut self.backend,
            clips: &self.clips,
        }
    }

    /// Read access to an existing layer; never creates one.
    pub fn layer_ref(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Backend mixer every layer's root is connected to, one port per layer.
    pub fn layer_mixer(&self) -> PlayableHandle {
        self.layer_mixer
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn drive_mode(&self) -> Option<DriveMode> {
        self.drive
    }

    /// Total simulated seconds.
    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Events produced by the most recent step.
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Advance every layer by one rendered frame. `dt` is clamped to `max_frame_delta`.
    pub fn update(&mut self, dt: f32) -> &Outputs {
        let dt = dt.min(self.cfg.max_frame_delta);
        self.step(DriveMode::Frame, dt)
    }

    /// Advance every layer by an externally supplied step, without clamping.
    pub fn manual_update(&mut self, dt: f32) -> &Outputs {
        self.step(DriveMode::Manual, dt)
    }

    fn step(&mut self, mode: DriveMode, dt: f32) -> &Outputs {
        self.outputs.clear();
        match self.drive {
            None => self.drive = Some(mode),
            Some(locked) if locked != mode => {
                warn!("host is driven by {locked:?}; ignoring {mode:?} step");
                return &self.outputs;
            }
            Some(_) => {}
        }
        if !dt.is_finite() || dt < 0.0 {
            warn!("ignoring invalid step dt={dt}");
            return &self.outputs;
        }

        self.elapsed += f64::from(dt);
        for layer in self.layers.iter_mut() {
            layer.update(dt, &mut self.backend);
            layer.drain_events(&mut self.outputs.events);
        }
        &self.outputs
    }

    pub fn snapshot(&self) -> Vec<LayerSnapshot> {
        self.layers.iter().map(Layer::snapshot).collect()
    }
}

/// Mutable view of one layer. Dereferences to [`Layer`] for read access.
pub struct LayerMut<'a> {
    layer: &'a mut Layer,
    backend: &'a mut dyn EvaluationBackend,
    clips: &'a ClipLibrary,
}

impl Deref for LayerMut<'_> {
    type Target = Layer;

    fn deref(&self) -> &Layer {
        self.layer
    }
}

impl LayerMut<'_> {
    fn clip_data(&self, clip: ClipId) -> Option<Arc<ClipData>> {
        let data = self.clips.get(clip).cloned();
        if data.is_none() {
            warn!("layer {}: unknown clip {:?}", self.layer.index(), clip);
        }
        data
    }

    fn leaf(&self, clip: ClipId) -> Option<BlendNode> {
        let data = self.clip_data(clip)?;
        Some(BlendNode::new(NodeKind::Clip(ClipNode::new(clip, data))))
    }

    // ----- Play -----

    /// Crossfade to `clip` over `fade` seconds, reusing this layer's node for the clip when one
    /// exists. `fade <= 0` resolves the transition before returning.
    pub fn play_clip(&mut self, clip: ClipId, fade: f32, force_reset: bool) -> Option<NodeId> {
        let data = self.clip_data(clip)?;
        self.layer
            .play_clip(clip, &data, fade, force_reset, &mut *self.backend)
    }

    /// [`LayerMut::play_clip`] by clip name.
    pub fn play_named(&mut self, name: &str, fade: f32, force_reset: bool) -> Option<NodeId> {
        let Some(clip) = self.clips.by_name(name) else {
            warn!("layer {}: unknown clip '{name}'", self.layer.index());
            return None;
        };
        self.play_clip(clip, fade, force_reset)
    }

    /// Crossfade to an explicitly created node.
    pub fn play(&mut self, node: NodeId, fade: f32, force_reset: bool) -> Option<NodeId> {
        self.layer.play(node, fade, force_reset, &mut *self.backend)
    }

    /// Send the target and every fading node to zero weight and into cleanup.
    pub fn stop(&mut self) {
        self.layer.stop(&mut *self.backend);
    }

    // ----- Layer settings -----

    pub fn set_weight(&mut self, weight: f32) {
        self.layer.set_weight(weight, &mut *self.backend);
    }

    /// Fade the whole layer's contribution to `target` over `duration` seconds.
    pub fn start_fade(&mut self, target: f32, duration: f32) {
        self.layer.start_fade(target, duration, &mut *self.backend);
    }

    pub fn set_bone_mask(&mut self, mask: Option<BoneMask>) {
        self.layer.set_bone_mask(mask, &mut *self.backend);
    }

    pub fn set_additive(&mut self, additive: bool) {
        self.layer.set_additive(additive, &mut *self.backend);
    }

    pub fn set_curve(&mut self, curve: BlendCurve) {
        self.layer.set_curve(curve);
    }

    pub fn on_fade_complete<F>(&mut self, listener: F) -> ListenerToken
    where
        F: FnMut(&BlendEvent) + 'static,
    {
        self.layer.on_fade_complete(listener)
    }

    pub fn remove_fade_complete(&mut self, token: ListenerToken) -> bool {
        self.layer.remove_fade_complete(token)
    }

    // ----- Node construction -----

    /// Explicit clip node. Unlike nodes made by `play_clip`, it is never pooled.
    pub fn create_clip_node(&mut self, clip: ClipId) -> Option<NodeId> {
        let data = self.clip_data(clip)?;
        Some(self.layer.create_clip_node(clip, &data, &mut *self.backend))
    }

    pub fn create_mixer(&mut self) -> NodeId {
        self.layer.create_mixer(&mut *self.backend)
    }

    pub fn create_linear_mixer(&mut self) -> NodeId {
        self.layer.create_linear_mixer(&mut *self.backend)
    }

    pub fn create_blend2d(&mut self) -> NodeId {
        self.layer.create_blend2d(&mut *self.backend)
    }

    /// Build a node from a blend-tree description. Fails without side effects when the
    /// description is invalid or names an unknown clip.
    pub fn instantiate(&mut self, spec: &BlendTreeSpec) -> Result<NodeId, BlendError> {
        let node = spec.build(self.clips, self.layer.config().exact_match_epsilon)?;
        Ok(self.layer.adopt(node, &mut *self.backend))
    }

    /// Hard-destroy a node. Its id is invalid afterwards.
    pub fn destroy_node(&mut self, node: NodeId) -> bool {
        self.layer.destroy_node(node, &mut *self.backend)
    }

    // ----- Composite mutation -----

    /// Append `clip` to a generic mixer. `weight` is relative to the existing children, whose
    /// weights already sum to 1; the result is renormalized.
    pub fn add_mixer_child(&mut self, mixer: NodeId, clip: ClipId, weight: f32) -> Option<usize> {
        let child = self.leaf(clip)?;
        let backend = &mut *self.backend;
        self.layer
            .node_mut(mixer)?
            .add_mixer_child(backend, child, weight)
    }

    pub fn set_mixer_weights(&mut self, mixer: NodeId, weights: &[f32]) -> bool {
        let backend = &mut *self.backend;
        self.layer
            .node_mut(mixer)
            .is_some_and(|n| n.set_mixer_weights(backend, weights))
    }

    pub fn add_linear_child(
        &mut self,
        mixer: NodeId,
        clip: ClipId,
        threshold: f32,
    ) -> Option<usize> {
        let child = self.leaf(clip)?;
        let backend = &mut *self.backend;
        self.layer
            .node_mut(mixer)?
            .add_linear_child(backend, child, threshold)
    }

    pub fn add_blend2d_child(
        &mut self,
        blend: NodeId,
        clip: ClipId,
        position: Vec2,
    ) -> Option<usize> {
        let child = self.leaf(clip)?;
        let backend = &mut *self.backend;
        self.layer
            .node_mut(blend)?
            .add_blend2d_child(backend, child, position)
    }

    pub fn set_linear_parameter(&mut self, mixer: NodeId, value: f32) -> bool {
        let backend = &mut *self.backend;
        self.layer
            .node_mut(mixer)
            .is_some_and(|n| n.set_linear_parameter(backend, value))
    }

    pub fn set_blend2d_parameter(&mut self, blend: NodeId, point: Vec2) -> bool {
        let backend = &mut *self.backend;
        self.layer
            .node_mut(blend)
            .is_some_and(|n| n.set_blend2d_parameter(backend, point))
    }

    // ----- Node control -----

    pub fn pause(&mut self, node: NodeId) -> bool {
        let backend = &mut *self.backend;
        self.layer
            .node_mut(node)
            .map(|n| n.set_paused(backend, true))
            .is_some()
    }

    pub fn resume(&mut self, node: NodeId) -> bool {
        let backend = &mut *self.backend;
        self.layer
            .node_mut(node)
            .map(|n| n.set_paused(backend, false))
            .is_some()
    }

    pub fn set_speed(&mut self, node: NodeId, speed: f32) -> bool {
        let backend = &mut *self.backend;
        self.layer
            .node_mut(node)
            .map(|n| n.set_speed(backend, speed))
            .is_some()
    }

    /// Seek `node`. Event keys at or before the new time fire on the next tick.
    pub fn set_time(&mut self, node: NodeId, time: f32) -> bool {
        let backend = &mut *self.backend;
        self.layer
            .node_mut(node)
            .map(|n| n.seek(backend, time))
            .is_some()
    }

    /// Register `listener` to fire once when `node`'s cursor reaches `time`. Returns `None` for
    /// a stale node or a negative time.
    pub fn add_scheduled_event<F>(
        &mut self,
        node: NodeId,
        time: f32,
        listener: F,
    ) -> Option<ListenerToken>
    where
        F: FnMut(&BlendEvent) + 'static,
    {
        self.layer
            .node_mut(node)?
            .add_scheduled_event(time, Box::new(listener))
    }

    pub fn remove_scheduled_event(&mut self, node: NodeId, time: f32, token: ListenerToken) -> bool {
        self.layer
            .node_mut(node)
            .is_some_and(|n| n.remove_scheduled_event(time, token))
    }

    /// Drop every listener registered at `time`; returns how many were removed.
    pub fn remove_scheduled_events(&mut self, node: NodeId, time: f32) -> usize {
        self.layer
            .node_mut(node)
            .map_or(0, |n| n.remove_scheduled_events(time))
    }

    pub fn on_finished<F>(&mut self, node: NodeId, listener: F) -> Option<ListenerToken>
    where
        F: FnMut(&BlendEvent) + 'static,
    {
        Some(self.layer.node_mut(node)?.on_finished(Box::new(listener)))
    }

    pub fn remove_on_finished(&mut self, node: NodeId, token: ListenerToken) -> bool {
        self.layer
            .node_mut(node)
            .is_some_and(|n| n.remove_on_finished(token))
    }
}
