//! Layer: root mixer, foreground target, fading set, crossfade and weight normalization.
//!
//! Per-frame order inside [`Layer::update`]:
//! layer weight fade → target crossfade → fading decay → normalization → node ticks → cleanup.
//!
//! Node weights live in the root mixer's port table. A node that is not connected to a port has
//! weight 0 by definition.

use std::mem;
use std::sync::Arc;

use hashbrown::HashMap;
use log::{debug, trace, warn};

use crate::arena::Arena;
use crate::backend::EvaluationBackend;
use crate::clip::ClipData;
use crate::config::Config;
use crate::curve::{fade_step, BlendCurve};
use crate::fade::{FadeId, FadeList};
use crate::ids::{ClipId, ListenerToken, NodeId, PlayableHandle};
use crate::listeners::ListenerList;
use crate::mask::BoneMask;
use crate::node::{
    Blend2DNode, BlendNode, ClipNode, LinearMixerNode, MixerNode, NodeKind, TickContext,
};
use crate::outputs::{BlendEvent, FadingSnapshot, LayerSnapshot, NodeSnapshot};
use crate::pool::{NodePool, PendingCleanup};

/// The layer's root mixer and its port table.
#[derive(Debug, Default)]
struct RootMixer {
    handle: Option<PlayableHandle>,
    inputs: Vec<Option<NodeId>>,
    weights: Vec<f32>,
    /// Released ports, reused before the input array grows.
    free_ports: Vec<usize>,
}

impl RootMixer {
    fn attach(
        &mut self,
        node: NodeId,
        child: Option<PlayableHandle>,
        backend: &mut dyn EvaluationBackend,
    ) -> usize {
        let port = match self.free_ports.pop() {
            Some(port) => port,
            None => {
                self.inputs.push(None);
                self.weights.push(0.0);
                if let Some(h) = self.handle {
                    backend.set_input_count(h, self.inputs.len());
                }
                self.inputs.len() - 1
            }
        };
        self.inputs[port] = Some(node);
        self.weights[port] = 0.0;
        if let Some(h) = self.handle {
            if let Some(c) = child {
                backend.connect(h, port, c);
            }
            backend.set_input_weight(h, port, 0.0);
        }
        port
    }

    fn detach(&mut self, port: usize, backend: &mut dyn EvaluationBackend) {
        if port >= self.inputs.len() {
            return;
        }
        self.inputs[port] = None;
        self.weights[port] = 0.0;
        self.free_ports.push(port);
        if let Some(h) = self.handle {
            backend.disconnect(h, port);
        }
    }

    /// Point `port` at a fresh child handle, keeping its weight.
    fn reconnect(
        &self,
        port: usize,
        child: Option<PlayableHandle>,
        backend: &mut dyn EvaluationBackend,
    ) {
        let Some(h) = self.handle else {
            return;
        };
        backend.disconnect(h, port);
        if let Some(c) = child {
            backend.connect(h, port, c);
        }
        backend.set_input_weight(h, port, self.weight(port));
    }

    #[inline]
    fn weight(&self, port: usize) -> f32 {
        self.weights.get(port).copied().unwrap_or(0.0)
    }

    fn set_weight(&mut self, port: usize, weight: f32, backend: &mut dyn EvaluationBackend) {
        let Some(slot) = self.weights.get_mut(port) else {
            return;
        };
        *slot = weight;
        if let Some(h) = self.handle {
            backend.set_input_weight(h, port, weight);
        }
    }
}

#[derive(Debug)]
struct LayerNode {
    node: BlendNode,
    port: Option<usize>,
    /// Set for clip nodes created by `play_clip`; only these are pooled.
    recyclable: Option<ClipId>,
    pooled: bool,
}

#[derive(Clone, Copy, Debug)]
struct WeightFade {
    target: f32,
    speed: f32,
}

/// One animation layer.
#[derive(Debug)]
pub struct Layer {
    index: usize,
    cfg: Config,
    layer_mixer: PlayableHandle,

    weight: f32,
    weight_fade: Option<WeightFade>,
    mask: Option<BoneMask>,
    additive: bool,
    curve: BlendCurve,

    root: RootMixer,
    nodes: Arena<NodeId, LayerNode>,

    target: Option<NodeId>,
    fade_progress: f32,
    fade_speed: f32,
    fade_completed: bool,
    fading: FadeList,

    pool: NodePool,
    pending: PendingCleanup,
    live_clips: HashMap<ClipId, NodeId>,
    /// Seconds of simulation seen by this layer; cleanup deadlines are measured against it.
    clock: f64,

    on_fade_complete: ListenerList,
    events: Vec<BlendEvent>,

    // Scratch
    scratch_fades: Vec<FadeId>,
    scratch_nodes: Vec<NodeId>,
}

impl Layer {
    pub(crate) fn new(
        index: usize,
        cfg: &Config,
        layer_mixer: PlayableHandle,
        backend: &mut dyn EvaluationBackend,
    ) -> Self {
        let root_handle = backend.create_mixer_playable(0);
        backend.connect(layer_mixer, index, root_handle);
        backend.set_layer_weight(layer_mixer, index, 1.0);
        debug!("layer {index}: created");
        Self {
            index,
            cfg: cfg.clone(),
            layer_mixer,
            weight: 1.0,
            weight_fade: None,
            mask: None,
            additive: false,
            curve: cfg.default_curve,
            root: RootMixer {
                handle: Some(root_handle),
                ..RootMixer::default()
            },
            nodes: Arena::new(),
            target: None,
            fade_progress: 0.0,
            fade_speed: 0.0,
            fade_completed: false,
            fading: FadeList::new(),
            pool: NodePool::new(cfg.pool_capacity),
            pending: PendingCleanup::new(),
            live_clips: HashMap::new(),
            clock: 0.0,
            on_fade_complete: ListenerList::new(),
            events: Vec::new(),
            scratch_fades: Vec::new(),
            scratch_nodes: Vec::new(),
        }
    }

    // ----- Read access -----

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Layer contribution weight in [0, 1].
    #[inline]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    #[inline]
    pub fn is_additive(&self) -> bool {
        self.additive
    }

    pub fn bone_mask(&self) -> Option<&BoneMask> {
        self.mask.as_ref()
    }

    #[inline]
    pub fn curve(&self) -> BlendCurve {
        self.curve
    }

    /// Foreground node, if any.
    #[inline]
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    #[inline]
    pub fn fade_progress(&self) -> f32 {
        self.fade_progress
    }

    /// Fading nodes, oldest first.
    pub fn fading(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.fading.iter().map(|s| s.node)
    }

    pub fn is_fading(&self, id: NodeId) -> bool {
        self.fading.contains(id)
    }

    /// Whether `id` is fading out because a newer play request interrupted it.
    pub fn is_interrupted(&self, id: NodeId) -> bool {
        self.fading.iter().any(|s| s.node == id && s.interrupted)
    }

    /// Current fade-out speed of a fading node, in weight per second.
    pub fn fade_out_speed(&self, id: NodeId) -> Option<f32> {
        self.fading.iter().find(|s| s.node == id).map(|s| s.speed)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&BlendNode> {
        self.nodes.get(id).map(|e| &e.node)
    }

    /// Number of nodes owned by this layer, pooled ones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Weight currently assigned to `id` in the root mixer; 0 when not connected.
    pub fn node_weight(&self, id: NodeId) -> f32 {
        self.nodes
            .get(id)
            .and_then(|e| e.port)
            .map_or(0.0, |p| self.root.weight(p))
    }

    pub fn node_time(&self, id: NodeId) -> f32 {
        self.node(id).map_or(0.0, BlendNode::time)
    }

    pub fn node_normalized_time(&self, id: NodeId) -> f32 {
        self.node(id).map_or(0.0, BlendNode::normalized_time)
    }

    pub fn node_speed(&self, id: NodeId) -> f32 {
        self.node(id).map_or(0.0, BlendNode::speed)
    }

    pub fn is_paused(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(BlendNode::is_paused)
    }

    pub fn is_playing(&self, id: NodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|e| e.port.is_some() && e.node.is_playing())
    }

    pub fn is_pooled(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|e| e.pooled)
    }

    pub fn is_pending_cleanup(&self, id: NodeId) -> bool {
        self.pending.contains(id)
    }

    /// Root mixer port of a connected node.
    pub fn port_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(id).and_then(|e| e.port)
    }

    /// Size of the root mixer's input array.
    pub fn port_count(&self) -> usize {
        self.root.inputs.len()
    }

    pub fn free_port_count(&self) -> usize {
        self.root.free_ports.len()
    }

    pub fn root_handle(&self) -> Option<PlayableHandle> {
        self.root.handle
    }

    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    pub fn pooled_count_for(&self, clip: ClipId) -> usize {
        self.pool.len_for(clip)
    }

    pub fn pending_cleanup_count(&self) -> usize {
        self.pending.len()
    }

    /// The live (non-pooled) node `play_clip` would reuse for `clip`.
    pub fn clip_node(&self, clip: ClipId) -> Option<NodeId> {
        self.live_clips
            .get(&clip)
            .copied()
            .filter(|id| self.nodes.contains(*id))
    }

    pub fn node_snapshot(&self, id: NodeId) -> Option<NodeSnapshot> {
        let node = self.node(id)?;
        Some(NodeSnapshot {
            id,
            clip: node.clip_id(),
            weight: self.node_weight(id),
            time: node.time(),
            normalized_time: node.normalized_time(),
            speed: node.speed(),
            paused: node.is_paused(),
        })
    }

    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            index: self.index,
            weight: self.weight,
            additive: self.additive,
            mask: self.mask.as_ref().map(|m| m.name.clone()),
            curve: self.curve,
            target: self.target.and_then(|t| self.node_snapshot(t)),
            fade_progress: self.fade_progress,
            fading: self
                .fading
                .iter()
                .filter_map(|s| {
                    Some(FadingSnapshot {
                        node: self.node_snapshot(s.node)?,
                        speed: s.speed,
                        interrupted: s.interrupted,
                    })
                })
                .collect(),
            pooled: self.pool.len(),
            pending_cleanup: self.pending.len(),
        }
    }

    // ----- Layer settings -----

    pub(crate) fn set_weight(&mut self, weight: f32, backend: &mut dyn EvaluationBackend) {
        if !weight.is_finite() {
            return;
        }
        self.weight_fade = None;
        self.weight = weight.clamp(0.0, 1.0);
        backend.set_layer_weight(self.layer_mixer, self.index, self.weight);
    }

    /// Linearly move the layer weight to `target` over `duration` seconds.
    pub(crate) fn start_fade(
        &mut self,
        target: f32,
        duration: f32,
        backend: &mut dyn EvaluationBackend,
    ) {
        if !target.is_finite() {
            return;
        }
        let target = target.clamp(0.0, 1.0);
        if !(duration > 0.0) {
            self.set_weight(target, backend);
            return;
        }
        self.weight_fade = Some(WeightFade {
            target,
            speed: (target - self.weight).abs() / duration,
        });
    }

    pub(crate) fn set_bone_mask(
        &mut self,
        mask: Option<BoneMask>,
        backend: &mut dyn EvaluationBackend,
    ) {
        backend.set_layer_mask(self.layer_mixer, self.index, mask.as_ref());
        self.mask = mask;
    }

    pub(crate) fn set_additive(&mut self, additive: bool, backend: &mut dyn EvaluationBackend) {
        self.additive = additive;
        backend.set_layer_additive(self.layer_mixer, self.index, additive);
    }

    pub(crate) fn set_curve(&mut self, curve: BlendCurve) {
        self.curve = curve;
    }

    pub(crate) fn on_fade_complete<F>(&mut self, listener: F) -> ListenerToken
    where
        F: FnMut(&BlendEvent) + 'static,
    {
        self.on_fade_complete.subscribe(listener)
    }

    pub(crate) fn remove_fade_complete(&mut self, token: ListenerToken) -> bool {
        self.on_fade_complete.unsubscribe(token)
    }

    // ----- Node creation -----

    fn insert_node(
        &mut self,
        mut node: BlendNode,
        recyclable: Option<ClipId>,
        backend: &mut dyn EvaluationBackend,
    ) -> NodeId {
        node.initialize(backend);
        let id = self.nodes.insert(LayerNode {
            node,
            port: None,
            recyclable,
            pooled: false,
        });
        debug!("layer {}: created node {:?}", self.index, id);
        id
    }

    pub(crate) fn create_clip_node(
        &mut self,
        clip: ClipId,
        data: &Arc<ClipData>,
        backend: &mut dyn EvaluationBackend,
    ) -> NodeId {
        let node = BlendNode::new(NodeKind::Clip(ClipNode::new(clip, Arc::clone(data))));
        self.insert_node(node, None, backend)
    }

    pub(crate) fn create_mixer(&mut self, backend: &mut dyn EvaluationBackend) -> NodeId {
        self.insert_node(BlendNode::new(NodeKind::Mixer(MixerNode::new())), None, backend)
    }

    pub(crate) fn create_linear_mixer(&mut self, backend: &mut dyn EvaluationBackend) -> NodeId {
        let node = BlendNode::new(NodeKind::LinearMixer(LinearMixerNode::new()));
        self.insert_node(node, None, backend)
    }

    pub(crate) fn create_blend2d(&mut self, backend: &mut dyn EvaluationBackend) -> NodeId {
        let node = BlendNode::new(NodeKind::Blend2D(Blend2DNode::new(
            self.cfg.exact_match_epsilon,
        )));
        self.insert_node(node, None, backend)
    }

    /// Insert a node built elsewhere (blend-tree instantiation).
    pub(crate) fn adopt(&mut self, node: BlendNode, backend: &mut dyn EvaluationBackend) -> NodeId {
        self.insert_node(node, None, backend)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut BlendNode> {
        match self.nodes.get_mut(id) {
            Some(entry) => Some(&mut entry.node),
            None => {
                warn!("layer {}: stale node {:?}", self.index, id);
                None
            }
        }
    }

    // ----- Play -----

    /// Play the layer's node for `clip`: the live one if it exists, else a pooled one, else a
    /// fresh clip node.
    pub(crate) fn play_clip(
        &mut self,
        clip: ClipId,
        data: &Arc<ClipData>,
        duration: f32,
        force_reset: bool,
        backend: &mut dyn EvaluationBackend,
    ) -> Option<NodeId> {
        let id = match self.clip_node(clip) {
            Some(id) => id,
            None => match self.unpool(clip) {
                Some(id) => id,
                None => {
                    let node =
                        BlendNode::new(NodeKind::Clip(ClipNode::new(clip, Arc::clone(data))));
                    let id = self.insert_node(node, Some(clip), backend);
                    self.live_clips.insert(clip, id);
                    id
                }
            },
        };
        self.play(id, duration, force_reset, backend)
    }

    fn unpool(&mut self, clip: ClipId) -> Option<NodeId> {
        while let Some(id) = self.pool.pop(clip) {
            if let Some(entry) = self.nodes.get_mut(id) {
                entry.pooled = false;
                self.live_clips.insert(clip, id);
                debug!("layer {}: reusing pooled node {:?}", self.index, id);
                return Some(id);
            }
        }
        None
    }

    /// Make `id` the foreground target, crossfading over `duration` seconds.
    pub(crate) fn play(
        &mut self,
        id: NodeId,
        duration: f32,
        force_reset: bool,
        backend: &mut dyn EvaluationBackend,
    ) -> Option<NodeId> {
        let Some(entry) = self.nodes.get_mut(id) else {
            warn!("layer {}: play on stale node {:?}", self.index, id);
            return None;
        };
        if entry.pooled {
            entry.pooled = false;
            self.pool.remove(id);
            if let Some(clip) = entry.recyclable {
                self.live_clips.insert(clip, id);
            }
        }

        if self.target == Some(id) {
            if force_reset {
                self.rebuild_node(id, backend);
            }
            return Some(id);
        }

        self.pending.cancel(id);
        self.connect(id, backend);

        let salvaged = self
            .fading
            .remove_node(id)
            .map(|_| self.node_weight(id).clamp(0.0, 1.0));

        let speed = if duration > 0.0 {
            1.0 / duration
        } else {
            f32::INFINITY
        };
        let multiplier = self.cfg.interrupt_multiplier;
        self.fading.interrupt_all(multiplier);
        if let Some(prev) = self.target.take() {
            let unfinished = self.fade_progress < 1.0;
            let prev_speed = if unfinished { speed * multiplier } else { speed };
            self.fading.push(prev, prev_speed, unfinished);
        }

        let start = salvaged.unwrap_or(0.0);
        self.target = Some(id);
        self.fade_progress = start;
        self.fade_speed = speed;
        self.fade_completed = false;
        self.set_node_weight(id, start, backend);

        if salvaged.is_none() || force_reset {
            self.rebuild_node(id, backend);
        }
        debug!(
            "layer {}: play {:?} over {}s (salvaged {:?}, fading {})",
            self.index,
            id,
            duration,
            salvaged,
            self.fading.len()
        );

        if !(duration > 0.0) {
            self.resolve_instantly(backend);
        }
        Some(id)
    }

    /// Retire every node: target and fading drop to weight 0 and wait for cleanup.
    pub(crate) fn stop(&mut self, backend: &mut dyn EvaluationBackend) {
        let deadline = self.deadline();
        if let Some(t) = self.target.take() {
            self.set_node_weight(t, 0.0, backend);
            self.pending.schedule(t, deadline);
        }
        for slot in self.fading.drain() {
            self.set_node_weight(slot.node, 0.0, backend);
            self.pending.schedule(slot.node, deadline);
        }
        self.fade_progress = 0.0;
        self.fade_completed = false;
        debug!("layer {}: stopped", self.index);
    }

    /// Hard-destroy `id`: release its handles, free its port and invalidate the id.
    pub(crate) fn destroy_node(&mut self, id: NodeId, backend: &mut dyn EvaluationBackend) -> bool {
        if !self.nodes.contains(id) {
            warn!("layer {}: destroy on stale node {:?}", self.index, id);
            return false;
        }
        if self.target == Some(id) {
            self.target = None;
            self.fade_progress = 0.0;
            self.fade_completed = false;
        }
        self.fading.remove_node(id);
        self.destroy_entry(id, backend);
        true
    }

    fn destroy_entry(&mut self, id: NodeId, backend: &mut dyn EvaluationBackend) {
        self.pending.cancel(id);
        self.pool.remove(id);
        let Some(mut entry) = self.nodes.remove(id) else {
            return;
        };
        if let Some(port) = entry.port {
            self.root.detach(port, backend);
        }
        if let Some(clip) = entry.recyclable {
            if self.live_clips.get(&clip) == Some(&id) {
                self.live_clips.remove(&clip);
            }
        }
        entry.node.destroy(backend);
        debug!("layer {}: destroyed node {:?}", self.index, id);
        self.events.push(BlendEvent::NodeDestroyed {
            layer: self.index,
            node: id,
        });
    }

    fn connect(&mut self, id: NodeId, backend: &mut dyn EvaluationBackend) {
        let Some(entry) = self.nodes.get_mut(id) else {
            return;
        };
        if entry.port.is_some() {
            return;
        }
        entry.node.initialize(backend);
        entry.port = Some(self.root.attach(id, entry.node.handle, backend));
    }

    fn rebuild_node(&mut self, id: NodeId, backend: &mut dyn EvaluationBackend) {
        let Some(entry) = self.nodes.get_mut(id) else {
            return;
        };
        entry.node.rebuild(backend);
        if let Some(port) = entry.port {
            self.root.reconnect(port, entry.node.handle, backend);
        }
    }

    fn set_node_weight(&mut self, id: NodeId, weight: f32, backend: &mut dyn EvaluationBackend) {
        if let Some(port) = self.nodes.get(id).and_then(|e| e.port) {
            self.root.set_weight(port, weight, backend);
        }
    }

    #[inline]
    fn deadline(&self) -> f64 {
        self.clock + f64::from(self.cfg.cleanup_delay)
    }

    /// Zero-duration transition: target to 1, every fading node to 0 and into cleanup.
    fn resolve_instantly(&mut self, backend: &mut dyn EvaluationBackend) {
        if let Some(t) = self.target {
            self.set_node_weight(t, 1.0, backend);
        }
        self.fade_progress = 1.0;
        let deadline = self.deadline();
        for slot in self.fading.drain() {
            self.set_node_weight(slot.node, 0.0, backend);
            self.pending.schedule(slot.node, deadline);
        }
        self.complete_fade();
    }

    fn complete_fade(&mut self) {
        let Some(node) = self.target else {
            return;
        };
        if self.fade_completed {
            return;
        }
        self.fade_completed = true;
        let event = BlendEvent::FadeCompleted {
            layer: self.index,
            node,
        };
        self.on_fade_complete.emit(&event);
        self.events.push(event);
    }

    // ----- Per-frame update -----

    pub(crate) fn update(&mut self, dt: f32, backend: &mut dyn EvaluationBackend) {
        if !dt.is_finite() {
            return;
        }
        let dt = dt.max(0.0);
        self.clock += f64::from(dt);

        self.update_layer_weight(dt, backend);
        self.update_crossfade(dt, backend);
        self.update_fading(dt, backend);
        self.normalize(backend);
        self.tick_nodes(dt, backend);
        self.process_cleanup(backend);
    }

    fn update_layer_weight(&mut self, dt: f32, backend: &mut dyn EvaluationBackend) {
        let Some(fade) = self.weight_fade else {
            return;
        };
        let step = fade_step(fade.speed, dt);
        let delta = fade.target - self.weight;
        if delta.abs() <= step {
            self.weight = fade.target;
            self.weight_fade = None;
        } else {
            self.weight += step.copysign(delta);
        }
        backend.set_layer_weight(self.layer_mixer, self.index, self.weight);
    }

    fn update_crossfade(&mut self, dt: f32, backend: &mut dyn EvaluationBackend) {
        let Some(target) = self.target else {
            return;
        };
        if self.fade_progress < 1.0 {
            self.fade_progress =
                (self.fade_progress + fade_step(self.fade_speed, dt)).clamp(0.0, 1.0);
            let w = self.curve.apply(self.fade_progress);
            self.set_node_weight(target, w, backend);
            trace!(
                "layer {}: crossfade {:?} progress {:.4} weight {:.4}",
                self.index,
                target,
                self.fade_progress,
                w
            );
        }
        if self.fade_progress >= 1.0 {
            self.complete_fade();
        }
    }

    fn update_fading(&mut self, dt: f32, backend: &mut dyn EvaluationBackend) {
        let mut ids = mem::take(&mut self.scratch_fades);
        self.fading.ids_into(&mut ids);
        let deadline = self.deadline();
        for fid in ids.iter().copied() {
            let Some(slot) = self.fading.get(fid).copied() else {
                continue;
            };
            let w = self.node_weight(slot.node) - fade_step(slot.speed, dt);
            if w <= 0.0 {
                self.set_node_weight(slot.node, 0.0, backend);
                self.fading.remove(fid);
                self.pending.schedule(slot.node, deadline);
                trace!("layer {}: {:?} faded out", self.index, slot.node);
            } else {
                self.set_node_weight(slot.node, w, backend);
            }
        }
        self.scratch_fades = ids;
    }

    /// Enforce `target + Σ fading == 1`.
    fn normalize(&mut self, backend: &mut dyn EvaluationBackend) {
        let mut fading = mem::take(&mut self.scratch_nodes);
        fading.clear();
        fading.extend(self.fading.iter().map(|s| s.node));
        let sum: f32 = fading.iter().map(|id| self.node_weight(*id)).sum();
        let eps = self.cfg.weight_epsilon;

        match self.target {
            None if fading.is_empty() => {}
            None if sum <= eps => {
                let even = 1.0 / fading.len() as f32;
                for id in &fading {
                    self.set_node_weight(*id, even, backend);
                }
            }
            None => {
                for id in &fading {
                    let w = self.node_weight(*id) / sum;
                    self.set_node_weight(*id, w, backend);
                }
            }
            Some(target) if fading.is_empty() => {
                self.set_node_weight(target, 1.0, backend);
            }
            Some(target) if sum <= eps => {
                self.set_node_weight(target, 1.0, backend);
                let deadline = self.deadline();
                for slot in self.fading.drain() {
                    self.set_node_weight(slot.node, 0.0, backend);
                    self.pending.schedule(slot.node, deadline);
                }
            }
            Some(target) => {
                let scale = (1.0 - self.node_weight(target)).max(0.0) / sum;
                for id in &fading {
                    let w = self.node_weight(*id) * scale;
                    self.set_node_weight(*id, w, backend);
                }
            }
        }
        self.scratch_nodes = fading;
    }

    fn tick_nodes(&mut self, dt: f32, backend: &mut dyn EvaluationBackend) {
        let mut ids = mem::take(&mut self.scratch_nodes);
        ids.clear();
        let threshold = self.cfg.tick_weight_threshold;
        for (id, entry) in self.nodes.iter() {
            let Some(port) = entry.port else {
                continue;
            };
            if self.target == Some(id) || self.root.weight(port) > threshold {
                ids.push(id);
            }
        }
        for id in ids.iter().copied() {
            let Some(entry) = self.nodes.get_mut(id) else {
                continue;
            };
            let mut ctx = TickContext {
                layer: self.index,
                node: id,
                child: None,
                sink: &mut self.events,
            };
            entry.node.tick(dt, backend, &mut ctx);
        }
        self.scratch_nodes = ids;
    }

    fn process_cleanup(&mut self, backend: &mut dyn EvaluationBackend) {
        let mut due = mem::take(&mut self.scratch_nodes);
        self.pending.drain_due(self.clock, &mut due);
        for id in due.iter().copied() {
            self.retire(id, backend);
        }
        self.scratch_nodes = due;
    }

    /// Disconnect a node whose cleanup delay elapsed, then pool, destroy or idle it.
    fn retire(&mut self, id: NodeId, backend: &mut dyn EvaluationBackend) {
        if self.target == Some(id) || self.fading.contains(id) {
            return;
        }
        let Some(entry) = self.nodes.get_mut(id) else {
            return;
        };
        if let Some(port) = entry.port.take() {
            self.root.detach(port, backend);
        }
        let Some(clip) = entry.recyclable else {
            debug!("layer {}: node {:?} idle", self.index, id);
            return;
        };
        if self.live_clips.get(&clip) == Some(&id) {
            self.live_clips.remove(&clip);
        }
        if self.pool.try_push(clip, id) {
            entry.pooled = true;
            debug!("layer {}: pooled node {:?} ({:?})", self.index, id, clip);
            self.events.push(BlendEvent::NodeRecycled {
                layer: self.index,
                node: id,
                clip,
            });
        } else {
            self.destroy_entry(id, backend);
        }
    }

    pub(crate) fn drain_events(&mut self, out: &mut Vec<BlendEvent>) {
        out.append(&mut self.events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn setup() -> (Layer, HeadlessBackend, Arc<ClipData>) {
        let mut backend = HeadlessBackend::new();
        let lm = backend.create_mixer_playable(1);
        let layer = Layer::new(0, &Config::default(), lm, &mut backend);
        (layer, backend, Arc::new(ClipData::new("walk", 1.0, true)))
    }

    #[test]
    fn ports_are_recycled_before_growing() {
        let (mut layer, mut backend, data) = setup();
        let a = layer.play_clip(ClipId(0), &data, 0.0, false, &mut backend).unwrap();
        let b = layer.play_clip(ClipId(1), &data, 0.0, false, &mut backend).unwrap();
        assert_eq!(layer.port_count(), 2);
        for _ in 0..30 {
            layer.update(0.1, &mut backend);
        }
        // a waited out the cleanup delay and was pooled
        assert!(layer.is_pooled(a));
        assert_eq!(layer.port_of(a), None);
        assert_eq!(layer.free_port_count(), 1);

        let c = layer.play_clip(ClipId(2), &data, 0.0, false, &mut backend).unwrap();
        assert_eq!(layer.port_count(), 2);
        assert_eq!(layer.port_of(c), Some(0));
        assert_eq!(layer.port_of(b), Some(1));
    }

    #[test]
    fn replaying_target_without_reset_is_a_no_op() {
        let (mut layer, mut backend, data) = setup();
        let a = layer.play_clip(ClipId(0), &data, 0.0, false, &mut backend).unwrap();
        layer.update(0.4, &mut backend);
        let handle = layer.node(a).unwrap().handle();
        layer.play(a, 0.3, false, &mut backend);
        assert_eq!(layer.node(a).unwrap().handle(), handle);
        assert!((layer.node_time(a) - 0.4).abs() < 1e-6);

        layer.play(a, 0.3, true, &mut backend);
        assert_ne!(layer.node(a).unwrap().handle(), handle);
        assert_eq!(layer.node_time(a), 0.0);
        assert_eq!(layer.node_weight(a), 1.0);
    }

    #[test]
    fn layer_weight_fade_is_linear() {
        let (mut layer, mut backend, _) = setup();
        layer.start_fade(0.0, 0.5, &mut backend);
        layer.update(0.25, &mut backend);
        assert!((layer.weight() - 0.5).abs() < 1e-6);
        layer.update(0.5, &mut backend);
        assert_eq!(layer.weight(), 0.0);
    }
}
