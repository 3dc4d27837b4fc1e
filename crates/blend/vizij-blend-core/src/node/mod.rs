//! Blend nodes: playable units with a time cursor, speed and scheduled events.
//!
//! One [`BlendNode`] type carries the shared cursor/event state; [`NodeKind`] selects the leaf or
//! composite behaviour. Composites own their children outright, so a child never outlives its
//! parent. A node's weight is not stored here: it is whatever the owning mixer's input table
//! holds for the node's port.
//!
//! - [`clip`] wraps a single clip.
//! - [`mixer`] is a generic weighted sum.
//! - [`linear`] blends by a 1-D parameter against sorted thresholds.
//! - [`blend2d`] blends by inverse distance to 2-D positions.

use glam::Vec2;

use crate::backend::EvaluationBackend;
use crate::ids::{ClipId, ListenerToken, NodeId, PlayableHandle};
use crate::listeners::ListenerList;
use crate::outputs::BlendEvent;
use crate::schedule::EventSchedule;

pub mod blend2d;
pub mod clip;
pub mod linear;
pub mod mixer;

pub use blend2d::{idw_weights, Blend2DNode};
pub use clip::ClipNode;
pub use linear::{linear_weights, LinearMixerNode};
pub use mixer::MixerNode;

#[derive(Debug)]
pub enum NodeKind {
    Clip(ClipNode),
    Mixer(MixerNode),
    LinearMixer(LinearMixerNode),
    Blend2D(Blend2DNode),
}

impl NodeKind {
    fn mixer(&self) -> Option<&MixerNode> {
        match self {
            NodeKind::Clip(_) => None,
            NodeKind::Mixer(m) => Some(m),
            NodeKind::LinearMixer(l) => Some(&l.mixer),
            NodeKind::Blend2D(b) => Some(&b.mixer),
        }
    }

    fn mixer_mut(&mut self) -> Option<&mut MixerNode> {
        match self {
            NodeKind::Clip(_) => None,
            NodeKind::Mixer(m) => Some(m),
            NodeKind::LinearMixer(l) => Some(&mut l.mixer),
            NodeKind::Blend2D(b) => Some(&mut b.mixer),
        }
    }
}

/// Where tick events are attributed and collected.
pub(crate) struct TickContext<'a> {
    pub layer: usize,
    pub node: NodeId,
    pub child: Option<usize>,
    pub sink: &'a mut Vec<BlendEvent>,
}

#[derive(Debug)]
pub struct BlendNode {
    pub(crate) handle: Option<PlayableHandle>,
    time: f32,
    speed: f32,
    paused: bool,
    events: EventSchedule,
    on_finished: ListenerList,
    finish_reported: bool,
    kind: NodeKind,
}

impl BlendNode {
    /// Build an uninitialized node; it has no backend handle until `initialize`.
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            handle: None,
            time: 0.0,
            speed: 1.0,
            paused: false,
            events: EventSchedule::new(),
            on_finished: ListenerList::new(),
            finish_reported: false,
            kind,
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn handle(&self) -> Option<PlayableHandle> {
        self.handle
    }

    /// Clip wrapped by a leaf node.
    pub fn clip_id(&self) -> Option<ClipId> {
        match &self.kind {
            NodeKind::Clip(c) => Some(c.clip()),
            _ => None,
        }
    }

    pub fn as_mixer(&self) -> Option<&MixerNode> {
        match &self.kind {
            NodeKind::Mixer(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_linear(&self) -> Option<&LinearMixerNode> {
        match &self.kind {
            NodeKind::LinearMixer(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_blend2d(&self) -> Option<&Blend2DNode> {
        match &self.kind {
            NodeKind::Blend2D(b) => Some(b),
            _ => None,
        }
    }

    /// Children of a composite; empty for clips.
    pub fn children(&self) -> &[BlendNode] {
        self.kind.mixer().map_or(&[], |m| m.children())
    }

    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Length in seconds; 0 for composites and unbounded clips.
    pub fn length(&self) -> f32 {
        match &self.kind {
            NodeKind::Clip(c) => c.length(),
            _ => 0.0,
        }
    }

    pub fn is_looping(&self) -> bool {
        match &self.kind {
            NodeKind::Clip(c) => c.is_looping(),
            _ => false,
        }
    }

    /// Cursor divided by length, 0 when the length is unbounded.
    pub fn normalized_time(&self) -> f32 {
        let len = self.length();
        if len > 0.0 {
            self.time / len
        } else {
            0.0
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// True while the cursor can still advance: not paused, and either looping, unbounded or
    /// short of the end.
    pub fn is_playing(&self) -> bool {
        if self.paused {
            return false;
        }
        let len = self.length();
        self.is_looping() || len <= 0.0 || self.time < len
    }

    pub fn scheduled_event_count(&self) -> usize {
        self.events.len()
    }

    pub fn finished_listener_count(&self) -> usize {
        self.on_finished.len()
    }

    pub(crate) fn add_scheduled_event(
        &mut self,
        time: f32,
        listener: Box<dyn FnMut(&BlendEvent)>,
    ) -> Option<ListenerToken> {
        self.events.add_boxed(time, listener)
    }

    pub(crate) fn remove_scheduled_event(&mut self, time: f32, token: ListenerToken) -> bool {
        self.events.remove(time, token)
    }

    pub(crate) fn remove_scheduled_events(&mut self, time: f32) -> usize {
        self.events.remove_all(time)
    }

    pub(crate) fn on_finished(&mut self, listener: Box<dyn FnMut(&BlendEvent)>) -> ListenerToken {
        self.on_finished.subscribe(listener)
    }

    pub(crate) fn remove_on_finished(&mut self, token: ListenerToken) -> bool {
        self.on_finished.unsubscribe(token)
    }

    /// Allocate backend handles for this node and, for composites, its children.
    pub(crate) fn initialize(&mut self, backend: &mut dyn EvaluationBackend) {
        if self.handle.is_some() {
            return;
        }
        let handle = match &mut self.kind {
            NodeKind::Clip(c) => backend.create_clip_playable(c.clip(), c.data()),
            kind => {
                let Some(mixer) = kind.mixer_mut() else {
                    return;
                };
                let handle = backend.create_mixer_playable(mixer.len());
                for child in mixer.children.iter_mut() {
                    child.initialize(backend);
                }
                mixer.connect_all(handle, backend);
                handle
            }
        };
        backend.set_time(handle, self.time);
        backend.set_speed(handle, self.effective_speed());
        self.handle = Some(handle);
    }

    /// Release backend handles, children first.
    pub(crate) fn release(&mut self, backend: &mut dyn EvaluationBackend) {
        if let Some(mixer) = self.kind.mixer_mut() {
            for child in mixer.children.iter_mut() {
                child.release(backend);
            }
        }
        if let Some(handle) = self.handle.take() {
            backend.destroy_playable(handle);
        }
    }

    /// Recreate the backend handles in place with the cursor back at 0. Identity, callbacks and
    /// (for composites) child weights are kept. The caller reconnects the new handle to its
    /// parent port.
    pub(crate) fn rebuild(&mut self, backend: &mut dyn EvaluationBackend) {
        self.release(backend);
        self.reset_cursor();
        self.initialize(backend);
    }

    fn reset_cursor(&mut self) {
        self.time = 0.0;
        self.finish_reported = false;
        if let Some(mixer) = self.kind.mixer_mut() {
            for child in mixer.children.iter_mut() {
                child.reset_cursor();
            }
        }
    }

    /// Structural destruction: release handles and drop every callback.
    pub(crate) fn destroy(&mut self, backend: &mut dyn EvaluationBackend) {
        self.release(backend);
        self.events.clear();
        self.on_finished.clear();
        if let Some(mixer) = self.kind.mixer_mut() {
            for child in mixer.children.iter_mut() {
                child.events.clear();
                child.on_finished.clear();
            }
        }
    }

    fn effective_speed(&self) -> f32 {
        if self.paused {
            0.0
        } else {
            self.speed
        }
    }

    pub(crate) fn set_speed(&mut self, backend: &mut dyn EvaluationBackend, speed: f32) {
        if !speed.is_finite() {
            return;
        }
        self.speed = speed;
        if let Some(h) = self.handle {
            backend.set_speed(h, self.effective_speed());
        }
    }

    pub(crate) fn set_paused(&mut self, backend: &mut dyn EvaluationBackend, paused: bool) {
        self.paused = paused;
        if let Some(h) = self.handle {
            backend.set_speed(h, self.effective_speed());
        }
    }

    /// Move the cursor. Keys at or before the new time fire on the next tick.
    pub(crate) fn seek(&mut self, backend: &mut dyn EvaluationBackend, time: f32) {
        if !time.is_finite() {
            return;
        }
        self.time = time.max(0.0);
        let len = self.length();
        if len <= 0.0 || self.time < len {
            self.finish_reported = false;
        }
        if let Some(h) = self.handle {
            backend.set_time(h, self.time);
        }
    }

    /// Advance the cursor by `dt * speed`, then fire due events and the finish callback.
    pub(crate) fn tick(
        &mut self,
        dt: f32,
        backend: &mut dyn EvaluationBackend,
        ctx: &mut TickContext<'_>,
    ) {
        let step = if self.paused { 0.0 } else { dt * self.speed };
        self.time = (self.time + step).max(0.0);
        if let Some(h) = self.handle {
            backend.set_time(h, self.time);
        }

        let (layer, node, child) = (ctx.layer, ctx.node, ctx.child);
        self.events.fire_due(
            self.time,
            |time| BlendEvent::ScheduledEvent {
                layer,
                node,
                child,
                time,
            },
            ctx.sink,
        );
        self.check_finished(ctx);

        if let Some(mixer) = self.kind.mixer_mut() {
            for (index, c) in mixer.children.iter_mut().enumerate() {
                let mut child_ctx = TickContext {
                    layer,
                    node,
                    child: Some(index),
                    sink: &mut *ctx.sink,
                };
                c.tick(step, backend, &mut child_ctx);
            }
        }
    }

    fn check_finished(&mut self, ctx: &mut TickContext<'_>) {
        let len = self.length();
        if self.finish_reported || self.is_looping() || len <= 0.0 || self.time < len {
            return;
        }
        self.finish_reported = true;
        let event = BlendEvent::NodeFinished {
            layer: ctx.layer,
            node: ctx.node,
            child: ctx.child,
        };
        self.on_finished.emit(&event);
        self.on_finished.clear();
        ctx.sink.push(event);
    }

    /// Append a child to a generic mixer with `weight`, then renormalize. Returns the child's
    /// index, or `None` when this node is not a generic mixer.
    pub(crate) fn add_mixer_child(
        &mut self,
        backend: &mut dyn EvaluationBackend,
        mut child: BlendNode,
        weight: f32,
    ) -> Option<usize> {
        let handle = self.handle;
        let NodeKind::Mixer(mixer) = &mut self.kind else {
            return None;
        };
        if handle.is_some() {
            child.initialize(backend);
        }
        let index = mixer.len();
        let mut weights = mixer.weights.clone();
        weights.push(weight);
        mixer.insert(index, child);
        mixer.set_normalized(&weights);
        if let Some(h) = handle {
            mixer.connect_tail(h, backend);
        }
        Some(index)
    }

    pub(crate) fn set_mixer_weights(
        &mut self,
        backend: &mut dyn EvaluationBackend,
        weights: &[f32],
    ) -> bool {
        let handle = self.handle;
        let NodeKind::Mixer(mixer) = &mut self.kind else {
            return false;
        };
        mixer.set_normalized(weights);
        if let Some(h) = handle {
            mixer.push_weights(h, backend);
        }
        true
    }

    /// Insert a child into a linear blend, rewiring every port when the insertion is not at the
    /// tail.
    pub(crate) fn add_linear_child(
        &mut self,
        backend: &mut dyn EvaluationBackend,
        mut child: BlendNode,
        threshold: f32,
    ) -> Option<usize> {
        if !threshold.is_finite() {
            return None;
        }
        let handle = self.handle;
        let NodeKind::LinearMixer(linear) = &mut self.kind else {
            return None;
        };
        if handle.is_some() {
            child.initialize(backend);
        }
        let index = linear.insert(child, threshold);
        if let Some(h) = handle {
            if index + 1 == linear.mixer.len() {
                linear.mixer.connect_tail(h, backend);
            } else {
                linear.mixer.connect_all(h, backend);
            }
        }
        Some(index)
    }

    pub(crate) fn add_blend2d_child(
        &mut self,
        backend: &mut dyn EvaluationBackend,
        mut child: BlendNode,
        position: Vec2,
    ) -> Option<usize> {
        if !position.is_finite() {
            return None;
        }
        let handle = self.handle;
        let NodeKind::Blend2D(blend) = &mut self.kind else {
            return None;
        };
        if handle.is_some() {
            child.initialize(backend);
        }
        let index = blend.push(child, position);
        if let Some(h) = handle {
            blend.mixer.connect_tail(h, backend);
        }
        Some(index)
    }

    pub(crate) fn set_linear_parameter(
        &mut self,
        backend: &mut dyn EvaluationBackend,
        value: f32,
    ) -> bool {
        if !value.is_finite() {
            return false;
        }
        let handle = self.handle;
        let NodeKind::LinearMixer(linear) = &mut self.kind else {
            return false;
        };
        linear.set_parameter(value);
        if let Some(h) = handle {
            linear.mixer.push_weights(h, backend);
        }
        true
    }

    pub(crate) fn set_blend2d_parameter(
        &mut self,
        backend: &mut dyn EvaluationBackend,
        point: Vec2,
    ) -> bool {
        if !point.is_finite() {
            return false;
        }
        let handle = self.handle;
        let NodeKind::Blend2D(blend) = &mut self.kind else {
            return false;
        };
        blend.set_parameter(point);
        if let Some(h) = handle {
            blend.mixer.push_weights(h, backend);
        }
        true
    }
}
