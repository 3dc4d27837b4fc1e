//! Boundary to the skeletal evaluation backend.
//!
//! The blend graph never samples clips itself. It creates playables, wires them into mixers and
//! pushes time/speed/weight through [`EvaluationBackend`]. Hosts implement the trait over their
//! engine's animation system; [`HeadlessBackend`] keeps everything in memory for offline stepping
//! and tests.

use hashbrown::HashMap;

use crate::clip::ClipData;
use crate::ids::{ClipId, PlayableHandle};
use crate::mask::BoneMask;

/// Operations the blend graph consumes from the host's evaluation backend.
pub trait EvaluationBackend {
    /// Create a playable sampling `clip`.
    fn create_clip_playable(&mut self, clip: ClipId, data: &ClipData) -> PlayableHandle;
    /// Create a mixer playable with `input_count` empty ports.
    fn create_mixer_playable(&mut self, input_count: usize) -> PlayableHandle;
    fn destroy_playable(&mut self, handle: PlayableHandle);

    fn set_time(&mut self, handle: PlayableHandle, time: f32);
    fn set_speed(&mut self, handle: PlayableHandle, speed: f32);

    fn set_input_count(&mut self, mixer: PlayableHandle, count: usize);
    fn connect(&mut self, mixer: PlayableHandle, port: usize, child: PlayableHandle);
    fn disconnect(&mut self, mixer: PlayableHandle, port: usize);
    fn set_input_weight(&mut self, mixer: PlayableHandle, port: usize, weight: f32);

    /// Layer-level settings on the host's top-level layer mixer.
    fn set_layer_weight(&mut self, layer_mixer: PlayableHandle, layer: usize, weight: f32);
    fn set_layer_mask(&mut self, layer_mixer: PlayableHandle, layer: usize, mask: Option<&BoneMask>);
    fn set_layer_additive(&mut self, layer_mixer: PlayableHandle, layer: usize, additive: bool);
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlayableKind {
    Clip(ClipId),
    Mixer,
}

/// Everything the headless backend knows about one live playable.
#[derive(Clone, Debug)]
pub struct PlayableRecord {
    pub kind: PlayableKind,
    pub time: f32,
    pub speed: f32,
    pub inputs: Vec<Option<PlayableHandle>>,
    pub weights: Vec<f32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerRecord {
    pub weight: f32,
    pub mask: Option<String>,
    pub additive: bool,
}

/// In-memory backend. Records state without sampling anything.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next: u64,
    playables: HashMap<PlayableHandle, PlayableRecord>,
    layers: HashMap<(PlayableHandle, usize), LayerRecord>,
    created: usize,
    destroyed: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: PlayableKind, input_count: usize) -> PlayableHandle {
        let handle = PlayableHandle(self.next);
        self.next = self.next.wrapping_add(1);
        self.created += 1;
        self.playables.insert(
            handle,
            PlayableRecord {
                kind,
                time: 0.0,
                speed: 1.0,
                inputs: vec![None; input_count],
                weights: vec![0.0; input_count],
            },
        );
        handle
    }

    pub fn get(&self, handle: PlayableHandle) -> Option<&PlayableRecord> {
        self.playables.get(&handle)
    }

    pub fn is_alive(&self, handle: PlayableHandle) -> bool {
        self.playables.contains_key(&handle)
    }

    /// Number of live playables.
    pub fn live_count(&self) -> usize {
        self.playables.len()
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed
    }

    /// Weight on `port` of `mixer`, 0 for unknown mixers or ports.
    pub fn input_weight(&self, mixer: PlayableHandle, port: usize) -> f32 {
        self.playables
            .get(&mixer)
            .and_then(|r| r.weights.get(port).copied())
            .unwrap_or(0.0)
    }

    pub fn input(&self, mixer: PlayableHandle, port: usize) -> Option<PlayableHandle> {
        self.playables
            .get(&mixer)
            .and_then(|r| r.inputs.get(port).copied().flatten())
    }

    pub fn layer(&self, layer_mixer: PlayableHandle, layer: usize) -> Option<&LayerRecord> {
        self.layers.get(&(layer_mixer, layer))
    }

    fn ensure_port(record: &mut PlayableRecord, port: usize) {
        if record.inputs.len() <= port {
            record.inputs.resize(port + 1, None);
            record.weights.resize(port + 1, 0.0);
        }
    }
}

impl EvaluationBackend for HeadlessBackend {
    fn create_clip_playable(&mut self, clip: ClipId, _data: &ClipData) -> PlayableHandle {
        self.alloc(PlayableKind::Clip(clip), 0)
    }

    fn create_mixer_playable(&mut self, input_count: usize) -> PlayableHandle {
        self.alloc(PlayableKind::Mixer, input_count)
    }

    fn destroy_playable(&mut self, handle: PlayableHandle) {
        if self.playables.remove(&handle).is_some() {
            self.destroyed += 1;
        }
        // Destroying a child leaves an empty port behind in its parent.
        for record in self.playables.values_mut() {
            for input in record.inputs.iter_mut() {
                if *input == Some(handle) {
                    *input = None;
                }
            }
        }
    }

    fn set_time(&mut self, handle: PlayableHandle, time: f32) {
        if let Some(r) = self.playables.get_mut(&handle) {
            r.time = time;
        }
    }

    fn set_speed(&mut self, handle: PlayableHandle, speed: f32) {
        if let Some(r) = self.playables.get_mut(&handle) {
            r.speed = speed;
        }
    }

    fn set_input_count(&mut self, mixer: PlayableHandle, count: usize) {
        if let Some(r) = self.playables.get_mut(&mixer) {
            r.inputs.resize(count, None);
            r.weights.resize(count, 0.0);
        }
    }

    fn connect(&mut self, mixer: PlayableHandle, port: usize, child: PlayableHandle) {
        if let Some(r) = self.playables.get_mut(&mixer) {
            Self::ensure_port(r, port);
            r.inputs[port] = Some(child);
        }
    }

    fn disconnect(&mut self, mixer: PlayableHandle, port: usize) {
        if let Some(r) = self.playables.get_mut(&mixer) {
            if let Some(input) = r.inputs.get_mut(port) {
                *input = None;
            }
            if let Some(w) = r.weights.get_mut(port) {
                *w = 0.0;
            }
        }
    }

    fn set_input_weight(&mut self, mixer: PlayableHandle, port: usize, weight: f32) {
        if let Some(r) = self.playables.get_mut(&mixer) {
            Self::ensure_port(r, port);
            r.weights[port] = weight;
        }
    }

    fn set_layer_weight(&mut self, layer_mixer: PlayableHandle, layer: usize, weight: f32) {
        self.layers.entry((layer_mixer, layer)).or_default().weight = weight;
    }

    fn set_layer_mask(&mut self, layer_mixer: PlayableHandle, layer: usize, mask: Option<&BoneMask>) {
        self.layers.entry((layer_mixer, layer)).or_default().mask = mask.map(|m| m.name.clone());
    }

    fn set_layer_additive(&mut self, layer_mixer: PlayableHandle, layer: usize, additive: bool) {
        self.layers.entry((layer_mixer, layer)).or_default().additive = additive;
    }
}
