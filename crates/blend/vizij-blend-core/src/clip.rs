//! Clip descriptions and the host-owned clip library.
//!
//! A clip here is only what the blend graph needs to drive it: a name, a length and a loop flag.
//! Sampling the clip's bone curves is the evaluation backend's job.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::BlendError;
use crate::ids::{ClipId, IdAllocator};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipData {
    pub name: String,
    /// Length in seconds; 0 means unbounded.
    #[serde(default)]
    pub length: f32,
    #[serde(default)]
    pub looping: bool,
}

impl ClipData {
    pub fn new(name: impl Into<String>, length: f32, looping: bool) -> Self {
        Self {
            name: name.into(),
            length,
            looping,
        }
    }

    fn validate(&self) -> Result<(), BlendError> {
        if self.name.is_empty() {
            return Err(BlendError::invalid_tree("clip name must not be empty"));
        }
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(BlendError::invalid_tree(format!(
                "clip '{}' has invalid length {}",
                self.name, self.length
            )));
        }
        Ok(())
    }
}

/// Clip storage keyed by id, with name lookup.
#[derive(Default, Debug)]
pub struct ClipLibrary {
    ids: IdAllocator,
    items: Vec<(ClipId, Arc<ClipData>)>,
    by_name: HashMap<String, ClipId>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip. Loading a second clip with an existing name rebinds the name to the new
    /// id; the old id stays valid for nodes already using it.
    pub fn insert(&mut self, data: ClipData) -> ClipId {
        let id = self.ids.alloc_clip();
        self.by_name.insert(data.name.clone(), id);
        self.items.push((id, Arc::new(data)));
        id
    }

    pub fn get(&self, id: ClipId) -> Option<&Arc<ClipData>> {
        self.items
            .iter()
            .find_map(|(c, d)| if *c == id { Some(d) } else { None })
    }

    pub fn by_name(&self, name: &str) -> Option<ClipId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClipId, &ClipData)> {
        self.items.iter().map(|(id, d)| (*id, d.as_ref()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLibrary {
    List(Vec<ClipData>),
    Wrapped { clips: Vec<ClipData> },
}

/// Parse a clip library from JSON: either a bare array of clips or `{ "clips": [...] }`.
pub fn parse_clip_library_json(s: &str) -> Result<Vec<ClipData>, BlendError> {
    let raw: RawLibrary = serde_json::from_str(s)?;
    let clips = match raw {
        RawLibrary::List(clips) => clips,
        RawLibrary::Wrapped { clips } => clips,
    };
    for clip in &clips {
        clip.validate()?;
    }
    Ok(clips)
}
