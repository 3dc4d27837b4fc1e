//! Leaf node wrapping one clip.

use std::sync::Arc;

use crate::clip::ClipData;
use crate::ids::ClipId;

#[derive(Clone, Debug)]
pub struct ClipNode {
    clip: ClipId,
    data: Arc<ClipData>,
}

impl ClipNode {
    pub fn new(clip: ClipId, data: Arc<ClipData>) -> Self {
        Self { clip, data }
    }

    #[inline]
    pub fn clip(&self) -> ClipId {
        self.clip
    }

    pub fn data(&self) -> &ClipData {
        &self.data
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.data.length
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.data.looping
    }
}
