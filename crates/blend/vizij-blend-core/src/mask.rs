//! Per-layer bone masks.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

/// Set of joint names a layer is allowed to affect. The backend applies it; the blend graph only
/// stores and forwards it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoneMask {
    pub name: String,
    pub joints: HashSet<String>,
}

impl BoneMask {
    pub fn new<I, S>(name: impl Into<String>, joints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            joints: joints.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn contains(&self, joint: &str) -> bool {
        self.joints.contains(joint)
    }
}
