use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "clip-libraries")]
    clip_libraries: HashMap<String, String>,
    #[serde(rename = "blend-trees")]
    blend_trees: HashMap<String, BlendTreeEntry>,
}

/// A blend-tree description and, optionally, the clip library whose names it references.
#[derive(Debug, Deserialize)]
struct BlendTreeEntry {
    tree: String,
    #[serde(default)]
    clips: Option<String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod clip_libraries {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clip_libraries.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.clip_libraries, "clip library", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.clip_libraries, "clip library", name)?;
        super::load_json(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.clip_libraries, "clip library", name)?;
        Ok(resolve_path(rel))
    }
}

pub mod blend_trees {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.blend_trees.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.blend_trees, "blend tree", name)?;
        read_to_string(&entry.tree)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.blend_trees, "blend tree", name)?;
        super::load_json(&entry.tree)
    }

    /// JSON of the clip library the tree's clip names resolve against, if the manifest pairs one.
    pub fn clips_json(name: &str) -> Result<Option<String>> {
        let entry = lookup(&MANIFEST.blend_trees, "blend tree", name)?;
        match &entry.clips {
            Some(clips) => read_to_string(clips).map(Some),
            None => Ok(None),
        }
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.blend_trees, "blend tree", name)?;
        Ok(resolve_path(&entry.tree))
    }
}
