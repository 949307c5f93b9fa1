//! Landmarks exported by an external face-mesh tool.
//!
//! The manifest is a JSON object keyed by image identifier (usually the file
//! name). Each entry maps point names to either `[x, y]` or `{"x": .., "y": ..}`:
//!
//! ```json
//! { "img_001.jpg": { "left_eye": [201.0, 240.5], "right_eye": [311.0, 238.0] } }
//! ```
//!
//! Images without a manifest entry may carry a sidecar `<image>.landmarks.json`
//! holding a single entry in the same point format.

use super::{LandmarkExtractor, LandmarkMap, Point};
use crate::utils::SourceImage;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Pair([f64; 2]),
    Xy { x: f64, y: f64 },
}

impl From<RawPoint> for Point {
    fn from(raw: RawPoint) -> Self {
        match raw {
            RawPoint::Pair([x, y]) => Point::new(x, y),
            RawPoint::Xy { x, y } => Point::new(x, y),
        }
    }
}

type RawEntry = HashMap<String, RawPoint>;

fn entry_to_map(entry: RawEntry) -> LandmarkMap {
    LandmarkMap::from_named(entry.into_iter().map(|(name, raw)| (name, Point::from(raw))))
}

/// Extractor backed by precomputed landmark files.
#[derive(Debug, Clone, Default)]
pub struct ManifestExtractor {
    entries: HashMap<String, LandmarkMap>,
    sidecars: bool,
}

impl ManifestExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also look for `<image>.landmarks.json` next to path-based images.
    pub fn with_sidecars(mut self, enabled: bool) -> Self {
        self.sidecars = enabled;
        self
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let raw: HashMap<String, RawEntry> =
            serde_json::from_str(content).context("Invalid landmark manifest")?;
        let entries = raw
            .into_iter()
            .map(|(id, entry)| (id, entry_to_map(entry)))
            .collect();
        Ok(Self {
            entries,
            sidecars: false,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read landmark manifest {}", path.display()))?;
        Self::from_json_str(&content)
    }

    pub fn insert(&mut self, id: impl Into<String>, landmarks: LandmarkMap) {
        self.entries.insert(id.into(), landmarks);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, id: &str) -> Option<LandmarkMap> {
        if let Some(map) = self.entries.get(id) {
            return Some(map.clone());
        }

        let file_name = Path::new(id).file_name()?.to_string_lossy();
        if let Some(map) = self.entries.get(file_name.as_ref()) {
            return Some(map.clone());
        }

        if self.sidecars {
            return self.read_sidecar(id);
        }
        None
    }

    fn read_sidecar(&self, id: &str) -> Option<LandmarkMap> {
        let sidecar = PathBuf::from(format!("{}.landmarks.json", id));
        if !sidecar.is_file() {
            return None;
        }
        let parsed = fs::read_to_string(&sidecar)
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str::<RawEntry>(&content)?));
        match parsed {
            Ok(entry) => Some(entry_to_map(entry)),
            Err(e) => {
                warn!(sidecar = %sidecar.display(), error = %e, "Ignoring unreadable landmark sidecar");
                None
            }
        }
    }
}

impl LandmarkExtractor for ManifestExtractor {
    fn name(&self) -> &str {
        "manifest"
    }

    fn extract(&self, image: &SourceImage) -> Option<LandmarkMap> {
        let map = self.lookup(&image.id)?;
        if !map.has_eyes() {
            debug!(image = %image.id, "Manifest entry lacks eye centers");
            return None;
        }
        Some(map)
    }
}
