use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::core::markers::MarkerPair;

/// One imported clip and its selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipDescriptor {
    pub path: PathBuf,
    #[serde(default)]
    pub in_point: Option<f64>, // seconds
    #[serde(default)]
    pub out_point: Option<f64>, // seconds
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ClipDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            in_point: None,
            out_point: None,
            mute: false,
            metadata: Map::new(),
        }
    }

    pub fn from_markers(path: impl Into<PathBuf>, markers: &MarkerPair) -> Self {
        let mut clip = Self::new(path);
        clip.in_point = markers.in_point();
        clip.out_point = markers.out_point();
        clip
    }

    /// Length of the selection, `None` unless both ends are marked.
    pub fn duration_range(&self) -> Option<f64> {
        match (self.in_point, self.out_point) {
            (Some(start), Some(end)) => Some((end - start).max(0.0)),
            _ => None,
        }
    }

    pub fn markers(&self) -> MarkerPair {
        let mut markers = MarkerPair::new();
        if let Some(t) = self.in_point {
            markers.set_in(t);
        }
        if let Some(t) = self.out_point {
            markers.set_out(t);
        }
        markers
    }
}

/// Flat project document: an ordered clip list plus free-form extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub clips: Vec<ClipDescriptor>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

fn default_name() -> String {
    "Untitled".to_string()
}

fn default_version() -> u32 {
    1
}

impl Default for Project {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            clips: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_clip(&mut self, clip: ClipDescriptor) {
        self.clips.push(clip);
    }

    pub fn remove_clip(&mut self, index: usize) -> anyhow::Result<ClipDescriptor> {
        if index >= self.clips.len() {
            return Err(anyhow::anyhow!(
                "Clip index {} out of range ({} clips)",
                index,
                self.clips.len()
            ));
        }
        Ok(self.clips.remove(index))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write project {}: {}", path.display(), e))?;
        log::info!("Saved project '{}' to {}", self.name, path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read project {}: {}", path.display(), e))?;
        let project: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid project file {}: {}", path.display(), e))?;
        log::debug!("Loaded project '{}' with {} clips", project.name, project.clips.len());
        Ok(project)
    }
}
