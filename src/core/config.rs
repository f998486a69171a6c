use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Jump to the wall-clock frame instead of advancing one frame per tick
    pub frame_skip: bool,
    /// Frame-exact mode only resyncs once this many frames behind
    pub sync_threshold_frames: u64,
    /// Used when a source reports no usable frame rate
    pub default_fps: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_skip: true,
            sync_threshold_frames: 2,
            default_fps: 24.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubConfig {
    pub max_thumbnails: usize,
    pub thumbnail_cap: usize,
    pub thumbnail_height: u32,
    pub resize_debounce_ms: u64,
    pub cancel_wait_ms: u64,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            max_thumbnails: 12,
            thumbnail_cap: 48,
            thumbnail_height: 50,
            resize_debounce_ms: 300,
            cancel_wait_ms: 50,
        }
    }
}

impl ScrubConfig {
    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn cancel_wait(&self) -> Duration {
        Duration::from_millis(self.cancel_wait_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    pub sample_rate: u32,
    pub min_points: usize,
    pub max_points: usize,
    pub default_points: usize,
    pub exponent: f32,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            sample_rate: 200,
            min_points: 80,
            max_points: 1600,
            default_points: 400,
            exponent: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Audio lagging video by more than this is pulled forward
    pub drift_threshold_ms: i64,
    /// Pause playback while thumbnails/waveform regenerate
    pub pause_during_generation: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_threshold_ms: 140,
            pause_during_generation: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub playback: PlaybackConfig,
    pub scrub: ScrubConfig,
    pub waveform: WaveformConfig,
    pub sync: SyncConfig,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

impl EditorConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file at {}: {}", config_path.display(), e))?;

            match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    log::info!("Loaded existing config from {}", config_path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!("Config file exists but has issues ({}), creating new one with defaults", e);
                    let new_config = Self::default();
                    new_config.save_to(config_path)
                        .map_err(|save_err| anyhow::anyhow!("Failed to save new config: {}", save_err))?;
                    Ok(new_config)
                }
            }
        } else {
            log::info!("No config file found, creating default config");
            let config = Self::default();
            config.save_to(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to save default config: {}", e))?;
            log::info!("Created new config file at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clipdozer")
            .join("config.json")
    }

    pub fn ffmpeg_binary(&self) -> PathBuf {
        self.ffmpeg_path.clone().unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    pub fn ffprobe_binary(&self) -> PathBuf {
        self.ffprobe_path.clone().unwrap_or_else(|| PathBuf::from("ffprobe"))
    }
}
