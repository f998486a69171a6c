use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::video::error::{DecodeError, MediaOpenError};
use crate::video::ffmpeg::{FfmpegDecoder, FfmpegTools};

/// Stream properties read once when a source is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

/// Interleaved PCM samples in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioSamples {
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Averages all channels of each frame into one sample.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Raw decode backend. Implementations are not expected to be reentrant;
/// `ClipSource` serializes every call.
pub trait MediaDecoder: Send {
    fn info(&self) -> MediaInfo;

    fn frame_at(&mut self, timestamp: f64) -> Result<RgbImage, DecodeError>;

    /// `Ok(None)` when the media has no audio track.
    fn audio_samples(&mut self, sample_rate: u32) -> Result<Option<AudioSamples>, DecodeError>;

    /// Frames will now be requested in order starting at `from`. Decoders
    /// that can keep one decode running use this; others ignore it.
    fn start_stream(&mut self, _from: f64) {}

    fn stop_stream(&mut self) {}
}

/// An opened clip. Every extraction call goes through one guard so the
/// playback tick and the background generators never decode concurrently.
pub struct ClipSource {
    path: Option<PathBuf>,
    info: MediaInfo,
    decoder: Mutex<Box<dyn MediaDecoder>>,
}

impl ClipSource {
    pub fn open(path: &Path) -> Result<Arc<Self>, MediaOpenError> {
        Self::open_with(path, &FfmpegTools::default())
    }

    pub fn open_with(path: &Path, tools: &FfmpegTools) -> Result<Arc<Self>, MediaOpenError> {
        let decoder = FfmpegDecoder::open(path, tools.clone())?;
        Ok(Self::from_decoder(Box::new(decoder), Some(path.to_path_buf())))
    }

    pub fn from_decoder(decoder: Box<dyn MediaDecoder>, path: Option<PathBuf>) -> Arc<Self> {
        let info = decoder.info();
        log::debug!(
            "Clip source ready: {:?} (duration: {:.3}s, fps: {:.3}, audio: {})",
            path, info.duration, info.fps, info.has_audio
        );
        Arc::new(Self {
            path,
            info,
            decoder: Mutex::new(decoder),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn duration(&self) -> f64 {
        self.info.duration
    }

    pub fn fps(&self) -> f64 {
        self.info.fps
    }

    pub fn has_audio(&self) -> bool {
        self.info.has_audio
    }

    pub fn get_frame(&self, timestamp: f64) -> Result<RgbImage, DecodeError> {
        let mut decoder = self.decoder.lock().map_err(|_| DecodeError::Poisoned)?;
        decoder.frame_at(timestamp)
    }

    pub fn start_stream(&self, from: f64) {
        match self.decoder.lock() {
            Ok(mut decoder) => decoder.start_stream(from),
            Err(_) => log::warn!("Decoder lock poisoned, not streaming"),
        }
    }

    pub fn stop_stream(&self) {
        if let Ok(mut decoder) = self.decoder.lock() {
            decoder.stop_stream();
        }
    }

    pub fn get_audio_samples(&self, sample_rate: u32) -> Result<Option<AudioSamples>, DecodeError> {
        if !self.info.has_audio {
            return Ok(None);
        }
        let mut decoder = self.decoder.lock().map_err(|_| DecodeError::Poisoned)?;
        decoder.audio_samples(sample_rate)
    }
}

impl std::fmt::Debug for ClipSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipSource")
            .field("path", &self.path)
            .field("info", &self.info)
            .finish()
    }
}

/// What callers may hand to `load`: a path still to be opened, or a source
/// that is already open and possibly shared.
#[derive(Debug, Clone)]
pub enum ClipInput {
    Path(PathBuf),
    Source(Arc<ClipSource>),
}

impl ClipInput {
    pub fn resolve(self) -> Result<Arc<ClipSource>, MediaOpenError> {
        self.resolve_with(&FfmpegTools::default())
    }

    pub fn resolve_with(self, tools: &FfmpegTools) -> Result<Arc<ClipSource>, MediaOpenError> {
        match self {
            ClipInput::Path(path) => ClipSource::open_with(&path, tools),
            ClipInput::Source(source) => Ok(source),
        }
    }
}

impl From<PathBuf> for ClipInput {
    fn from(path: PathBuf) -> Self {
        ClipInput::Path(path)
    }
}

impl From<&Path> for ClipInput {
    fn from(path: &Path) -> Self {
        ClipInput::Path(path.to_path_buf())
    }
}

impl From<Arc<ClipSource>> for ClipInput {
    fn from(source: Arc<ClipSource>) -> Self {
        ClipInput::Source(source)
    }
}
