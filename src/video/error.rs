use std::path::PathBuf;
use thiserror::Error;

/// A media source could not be opened. Nothing is kept from a failed open.
#[derive(Debug, Error)]
pub enum MediaOpenError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
}

/// Extracting a frame or audio samples failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("frame at {timestamp:.3}s: {reason}")]
    Frame { timestamp: f64, reason: String },
    #[error("audio: {0}")]
    Audio(String),
    #[error("decoder lock poisoned")]
    Poisoned,
}

/// Why a thumbnail or waveform job produced no result. Cancellation is not a
/// failure; a cancelled job simply reports nothing.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationFailure {
    #[error("clip has no positive duration")]
    NonPositiveDuration,
    #[error("clip has no audio track")]
    NoAudio,
    #[error("audio track is empty")]
    EmptyAudio,
    #[error("no frame could be decoded")]
    NoFrames,
    #[error("decode failed: {0}")]
    Decode(String),
}

impl GenerationFailure {
    /// Failures that mean there is nothing to show, as opposed to transient
    /// decode trouble where the previous visual stays up.
    pub fn hides_visual(&self) -> bool {
        matches!(
            self,
            GenerationFailure::NonPositiveDuration | GenerationFailure::NoAudio | GenerationFailure::EmptyAudio
        )
    }
}

impl From<DecodeError> for GenerationFailure {
    fn from(error: DecodeError) -> Self {
        GenerationFailure::Decode(error.to_string())
    }
}

impl DecodeError {
    pub fn frame(timestamp: f64, reason: impl Into<String>) -> Self {
        DecodeError::Frame {
            timestamp,
            reason: reason.into(),
        }
    }
}
