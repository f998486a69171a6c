// =============================================================================
// FFMPEG DECODER - SHELLS OUT TO THE FFMPEG / FFPROBE COMMAND LINE TOOLS
// =============================================================================
//
// Probing runs ffprobe once with JSON output. Seeks and thumbnails pull single
// frames as raw rgb24 over stdout, and a small LRU keeps recently decoded ones
// so scrubbing back and forth over the same spot does not spawn a new process
// each time. Playback reads from a `FrameStream` instead. Audio goes through a
// temporary 16-bit WAV that is read back with hound.
//
// =============================================================================

use image::RgbImage;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use uuid::Uuid;

use crate::core::EditorConfig;
use crate::video::error::{DecodeError, MediaOpenError};
use crate::video::source::{AudioSamples, MediaDecoder, MediaInfo};
use crate::video::stream::{FrameStream, StreamRead};

const FRAME_CACHE_CAPACITY: usize = 32;

/// Longest a streamed read waits for the decoder, in frame intervals.
const STREAM_WAIT_FRAMES: f64 = 0.5;

/// Locations of the external tools.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegTools {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_binary(),
            ffprobe: config.ffprobe_binary(),
        }
    }
}

pub struct FfmpegDecoder {
    path: PathBuf,
    tools: FfmpegTools,
    info: MediaInfo,
    audio_channels: u16,
    frame_cache: LruCache<i64, RgbImage>,
    stream: Option<FrameStream>,
}

impl FfmpegDecoder {
    pub fn open(path: &Path, tools: FfmpegTools) -> Result<Self, MediaOpenError> {
        if !path.exists() {
            return Err(MediaOpenError::NotFound(path.to_path_buf()));
        }

        let probe = probe_media(path, &tools)?;
        log::info!(
            "Opened {} ({}x{}, {:.3} fps, {:.3}s, audio channels: {})",
            path.display(), probe.info.width, probe.info.height, probe.info.fps,
            probe.info.duration, probe.audio_channels
        );

        Ok(Self {
            path: path.to_path_buf(),
            tools,
            info: probe.info,
            audio_channels: probe.audio_channels,
            frame_cache: LruCache::new(NonZeroUsize::new(FRAME_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN)),
            stream: None,
        })
    }

    /// Serves `timestamp` from the running stream when it is ahead of the
    /// stream's newest frame. `None` sends the caller to single-frame
    /// extraction.
    fn read_stream(&mut self, timestamp: f64) -> Option<RgbImage> {
        let stream = self.stream.as_mut()?;
        if !stream.covers(timestamp) {
            return None;
        }
        let wait = Duration::from_secs_f64(STREAM_WAIT_FRAMES / self.info.fps.max(1.0));
        match stream.read(timestamp, wait) {
            StreamRead::Frame(frame) => Some(frame),
            StreamRead::Pending => None,
            StreamRead::Ended => {
                log::debug!("Frame stream from {:.3}s ran out", stream.start());
                self.stream = None;
                None
            }
        }
    }

    fn extract_frame(&self, timestamp: f64) -> Result<RgbImage, DecodeError> {
        let output = Command::new(&self.tools.ffmpeg)
            .arg("-ss").arg(format!("{:.3}", timestamp))
            .arg("-i").arg(&self.path)
            .arg("-vframes").arg("1")
            .arg("-f").arg("rawvideo")
            .arg("-pix_fmt").arg("rgb24")
            .arg("-loglevel").arg("error")
            .arg("-nostdin")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DecodeError::frame(timestamp, format!("FFmpeg execution failed: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(DecodeError::frame(timestamp, format!("FFmpeg error: {}", error.trim())));
        }

        let (width, height) = (self.info.width, self.info.height);
        let expected_size = (width as usize) * (height as usize) * 3;
        if output.stdout.len() != expected_size {
            return Err(DecodeError::frame(
                timestamp,
                format!("Unexpected frame size: {} (expected {})", output.stdout.len(), expected_size),
            ));
        }

        RgbImage::from_raw(width, height, output.stdout)
            .ok_or_else(|| DecodeError::frame(timestamp, "frame buffer does not match dimensions"))
    }

    fn extract_audio(&self, sample_rate: u32) -> Result<AudioSamples, DecodeError> {
        let temp_path = std::env::temp_dir().join(format!("clipdozer-audio-{}.wav", Uuid::new_v4()));
        let channels = self.audio_channels.clamp(1, 2);

        let output = Command::new(&self.tools.ffmpeg)
            .arg("-i").arg(&self.path)
            .arg("-vn")
            .arg("-acodec").arg("pcm_s16le")
            .arg("-ar").arg(sample_rate.to_string())
            .arg("-ac").arg(channels.to_string())
            .arg("-loglevel").arg("error")
            .arg("-nostdin")
            .arg("-y")
            .arg(&temp_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DecodeError::Audio(format!("FFmpeg execution failed: {}", e)))?;

        if !output.status.success() {
            let _ = std::fs::remove_file(&temp_path);
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(DecodeError::Audio(format!("Failed to extract audio: {}", error.trim())));
        }

        let result = read_wav(&temp_path);
        let _ = std::fs::remove_file(&temp_path);
        result
    }
}

impl MediaDecoder for FfmpegDecoder {
    fn info(&self) -> MediaInfo {
        self.info.clone()
    }

    fn frame_at(&mut self, timestamp: f64) -> Result<RgbImage, DecodeError> {
        let timestamp = timestamp.max(0.0);
        if let Some(frame) = self.read_stream(timestamp) {
            return Ok(frame);
        }

        let key = cache_key(timestamp);
        if let Some(frame) = self.frame_cache.get(&key) {
            return Ok(frame.clone());
        }

        let frame = self.extract_frame(timestamp)?;
        self.frame_cache.put(key, frame.clone());
        Ok(frame)
    }

    fn start_stream(&mut self, from: f64) {
        self.stream = None;
        if self.info.fps <= 0.0 {
            return;
        }
        let from = from.max(0.0);
        match FrameStream::spawn(&self.tools.ffmpeg, &self.path, from, self.info.fps, self.info.width, self.info.height) {
            Ok(mut stream) => {
                // The frame on screen when playback starts is normally cached
                if let Some(frame) = self.frame_cache.get(&cache_key(from)) {
                    stream.seed(frame.clone());
                }
                self.stream = Some(stream);
            }
            Err(e) => log::warn!("Failed to start frame stream, decoding single frames: {}", e),
        }
    }

    fn stop_stream(&mut self) {
        self.stream = None;
    }

    fn audio_samples(&mut self, sample_rate: u32) -> Result<Option<AudioSamples>, DecodeError> {
        if !self.info.has_audio {
            return Ok(None);
        }
        log::debug!("Extracting audio from {} at {} Hz", self.path.display(), sample_rate);
        self.extract_audio(sample_rate).map(Some)
    }
}

fn cache_key(timestamp: f64) -> i64 {
    (timestamp * 1000.0).round() as i64
}

fn read_wav(path: &Path) -> Result<AudioSamples, DecodeError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| DecodeError::Audio(format!("Failed to read WAV: {}", e)))?;
    let spec = reader.spec();

    let samples: Result<Vec<f32>, _> = reader
        .samples::<i16>()
        .map(|s| s.map(|sample| sample as f32 / i16::MAX as f32))
        .collect();
    let samples = samples.map_err(|e| DecodeError::Audio(format!("Corrupt WAV data: {}", e)))?;

    Ok(AudioSamples {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

pub(crate) struct ProbeResult {
    pub info: MediaInfo,
    pub audio_channels: u16,
}

fn probe_media(path: &Path, tools: &FfmpegTools) -> Result<ProbeResult, MediaOpenError> {
    let output = Command::new(&tools.ffprobe)
        .arg("-v").arg("quiet")
        .arg("-print_format").arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| MediaOpenError::Spawn {
            tool: tools.ffprobe.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(MediaOpenError::Probe {
            path: path.to_path_buf(),
            reason: "ffprobe failed".to_string(),
        });
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    parse_probe(path, &json_str)
}

pub(crate) fn parse_probe(path: &Path, json_str: &str) -> Result<ProbeResult, MediaOpenError> {
    let info: serde_json::Value = serde_json::from_str(json_str).map_err(|e| MediaOpenError::Probe {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let empty_vec = vec![];
    let streams = info["streams"].as_array().unwrap_or(&empty_vec);

    let video = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| MediaOpenError::NoVideoStream(path.to_path_buf()))?;
    let audio = streams.iter().find(|s| s["codec_type"].as_str() == Some("audio"));

    let width = video["width"].as_u64().unwrap_or(0) as u32;
    let height = video["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(MediaOpenError::Probe {
            path: path.to_path_buf(),
            reason: "video stream has no dimensions".to_string(),
        });
    }

    let fps = ["avg_frame_rate", "r_frame_rate"]
        .iter()
        .filter_map(|key| video[*key].as_str().and_then(parse_frame_rate))
        .next()
        .unwrap_or(0.0);

    let duration = parse_seconds(&info["format"]["duration"])
        .or_else(|| parse_seconds(&video["duration"]))
        .unwrap_or(0.0);

    let audio_channels = audio
        .map(|a| a["channels"].as_u64().unwrap_or(2) as u16)
        .unwrap_or(0);

    Ok(ProbeResult {
        info: MediaInfo {
            duration,
            fps,
            width,
            height,
            has_audio: audio.is_some(),
        },
        audio_channels,
    })
}

fn parse_seconds(value: &serde_json::Value) -> Option<f64> {
    value.as_str().and_then(|s| s.parse::<f64>().ok()).filter(|d| d.is_finite())
}

/// Parses "30000/1001" or "25" style rates; zero denominators and zero rates
/// count as unknown.
pub(crate) fn parse_frame_rate(text: &str) -> Option<f64> {
    let text = text.trim();
    let fps = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => text.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then(|| fps.clamp(1.0, 1000.0))
}
