use image::{Rgb, RgbImage};

use crate::video::error::DecodeError;
use crate::video::source::{AudioSamples, MediaDecoder, MediaInfo};

/// Synthetic clip rendered in memory: a horizontal gradient that shifts with
/// time plus a bright column marking the frame index. Used by tests and by the
/// CLI `--pattern` mode.
#[derive(Debug, Clone)]
pub struct TestPatternDecoder {
    info: MediaInfo,
    tone_hz: f32,
    fail_after: Option<usize>,
    fail_from: Option<f64>,
    fail_audio_after: Option<usize>,
    frames_served: usize,
    audio_served: usize,
}

impl TestPatternDecoder {
    pub fn new(duration: f64, fps: f64) -> Self {
        Self {
            info: MediaInfo {
                duration,
                fps,
                width: 160,
                height: 90,
                has_audio: false,
            },
            tone_hz: 440.0,
            fail_after: None,
            fail_from: None,
            fail_audio_after: None,
            frames_served: 0,
            audio_served: 0,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.info.width = width.max(1);
        self.info.height = height.max(1);
        self
    }

    /// Adds a sine tone that swells in over the clip.
    pub fn with_audio(mut self, tone_hz: f32) -> Self {
        self.info.has_audio = true;
        self.tone_hz = tone_hz;
        self
    }

    /// Every frame request after the first `count` fails.
    pub fn fail_frames_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Requests at or after `timestamp` fail.
    pub fn fail_frames_from(mut self, timestamp: f64) -> Self {
        self.fail_from = Some(timestamp);
        self
    }

    pub fn fail_audio(self) -> Self {
        self.fail_audio_after(0)
    }

    /// Every audio request after the first `count` fails.
    pub fn fail_audio_after(mut self, count: usize) -> Self {
        self.fail_audio_after = Some(count);
        self
    }

    fn render(&self, timestamp: f64) -> RgbImage {
        let MediaInfo { width, height, fps, duration, .. } = self.info;
        let frame_index = (timestamp * fps).round().max(0.0) as u32;
        let progress = if duration > 0.0 { (timestamp / duration).clamp(0.0, 1.0) } else { 0.0 };
        let shift = (progress * 255.0) as u32;
        let marker = frame_index % width;

        RgbImage::from_fn(width, height, |x, y| {
            if x == marker {
                return Rgb([255, 255, 255]);
            }
            let r = ((x * 255 / width.max(1)) + shift) % 256;
            let g = y * 255 / height.max(1);
            Rgb([r as u8, g as u8, (255 - shift.min(255)) as u8])
        })
    }
}

impl MediaDecoder for TestPatternDecoder {
    fn info(&self) -> MediaInfo {
        self.info.clone()
    }

    fn frame_at(&mut self, timestamp: f64) -> Result<RgbImage, DecodeError> {
        if let Some(limit) = self.fail_after {
            if self.frames_served >= limit {
                return Err(DecodeError::frame(timestamp, "injected failure"));
            }
        }
        if let Some(from) = self.fail_from {
            if timestamp >= from {
                return Err(DecodeError::frame(timestamp, "injected failure"));
            }
        }
        self.frames_served += 1;
        Ok(self.render(timestamp))
    }

    fn audio_samples(&mut self, sample_rate: u32) -> Result<Option<AudioSamples>, DecodeError> {
        if !self.info.has_audio {
            return Ok(None);
        }
        if self.fail_audio_after.map_or(false, |limit| self.audio_served >= limit) {
            return Err(DecodeError::Audio("injected failure".to_string()));
        }
        self.audio_served += 1;

        let total = (self.info.duration.max(0.0) * sample_rate as f64).round() as usize;
        let rate = sample_rate.max(1) as f32;
        let mut samples = Vec::with_capacity(total * 2);
        for i in 0..total {
            let t = i as f32 / rate;
            let envelope = (i + 1) as f32 / total as f32;
            let value = (t * self.tone_hz * std::f32::consts::TAU).sin() * envelope;
            samples.push(value);
            samples.push(value);
        }

        Ok(Some(AudioSamples {
            samples,
            channels: 2,
            sample_rate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_match_requested_size() {
        let mut decoder = TestPatternDecoder::new(1.0, 24.0).with_size(32, 18);
        let frame = decoder.frame_at(0.5).unwrap();
        assert_eq!(frame.dimensions(), (32, 18));
    }

    #[test]
    fn test_frames_differ_over_time() {
        let mut decoder = TestPatternDecoder::new(2.0, 24.0);
        let a = decoder.frame_at(0.0).unwrap();
        let b = decoder.frame_at(1.0).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, decoder.frame_at(0.0).unwrap());
    }

    #[test]
    fn test_injected_failures() {
        let mut decoder = TestPatternDecoder::new(1.0, 10.0).fail_frames_after(2);
        assert!(decoder.frame_at(0.0).is_ok());
        assert!(decoder.frame_at(0.1).is_ok());
        assert!(decoder.frame_at(0.2).is_err());

        let mut decoder = TestPatternDecoder::new(1.0, 10.0).fail_frames_from(0.5);
        assert!(decoder.frame_at(0.4).is_ok());
        assert!(matches!(decoder.frame_at(0.5), Err(DecodeError::Frame { .. })));
    }

    #[test]
    fn test_audio_shape() {
        let mut silent = TestPatternDecoder::new(1.0, 10.0);
        assert_eq!(silent.audio_samples(200).unwrap(), None);

        let mut decoder = TestPatternDecoder::new(0.5, 10.0).with_audio(50.0);
        let audio = decoder.audio_samples(200).unwrap().unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.frame_count(), 100);
        assert!(audio.samples.iter().all(|s| (-1.0..=1.0).contains(s)));

        let mut broken = TestPatternDecoder::new(0.5, 10.0).with_audio(50.0).fail_audio();
        assert!(matches!(broken.audio_samples(200), Err(DecodeError::Audio(_))));

        let mut flaky = TestPatternDecoder::new(0.5, 10.0).with_audio(50.0).fail_audio_after(1);
        assert!(flaky.audio_samples(200).is_ok());
        assert!(flaky.audio_samples(200).is_err());
    }
}
