use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::video::ClipSource;

/// Decoded PCM of the clip an output is playing. A load that fails leaves the
/// track empty, never holding the previous clip's samples.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
    path: Option<PathBuf>,
}

impl Default for AudioTrack {
    fn default() -> Self {
        Self {
            samples: Arc::new(Vec::new()),
            channels: 2,
            sample_rate: 0,
            path: None,
        }
    }
}

impl AudioTrack {
    pub fn load(&mut self, source: &ClipSource, sample_rate: u32) -> anyhow::Result<()> {
        self.clear();

        let audio = source
            .get_audio_samples(sample_rate)
            .map_err(|e| anyhow::anyhow!("Failed to decode audio track: {}", e))?;

        match audio {
            Some(audio) => {
                log::info!(
                    "Loaded {} audio frames ({} channels at {} Hz)",
                    audio.frame_count(), audio.channels, audio.sample_rate
                );
                self.channels = audio.channels.max(1);
                self.sample_rate = audio.sample_rate;
                self.samples = Arc::new(audio.samples);
            }
            None => log::info!("Clip has no audio track"),
        }
        self.path = source.path().map(Path::to_path_buf);
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_loaded(&self) -> bool {
        !self.samples.is_empty() && self.sample_rate > 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_ms(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let frames = self.samples.len() / self.channels.max(1) as usize;
        (frames as i64 * 1000) / self.sample_rate as i64
    }

    /// Interleaved samples from `ms` to the end.
    pub fn samples_from(&self, ms: i64) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        let frame = (ms.max(0) as u64 * self.sample_rate as u64 / 1000) as usize;
        let offset = frame.saturating_mul(channels).min(self.samples.len());
        self.samples[offset..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::TestPatternDecoder;

    fn source(decoder: TestPatternDecoder, path: &str) -> Arc<ClipSource> {
        ClipSource::from_decoder(Box::new(decoder), Some(PathBuf::from(path)))
    }

    #[test]
    fn test_load_decodes_whole_track() {
        let mut track = AudioTrack::default();
        track.load(&source(TestPatternDecoder::new(1.0, 24.0).with_audio(220.0), "a.mp4"), 1000).unwrap();

        assert!(track.is_loaded());
        assert_eq!(track.path(), Some(Path::new("a.mp4")));
        assert_eq!(track.duration_ms(), 1000);
        assert_eq!(track.samples_from(500).len(), 1000);
        assert!(track.samples_from(5000).is_empty());
    }

    #[test]
    fn test_failed_load_drops_previous_clip() {
        let mut track = AudioTrack::default();
        track.load(&source(TestPatternDecoder::new(1.0, 24.0).with_audio(220.0), "a.mp4"), 1000).unwrap();

        let broken = source(TestPatternDecoder::new(2.0, 24.0).with_audio(220.0).fail_audio(), "b.mp4");
        assert!(track.load(&broken, 1000).is_err());

        assert!(!track.is_loaded());
        assert_eq!(track.path(), None);
        assert_eq!(track.duration_ms(), 0);
        assert!(track.samples_from(0).is_empty());
    }

    #[test]
    fn test_silent_clip_is_not_loaded() {
        let mut track = AudioTrack::default();
        track.load(&source(TestPatternDecoder::new(1.0, 24.0), "silent.mp4"), 1000).unwrap();
        assert!(!track.is_loaded());
        assert_eq!(track.path(), Some(Path::new("silent.mp4")));
    }
}
