use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core::Clock;
use crate::video::ClipSource;

/// An audio sink that keeps its own clock. The editor session only ever talks
/// to it in milliseconds.
pub trait AudioOutput {
    /// Prepares the clip's audio track. Position resets to 0, paused.
    fn load(&mut self, source: &Arc<ClipSource>) -> anyhow::Result<()>;

    fn is_loaded(&self) -> bool;

    /// File the loaded audio came from, if any.
    fn source_path(&self) -> Option<&Path>;

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    fn position_ms(&self) -> i64;

    fn set_position_ms(&mut self, ms: i64);
}

/// Silent output that advances with a clock. `rate` lets tests model a device
/// that runs slow or fast.
pub struct ClockedAudioOutput {
    clock: Arc<dyn Clock>,
    rate: f64,
    loaded: bool,
    path: Option<PathBuf>,
    duration_ms: i64,
    playing: bool,
    base_ms: i64,
    started_at: Duration,
}

impl ClockedAudioOutput {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rate: 1.0,
            loaded: false,
            path: None,
            duration_ms: 0,
            playing: false,
            base_ms: 0,
            started_at: Duration::ZERO,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate.max(0.0);
        self
    }

    fn elapsed_ms(&self) -> i64 {
        if !self.playing {
            return 0;
        }
        let elapsed = self.clock.now().saturating_sub(self.started_at);
        (elapsed.as_secs_f64() * 1000.0 * self.rate) as i64
    }
}

impl AudioOutput for ClockedAudioOutput {
    fn load(&mut self, source: &Arc<ClipSource>) -> anyhow::Result<()> {
        self.loaded = source.has_audio();
        self.path = source.path().map(Path::to_path_buf);
        self.duration_ms = (source.duration().max(0.0) * 1000.0) as i64;
        self.playing = false;
        self.base_ms = 0;
        log::debug!("Clocked audio output ready (audio track: {})", self.loaded);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn source_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn play(&mut self) {
        if !self.loaded || self.playing {
            return;
        }
        self.started_at = self.clock.now();
        self.playing = true;
    }

    fn pause(&mut self) {
        if !self.playing {
            return;
        }
        self.base_ms = self.position_ms();
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position_ms(&self) -> i64 {
        (self.base_ms + self.elapsed_ms()).clamp(0, self.duration_ms)
    }

    fn set_position_ms(&mut self, ms: i64) {
        self.base_ms = ms.clamp(0, self.duration_ms);
        self.started_at = self.clock.now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::video::TestPatternDecoder;

    fn loaded_output(clock: &ManualClock, rate: f64) -> ClockedAudioOutput {
        let source = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(2.0, 24.0).with_audio(220.0)), None);
        let mut output = ClockedAudioOutput::new(Arc::new(clock.clone())).with_rate(rate);
        output.load(&source).unwrap();
        output
    }

    #[test]
    fn test_position_follows_clock_while_playing() {
        let clock = ManualClock::new();
        let mut output = loaded_output(&clock, 1.0);

        clock.advance_ms(100);
        assert_eq!(output.position_ms(), 0);

        output.play();
        clock.advance_ms(250);
        assert_eq!(output.position_ms(), 250);

        output.pause();
        clock.advance_ms(500);
        assert_eq!(output.position_ms(), 250);
    }

    #[test]
    fn test_seek_and_clamp() {
        let clock = ManualClock::new();
        let mut output = loaded_output(&clock, 1.0);

        output.set_position_ms(1500);
        output.play();
        clock.advance_ms(2000);
        assert_eq!(output.position_ms(), 2000);

        output.set_position_ms(-10);
        assert_eq!(output.position_ms(), 0);
    }

    #[test]
    fn test_slow_rate_lags() {
        let clock = ManualClock::new();
        let mut output = loaded_output(&clock, 0.5);
        output.play();
        clock.advance_ms(400);
        assert_eq!(output.position_ms(), 200);
    }

    #[test]
    fn test_silent_clip_never_plays() {
        let clock = ManualClock::new();
        let source = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(2.0, 24.0)), None);
        let mut output = ClockedAudioOutput::new(Arc::new(clock.clone()));
        output.load(&source).unwrap();
        output.play();
        assert!(!output.is_loaded());
        assert!(!output.is_playing());
    }
}
