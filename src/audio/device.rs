use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::output::AudioOutput;
use crate::audio::track::AudioTrack;
use crate::video::ClipSource;

const DEVICE_SAMPLE_RATE: u32 = 48_000;

/// Counts the samples the device has pulled so the position follows what
/// was actually handed to the hardware.
struct CountingSource<S> {
    inner: S,
    consumed: Arc<AtomicU64>,
}

impl<S> Iterator for CountingSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;
        self.consumed.fetch_add(1, Ordering::Relaxed);
        Some(sample)
    }
}

impl<S> Source for CountingSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// Plays the clip's audio on the default output device. The whole track is
/// decoded once on load; seeking re-queues the buffer from the new offset.
pub struct RodioAudioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    track: AudioTrack,
    playing: bool,
    /// Position the current sink started from
    base_ms: i64,
    consumed: Arc<AtomicU64>,
}

impl RodioAudioOutput {
    pub fn new() -> anyhow::Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| anyhow::anyhow!("Failed to open default audio output: {}", e))?;
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            track: AudioTrack::default(),
            playing: false,
            base_ms: 0,
            consumed: Arc::new(AtomicU64::new(0)),
        })
    }

    fn stop_sink(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    /// Rebuilds the sink starting at `base_ms`.
    fn requeue(&mut self) {
        self.stop_sink();
        self.consumed = Arc::new(AtomicU64::new(0));
        if !self.track.is_loaded() {
            return;
        }

        let sink = match Sink::try_new(&self.handle) {
            Ok(sink) => sink,
            Err(e) => {
                log::error!("Failed to create audio sink: {}", e);
                return;
            }
        };

        let buffer = SamplesBuffer::new(
            self.track.channels(),
            self.track.sample_rate(),
            self.track.samples_from(self.base_ms),
        );
        sink.append(CountingSource { inner: buffer, consumed: self.consumed.clone() });

        if !self.playing {
            sink.pause();
        }
        self.sink = Some(sink);
    }
}

impl AudioOutput for RodioAudioOutput {
    fn load(&mut self, source: &Arc<ClipSource>) -> anyhow::Result<()> {
        self.stop_sink();
        self.playing = false;
        self.base_ms = 0;

        self.track.load(source, DEVICE_SAMPLE_RATE)?;
        self.requeue();
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.track.is_loaded()
    }

    fn source_path(&self) -> Option<&Path> {
        self.track.path()
    }

    fn play(&mut self) {
        if self.playing || !self.track.is_loaded() {
            return;
        }
        self.playing = true;
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn pause(&mut self) {
        if !self.playing {
            return;
        }
        self.playing = false;
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position_ms(&self) -> i64 {
        let channels = self.track.channels().max(1) as u64;
        let rate = self.track.sample_rate().max(1) as u64;
        let frames = self.consumed.load(Ordering::Relaxed) / channels;
        let played = (frames * 1000 / rate) as i64;
        (self.base_ms + played).clamp(0, self.track.duration_ms())
    }

    fn set_position_ms(&mut self, ms: i64) {
        self.base_ms = ms.clamp(0, self.track.duration_ms());
        self.requeue();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_source_tracks_pulled_samples() {
        let consumed = Arc::new(AtomicU64::new(0));
        let mut source = CountingSource {
            inner: SamplesBuffer::new(2, 1000, vec![0.25f32; 8]),
            consumed: consumed.clone(),
        };
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 1000);

        for _ in 0..6 {
            source.next();
        }
        assert_eq!(consumed.load(Ordering::Relaxed), 6);

        assert_eq!(source.by_ref().count(), 2);
        assert_eq!(consumed.load(Ordering::Relaxed), 8);
    }
}
