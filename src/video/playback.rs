// =============================================================================
// PLAYBACK CONTROLLER - FRAME-ACCURATE PACING AGAINST A WALL CLOCK
// =============================================================================
//
// `current_frame` is the only position state. While playing, the controller
// remembers the clock time at which frame 0 would have been shown and, on each
// tick, works out which frame the wall clock says should be on screen.
//
// Ticks are cooperative: the owner calls `poll()` from its control loop and
// at most one tick runs per call. While playing, the source is asked to keep
// a forward decode running from the play position; every seek restarts it.
//
// =============================================================================

use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::core::{Clock, EventBus, PlaybackConfig};
use crate::video::error::{DecodeError, MediaOpenError};
use crate::video::ffmpeg::FfmpegTools;
use crate::video::source::{ClipInput, ClipSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStateKind {
    Stopped,
    Playing,
    Paused,
}

/// Snapshot of the controller's position bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub kind: PlaybackStateKind,
    pub current_frame: u64,
    pub total_frames: u64,
    pub duration: f64,
    pub fps: f64,
}

impl PlaybackState {
    pub fn playing(&self) -> bool {
        self.kind == PlaybackStateKind::Playing
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            kind: PlaybackStateKind::Stopped,
            current_frame: 0,
            total_frames: 0,
            duration: 0.0,
            fps: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub image: Arc<RgbImage>,
    pub timestamp: f64,
    /// Increments with every decoded frame
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    ClipLoaded(f64),
    FrameReady(VideoFrame),
    PositionChanged(f64),
    StateChanged(PlaybackStateKind),
    Error(String),
}

pub struct PlaybackController {
    config: PlaybackConfig,
    clock: Arc<dyn Clock>,
    tools: FfmpegTools,
    source: Option<Arc<ClipSource>>,
    state: PlaybackState,
    /// Clock time in seconds at which frame 0 was (virtually) shown; negative
    /// after seeking forward early in a session
    reference: f64,
    next_tick: Option<Duration>,
    last_frame: Option<VideoFrame>,
    frame_sequence: u64,
    events: EventBus<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(config: PlaybackConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            tools: FfmpegTools::default(),
            source: None,
            state: PlaybackState::default(),
            reference: 0.0,
            next_tick: None,
            last_frame: None,
            frame_sequence: 0,
            events: EventBus::new(),
        }
    }

    pub fn with_tools(mut self, tools: FfmpegTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Opens (or adopts) a source. On failure nothing about the current clip
    /// changes.
    pub fn load(&mut self, input: impl Into<ClipInput>) -> Result<Arc<ClipSource>, MediaOpenError> {
        let source = input.into().resolve_with(&self.tools)?;

        let fps = if source.fps() > 0.0 { source.fps() } else { self.config.default_fps };
        let duration = source.duration();
        let total_frames = if duration > 0.0 { (fps * duration).round() as u64 } else { 0 };

        if let Some(previous) = &self.source {
            previous.stop_stream();
        }
        self.next_tick = None;
        self.last_frame = None;
        self.source = Some(source.clone());
        self.state = PlaybackState {
            kind: PlaybackStateKind::Stopped,
            current_frame: 0,
            total_frames,
            duration,
            fps,
        };
        log::info!("Loaded clip: {:.3}s at {:.3} fps ({} frames)", duration, fps, total_frames);

        self.events.emit(PlaybackEvent::ClipLoaded(duration));
        self.events.emit(PlaybackEvent::StateChanged(PlaybackStateKind::Stopped));
        self.seek(0.0, true);
        Ok(source)
    }

    pub fn source(&self) -> Option<&Arc<ClipSource>> {
        self.source.as_ref()
    }

    pub fn play(&mut self) {
        if self.source.is_none() || self.state.total_frames == 0 {
            log::debug!("Play ignored: nothing loaded");
            return;
        }
        if self.state.playing() {
            return;
        }

        if self.state.current_frame + 1 >= self.state.total_frames {
            self.seek_frame(0, true);
        }

        let now = self.clock.now();
        self.reference = now.as_secs_f64() - self.frame_seconds(self.state.current_frame);
        self.next_tick = Some(now + self.tick_interval());
        self.set_kind(PlaybackStateKind::Playing);
        self.start_stream();
    }

    pub fn pause(&mut self) {
        if !self.state.playing() {
            return;
        }
        self.next_tick = None;
        self.stop_stream();
        self.set_kind(PlaybackStateKind::Paused);
    }

    pub fn stop(&mut self) {
        self.next_tick = None;
        self.stop_stream();
        self.state.kind = PlaybackStateKind::Stopped;
        log::debug!("Playback stopped");
        self.events.emit(PlaybackEvent::StateChanged(PlaybackStateKind::Stopped));
        if self.source.is_some() {
            self.seek_frame(0, true);
        }
    }

    /// Moves to the frame nearest `t`. The position is always reported; the
    /// frame itself only when `emit_frame` is set.
    pub fn seek(&mut self, t: f64, emit_frame: bool) {
        if self.source.is_none() {
            return;
        }
        let frame = self.frame_for_time(t);
        self.seek_frame(frame, emit_frame);
    }

    /// Frame-exact stepping. Pauses first when playing.
    pub fn step(&mut self, frames: i64) {
        if self.source.is_none() || self.state.total_frames == 0 {
            return;
        }
        self.pause();
        let last = self.state.total_frames as i64 - 1;
        let target = (self.state.current_frame as i64 + frames).clamp(0, last);
        self.seek_frame(target as u64, true);
    }

    pub fn set_frame_skipping(&mut self, enabled: bool) {
        log::debug!("Frame skipping {}", if enabled { "enabled" } else { "disabled" });
        self.config.frame_skip = enabled;
    }

    pub fn frame_skipping(&self) -> bool {
        self.config.frame_skip
    }

    /// Runs one tick if its deadline has passed. Returns whether it did.
    pub fn poll(&mut self) -> bool {
        let Some(deadline) = self.next_tick else {
            return false;
        };
        let now = self.clock.now();
        if now < deadline {
            return false;
        }

        self.tick();

        if self.state.playing() {
            let interval = self.tick_interval();
            let next = deadline + interval;
            // Late ticks re-schedule from now rather than piling up
            self.next_tick = Some(if next <= now { now + interval } else { next });
        }
        true
    }

    /// Advances to the frame the wall clock asks for.
    pub fn tick(&mut self) {
        if !self.state.playing() {
            return;
        }

        let elapsed = (self.clock.now().as_secs_f64() - self.reference).max(0.0);
        let desired = (elapsed * self.state.fps).floor() as u64;
        let current = self.state.current_frame;

        let mut target = current + 1;
        if self.config.frame_skip {
            if desired > current {
                target = desired;
            }
        } else if desired > current + self.config.sync_threshold_frames {
            log::debug!("Resyncing from frame {} to {}", current, desired);
            target = desired;
        }

        if target >= self.state.total_frames {
            self.stop();
            return;
        }

        self.state.current_frame = target;
        if let Err(e) = self.render_current() {
            log::error!("Playback halted: {}", e);
            self.next_tick = None;
            self.stop_stream();
            self.set_kind(PlaybackStateKind::Paused);
            self.events.emit(PlaybackEvent::Error(e.to_string()));
            return;
        }
        self.events.emit(PlaybackEvent::PositionChanged(self.position()));
    }

    pub fn position(&self) -> f64 {
        if self.source.is_none() || self.state.fps <= 0.0 {
            return 0.0;
        }
        self.state.current_frame as f64 / self.state.fps
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing()
    }

    pub fn duration(&self) -> f64 {
        self.state.duration
    }

    pub fn last_frame(&self) -> Option<&VideoFrame> {
        self.last_frame.as_ref()
    }

    pub fn tick_interval(&self) -> Duration {
        if self.state.fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.state.fps)
        } else {
            Duration::from_millis(40)
        }
    }

    fn frame_for_time(&self, t: f64) -> u64 {
        if self.state.total_frames == 0 || !t.is_finite() {
            return 0;
        }
        let last = (self.state.total_frames - 1) as f64;
        (t * self.state.fps).round().clamp(0.0, last) as u64
    }

    fn frame_seconds(&self, frame: u64) -> f64 {
        if self.state.fps > 0.0 {
            frame as f64 / self.state.fps
        } else {
            0.0
        }
    }

    fn seek_frame(&mut self, frame: u64, emit_frame: bool) {
        let playing = self.state.playing();
        if playing {
            self.stop_stream();
        }
        self.state.current_frame = frame;
        if playing {
            self.reference = self.clock.now().as_secs_f64() - self.frame_seconds(frame);
        }
        if emit_frame {
            if let Err(e) = self.render_current() {
                log::warn!("Seek could not decode frame {}: {}", frame, e);
                self.events.emit(PlaybackEvent::Error(e.to_string()));
            }
        }
        if playing {
            self.start_stream();
        }
        self.events.emit(PlaybackEvent::PositionChanged(self.position()));
    }

    fn start_stream(&self) {
        if let Some(source) = &self.source {
            source.start_stream(self.position());
        }
    }

    fn stop_stream(&self) {
        if let Some(source) = &self.source {
            source.stop_stream();
        }
    }

    fn render_current(&mut self) -> Result<(), DecodeError> {
        let Some(source) = self.source.clone() else {
            return Ok(());
        };
        let timestamp = self.position();
        let image = source.get_frame(timestamp)?;

        self.frame_sequence += 1;
        let frame = VideoFrame {
            image: Arc::new(image),
            timestamp,
            sequence: self.frame_sequence,
        };
        self.last_frame = Some(frame.clone());
        self.events.emit(PlaybackEvent::FrameReady(frame));
        Ok(())
    }

    fn set_kind(&mut self, kind: PlaybackStateKind) {
        if self.state.kind == kind {
            return;
        }
        log::debug!("Playback state {:?} -> {:?}", self.state.kind, kind);
        self.state.kind = kind;
        self.events.emit(PlaybackEvent::StateChanged(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{drain, ManualClock, SystemClock};
    use crate::video::pattern::TestPatternDecoder;
    use crate::video::source::{AudioSamples, MediaDecoder, MediaInfo};
    use std::thread;
    use std::time::Instant;

    fn controller_with(decoder: TestPatternDecoder, clock: &ManualClock) -> PlaybackController {
        let mut controller = PlaybackController::new(PlaybackConfig::default(), Arc::new(clock.clone()));
        controller
            .load(ClipSource::from_decoder(Box::new(decoder), None))
            .expect("pattern source always loads");
        controller
    }

    fn run_for(controller: &mut PlaybackController, clock: &ManualClock, ms: u64) {
        for _ in 0..ms {
            clock.advance_ms(1);
            controller.poll();
        }
    }

    #[test]
    fn test_short_clip_loads_with_first_frame() {
        let clock = ManualClock::new();
        let mut controller = PlaybackController::new(PlaybackConfig::default(), Arc::new(clock.clone()));
        let mut events = controller.subscribe();
        controller
            .load(ClipSource::from_decoder(Box::new(TestPatternDecoder::new(0.5, 24.0)), None))
            .unwrap();

        assert_eq!(controller.state().total_frames, 12);
        assert_eq!(controller.position(), 0.0);
        assert!(controller.last_frame().is_some());

        let events = drain(&mut events);
        assert_eq!(events[0], PlaybackEvent::ClipLoaded(0.5));
        assert_eq!(events[1], PlaybackEvent::StateChanged(PlaybackStateKind::Stopped));
        assert!(matches!(events[2], PlaybackEvent::FrameReady(_)));
        assert_eq!(events[3], PlaybackEvent::PositionChanged(0.0));
    }

    #[test]
    fn test_failed_load_keeps_previous_clip() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(2.0, 24.0), &clock);
        controller.seek(1.0, false);

        let result = controller.load(std::path::PathBuf::from("/missing/clip.mp4"));
        assert!(matches!(result, Err(MediaOpenError::NotFound(_))));
        assert_eq!(controller.state().total_frames, 48);
        assert_eq!(controller.position(), 1.0);
    }

    #[test]
    fn test_seek_clamps_to_frame_grid() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(2.0, 24.0), &clock);
        let total = controller.state().total_frames;

        for t in [-3.0, 0.0, 0.01, 0.52, 1.0, 1.99, 2.0, 50.0, f64::NAN] {
            controller.seek(t, false);
            let expected = if t.is_finite() { (t * 24.0).round().clamp(0.0, (total - 1) as f64) / 24.0 } else { 0.0 };
            let position = controller.position();
            assert_eq!(position, expected, "seek({})", t);
            assert!((0.0..2.0).contains(&position));
        }
    }

    #[test]
    fn test_seek_without_frame_only_reports_position() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(2.0, 24.0), &clock);
        let mut events = controller.subscribe();

        controller.seek(1.0, false);
        assert_eq!(drain(&mut events), vec![PlaybackEvent::PositionChanged(1.0)]);

        controller.seek(0.5, true);
        let events = drain(&mut events);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], PlaybackEvent::FrameReady(frame) if frame.timestamp == 0.5));
    }

    #[test]
    fn test_positions_are_monotonic_until_stop() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(1.0, 24.0), &clock);
        let mut events = controller.subscribe();

        controller.play();
        run_for(&mut controller, &clock, 2000);

        let mut last = -1.0;
        let mut stopped = false;
        for event in drain(&mut events) {
            match event {
                PlaybackEvent::PositionChanged(p) if !stopped => {
                    assert!(p > last, "position went from {} to {}", last, p);
                    last = p;
                }
                PlaybackEvent::StateChanged(PlaybackStateKind::Stopped) => stopped = true,
                _ => {}
            }
        }
        assert!(stopped);
        assert!(last > 0.9);
        assert_eq!(controller.position(), 0.0);
        assert!(!controller.is_playing());
    }

    #[test]
    fn test_play_then_pause_lands_inside_clip() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(0.5, 24.0), &clock);

        controller.play();
        run_for(&mut controller, &clock, 150);
        controller.pause();

        let position = controller.position();
        assert!(position > 0.0 && position < 0.5, "position {}", position);
        assert_eq!(controller.state().kind, PlaybackStateKind::Paused);
    }

    #[test]
    fn test_play_then_pause_against_wall_clock() {
        let mut controller = PlaybackController::new(PlaybackConfig::default(), SystemClock::shared());
        controller
            .load(ClipSource::from_decoder(Box::new(TestPatternDecoder::new(0.5, 24.0)), None))
            .unwrap();

        controller.play();
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(150) {
            controller.poll();
            thread::sleep(Duration::from_millis(2));
        }
        controller.pause();

        let position = controller.position();
        assert!(position > 0.0 && position < 0.5, "position {}", position);
    }

    #[test]
    fn test_frame_skip_jumps_to_wall_clock() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(10.0, 10.0), &clock);

        controller.play();
        clock.advance_ms(550);
        controller.poll();
        assert_eq!(controller.state().current_frame, 5);
    }

    #[test]
    fn test_frame_exact_mode_waits_for_threshold() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(10.0, 10.0), &clock);
        controller.set_frame_skipping(false);

        controller.play();
        // Two frames behind: still only advances one
        clock.advance_ms(250);
        controller.poll();
        assert_eq!(controller.state().current_frame, 1);

        // Four frames behind: resyncs
        clock.advance_ms(300);
        controller.poll();
        assert_eq!(controller.state().current_frame, 5);
    }

    #[test]
    fn test_play_at_end_wraps_to_start() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(1.0, 10.0), &clock);
        controller.seek(5.0, false);
        assert_eq!(controller.state().current_frame, 9);

        controller.play();
        assert_eq!(controller.state().current_frame, 0);
        assert!(controller.is_playing());
    }

    #[test]
    fn test_seek_while_playing_rebases_pacing() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(10.0, 10.0), &clock);

        controller.play();
        run_for(&mut controller, &clock, 500);
        controller.seek(8.0, false);
        clock.advance_ms(150);
        controller.poll();
        assert_eq!(controller.state().current_frame, 81);
        assert!(controller.is_playing());
    }

    #[test]
    fn test_decode_error_halts_playback() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(2.0, 10.0).fail_frames_from(0.3), &clock);
        let mut events = controller.subscribe();

        controller.play();
        run_for(&mut controller, &clock, 1000);

        assert_eq!(controller.state().kind, PlaybackStateKind::Paused);
        assert!(!controller.poll());
        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(e, PlaybackEvent::Error(_))));
        assert!(events.contains(&PlaybackEvent::StateChanged(PlaybackStateKind::Paused)));
    }

    #[test]
    fn test_step_pauses_and_clamps() {
        let clock = ManualClock::new();
        let mut controller = controller_with(TestPatternDecoder::new(1.0, 10.0), &clock);

        controller.play();
        controller.step(3);
        assert!(!controller.is_playing());
        assert_eq!(controller.state().current_frame, 3);

        controller.step(-10);
        assert_eq!(controller.state().current_frame, 0);
        controller.step(100);
        assert_eq!(controller.state().current_frame, 9);
    }

    #[test]
    fn test_controls_without_source_are_noops() {
        let mut controller = PlaybackController::new(PlaybackConfig::default(), SystemClock::shared());
        controller.play();
        controller.seek(1.0, true);
        controller.step(1);
        assert!(!controller.is_playing());
        assert_eq!(controller.position(), 0.0);
        assert!(controller.last_frame().is_none());
    }

    /// Logs the streaming hints it receives.
    struct StreamLog {
        inner: TestPatternDecoder,
        calls: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl MediaDecoder for StreamLog {
        fn info(&self) -> MediaInfo {
            self.inner.info()
        }

        fn frame_at(&mut self, timestamp: f64) -> Result<RgbImage, DecodeError> {
            self.inner.frame_at(timestamp)
        }

        fn audio_samples(&mut self, sample_rate: u32) -> Result<Option<AudioSamples>, DecodeError> {
            self.inner.audio_samples(sample_rate)
        }

        fn start_stream(&mut self, from: f64) {
            self.calls.lock().unwrap().push(format!("start {:.1}", from));
        }

        fn stop_stream(&mut self) {
            self.calls.lock().unwrap().push("stop".to_string());
        }
    }

    #[test]
    fn test_playback_streams_from_play_position() {
        let clock = ManualClock::new();
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let decoder = StreamLog { inner: TestPatternDecoder::new(3.0, 10.0), calls: calls.clone() };
        let mut controller = PlaybackController::new(PlaybackConfig::default(), Arc::new(clock.clone()));
        controller.load(ClipSource::from_decoder(Box::new(decoder), None)).unwrap();
        controller.seek(0.5, true);
        assert!(calls.lock().unwrap().is_empty());

        controller.play();
        run_for(&mut controller, &clock, 200);
        controller.seek(2.0, true);
        controller.pause();

        assert_eq!(*calls.lock().unwrap(), vec!["start 0.5", "stop", "start 2.0", "stop"]);
    }

    #[test]
    fn test_missing_fps_uses_default() {
        let clock = ManualClock::new();
        let controller = controller_with(TestPatternDecoder::new(1.0, 0.0), &clock);
        assert_eq!(controller.state().fps, 24.0);
        assert_eq!(controller.state().total_frames, 24);
    }
}
