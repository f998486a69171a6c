// =============================================================================
// EDITOR SESSION - WIRES PLAYBACK, SCRUB BAR AND AUDIO TOGETHER
// =============================================================================
//
// One control thread owns the session and calls `pump()` regularly (every UI
// frame, or in a loop for headless use). A pump advances the playback tick,
// services the scrub bar's debounce and generation results, then routes the
// resulting events between components until everything has settled.
//
// =============================================================================

use image::RgbImage;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::audio::{AudioOutput, DriftCorrector};
use crate::core::{drain, format_time, Clock, EditorConfig, MarkerPair};
use crate::gui::scrub_bar::{ScrubBar, ScrubEvent};
use crate::video::{
    ClipInput, FfmpegTools, PlaybackController, PlaybackEvent, PlaybackStateKind, VideoFrame,
};

/// Event routing rounds per pump; routing one event can emit more.
const MAX_ROUTING_ROUNDS: usize = 16;

pub struct EditorSession {
    config: EditorConfig,
    controller: PlaybackController,
    scrub_bar: ScrubBar,
    audio: Box<dyn AudioOutput>,
    drift: DriftCorrector,

    playback_events: UnboundedReceiver<PlaybackEvent>,
    scrub_events: UnboundedReceiver<ScrubEvent>,

    resume_after_drag: bool,
    paused_for_generation: bool,

    current_frame: Option<VideoFrame>,
    frame_texture: Option<(u64, egui::TextureHandle)>,
    status: String,
    last_error: Option<String>,
}

impl EditorSession {
    pub fn new(config: EditorConfig, clock: Arc<dyn Clock>, audio: Box<dyn AudioOutput>) -> Self {
        let tools = FfmpegTools::from_config(&config);
        let mut controller = PlaybackController::new(config.playback.clone(), clock.clone()).with_tools(tools);
        let mut scrub_bar = ScrubBar::new(&config, clock);
        let playback_events = controller.subscribe();
        let scrub_events = scrub_bar.subscribe();

        Self {
            drift: DriftCorrector::new(config.sync.drift_threshold_ms),
            config,
            controller,
            scrub_bar,
            audio,
            playback_events,
            scrub_events,
            resume_after_drag: false,
            paused_for_generation: false,
            current_frame: None,
            frame_texture: None,
            status: selection_text(&MarkerPair::new()),
            last_error: None,
        }
    }

    /// Loads a clip into every component. A clip that fails to open leaves
    /// the session untouched.
    pub fn open(&mut self, input: impl Into<ClipInput>) -> anyhow::Result<()> {
        let source = self
            .controller
            .load(input)
            .map_err(|e| anyhow::anyhow!("Failed to open clip: {}", e))?;

        if let Err(e) = self.audio.load(&source) {
            log::warn!("Audio unavailable for this clip: {}", e);
        }
        self.resume_after_drag = false;
        self.paused_for_generation = false;
        self.last_error = None;
        self.scrub_bar.set_media(source);
        self.pump();
        Ok(())
    }

    // =========================================================================
    // Transport
    // =========================================================================

    pub fn play(&mut self) {
        self.controller.play();
        self.pump();
    }

    pub fn pause(&mut self) {
        self.paused_for_generation = false;
        self.controller.pause();
        self.pump();
    }

    pub fn toggle_play(&mut self) {
        if self.controller.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn stop(&mut self) {
        self.paused_for_generation = false;
        self.controller.stop();
        self.pump();
    }

    /// Committed seek, as if the scrub bar had been clicked.
    pub fn seek(&mut self, t: f64) {
        self.scrub_bar.seek_to(t);
        self.pump();
    }

    pub fn step(&mut self, frames: i64) {
        self.controller.step(frames);
        self.pump();
    }

    pub fn mark_in(&mut self) {
        let t = self.controller.position();
        self.scrub_bar.set_in(t);
        self.pump();
    }

    pub fn mark_out(&mut self) {
        let t = self.controller.position();
        self.scrub_bar.set_out(t);
        self.pump();
    }

    // =========================================================================
    // Event routing
    // =========================================================================

    pub fn pump(&mut self) {
        self.controller.poll();
        self.scrub_bar.poll();

        for _ in 0..MAX_ROUTING_ROUNDS {
            let playback = drain(&mut self.playback_events);
            let scrub = drain(&mut self.scrub_events);
            if playback.is_empty() && scrub.is_empty() {
                return;
            }
            for event in playback {
                self.handle_playback_event(event);
            }
            for event in scrub {
                self.handle_scrub_event(event);
            }
        }
        log::debug!("Event routing did not settle within one pump");
    }

    fn handle_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::ClipLoaded(duration) => {
                self.scrub_bar.set_duration(duration);
            }
            PlaybackEvent::FrameReady(frame) => {
                self.current_frame = Some(frame);
            }
            PlaybackEvent::PositionChanged(position) => {
                self.scrub_bar.set_position(position);
                self.correct_drift(position);
            }
            PlaybackEvent::StateChanged(PlaybackStateKind::Playing) => {
                self.audio.set_position_ms(to_ms(self.controller.position()));
                self.audio.play();
            }
            PlaybackEvent::StateChanged(PlaybackStateKind::Paused) => {
                self.audio.pause();
            }
            PlaybackEvent::StateChanged(PlaybackStateKind::Stopped) => {
                self.audio.pause();
                self.audio.set_position_ms(0);
            }
            PlaybackEvent::Error(message) => {
                log::error!("Playback error: {}", message);
                self.last_error = Some(message);
            }
        }
    }

    fn handle_scrub_event(&mut self, event: ScrubEvent) {
        match event {
            ScrubEvent::DragStarted => {
                if self.controller.is_playing() {
                    self.resume_after_drag = true;
                    self.controller.pause();
                    self.audio.pause();
                }
            }
            ScrubEvent::PreviewSeek(t) => {
                self.controller.seek(t, true);
            }
            ScrubEvent::CommitSeek(t) => {
                self.controller.seek(t, true);
                if self.audio_matches_video() {
                    self.audio.set_position_ms(to_ms(t));
                }
            }
            ScrubEvent::DragEnded => {
                if self.resume_after_drag {
                    self.resume_after_drag = false;
                    self.controller.play();
                }
            }
            ScrubEvent::MarkersChanged { in_point, out_point } => {
                log::debug!("Markers changed: {:?} / {:?}", in_point, out_point);
                self.status = selection_text(&self.scrub_bar.markers());
            }
            ScrubEvent::GenerationBusy(busy) => {
                if !self.config.sync.pause_during_generation {
                    return;
                }
                if busy && self.controller.is_playing() {
                    log::debug!("Pausing playback while visuals regenerate");
                    self.paused_for_generation = true;
                    self.controller.pause();
                } else if !busy && self.paused_for_generation {
                    self.paused_for_generation = false;
                    self.controller.play();
                }
            }
        }
    }

    fn correct_drift(&mut self, video_position: f64) {
        if !self.controller.is_playing() || !self.audio.is_playing() {
            return;
        }
        if let Some(target) = self.drift.check(self.audio.position_ms(), to_ms(video_position)) {
            self.audio.set_position_ms(target);
        }
    }

    fn audio_matches_video(&self) -> bool {
        let video_path = self.controller.source().and_then(|s| s.path());
        self.audio.is_loaded() && self.audio.source_path() == video_path
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn scrub_bar(&self) -> &ScrubBar {
        &self.scrub_bar
    }

    pub fn scrub_bar_mut(&mut self) -> &mut ScrubBar {
        &mut self.scrub_bar
    }

    pub fn audio(&self) -> &dyn AudioOutput {
        self.audio.as_ref()
    }

    pub fn position(&self) -> f64 {
        self.controller.position()
    }

    pub fn current_frame(&self) -> Option<&VideoFrame> {
        self.current_frame.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn drift_corrections(&self) -> u64 {
        self.drift.corrections()
    }

    pub fn markers(&self) -> MarkerPair {
        self.scrub_bar.markers()
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Draws the preview, transport row and scrub bar. Pumps first so the
    /// frame shown is the latest one.
    pub fn show(&mut self, ui: &mut egui::Ui) {
        self.pump();

        if let Some(frame) = &self.current_frame {
            let stale = self.frame_texture.as_ref().map_or(true, |(seq, _)| *seq != frame.sequence);
            if stale {
                let handle = ui.ctx().load_texture("editor-preview", to_color_image(&frame.image), egui::TextureOptions::LINEAR);
                self.frame_texture = Some((frame.sequence, handle));
            }
        }
        if let Some((_, texture)) = &self.frame_texture {
            let size = texture.size_vec2();
            let max_height = (ui.available_height() - 160.0).max(90.0);
            let scale = (ui.available_width() / size.x.max(1.0)).min(max_height / size.y.max(1.0));
            ui.image((texture.id(), size * scale));
        }

        ui.horizontal(|ui| {
            let label = if self.controller.is_playing() { "Pause" } else { "Play" };
            if ui.button(label).clicked() {
                self.toggle_play();
            }
            if ui.button("Stop").clicked() {
                self.stop();
            }
            if ui.button("<").clicked() {
                self.step(-1);
            }
            if ui.button(">").clicked() {
                self.step(1);
            }
            if ui.button("Set In").clicked() {
                self.mark_in();
            }
            if ui.button("Set Out").clicked() {
                self.mark_out();
            }
            ui.label(format!("{} / {}", format_time(self.position()), format_time(self.controller.duration())));
        });

        self.scrub_bar.show(ui);

        ui.horizontal(|ui| {
            ui.label(&self.status);
            if let Some(error) = &self.last_error {
                ui.colored_label(egui::Color32::LIGHT_RED, error);
            }
        });
    }
}

/// Status line for the current selection; empty when neither point is set.
pub fn selection_text(markers: &MarkerPair) -> String {
    if markers.in_point().is_none() && markers.out_point().is_none() {
        return String::new();
    }
    let side = |point: Option<f64>| point.map(format_time).unwrap_or_else(|| "--".to_string());
    format!("Selection: {} to {}", side(markers.in_point()), side(markers.out_point()))
}

fn to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

fn to_color_image(image: &RgbImage) -> egui::ColorImage {
    egui::ColorImage::from_rgb([image.width() as usize, image.height() as usize], image.as_raw())
}
