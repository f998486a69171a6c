// =============================================================================
// SCRUB BAR - TRACK, MARKERS, THUMBNAIL STRIP AND WAVEFORM
// =============================================================================
//
// The bar mirrors the playback position and turns pointer input into
// `ScrubEvent`s; it never seeks anything itself. Thumbnails and the waveform
// are produced by background jobs in two generation slots. Width changes are
// debounced so a window drag only regenerates once it settles.
//
// =============================================================================

use egui::{Align2, Color32, FontId, Pos2, Rect, Rounding, Sense, Stroke, TextureHandle, Vec2};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::core::{format_time, Clock, EditorConfig, EventBus, MarkerPair, ScrubConfig, WaveformConfig};
use crate::video::{
    generate_thumbnails, generate_waveform, thumbnail_count, waveform_point_count, ClipSource, GenerationEvent,
    GenerationSlot, ThumbnailRequest, ThumbnailSet, WaveformEnvelope,
};

const TRACK_HEIGHT: f32 = 24.0;
const LABEL_HEIGHT: f32 = 16.0;
const WAVEFORM_HEIGHT: f32 = 40.0;
const MARGIN: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ScrubEvent {
    DragStarted,
    /// Speculative seek while dragging
    PreviewSeek(f64),
    CommitSeek(f64),
    DragEnded,
    MarkersChanged {
        in_point: Option<f64>,
        out_point: Option<f64>,
    },
    GenerationBusy(bool),
}

pub struct ScrubBar {
    scrub_config: ScrubConfig,
    waveform_config: WaveformConfig,
    clock: Arc<dyn Clock>,
    events: EventBus<ScrubEvent>,

    source: Option<Arc<ClipSource>>,
    duration: f64,
    position: f64,
    markers: MarkerPair,
    range_label: String,

    dragging: bool,
    drag_position: f64,

    thumbnails: Option<ThumbnailSet>,
    waveform: Option<WaveformEnvelope>,
    thumbnail_slot: GenerationSlot<ThumbnailSet>,
    waveform_slot: GenerationSlot<WaveformEnvelope>,
    busy: bool,
    pub show_waveform: bool,

    width: u32,
    /// Width the current visuals were requested at
    generated_width: u32,
    resize_deadline: Option<Duration>,

    textures: Vec<(f64, TextureHandle)>,
    textures_dirty: bool,
}

impl ScrubBar {
    pub fn new(config: &EditorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            scrub_config: config.scrub.clone(),
            waveform_config: config.waveform.clone(),
            clock,
            events: EventBus::new(),
            source: None,
            duration: 0.0,
            position: 0.0,
            markers: MarkerPair::new(),
            range_label: String::new(),
            dragging: false,
            drag_position: 0.0,
            thumbnails: None,
            waveform: None,
            thumbnail_slot: GenerationSlot::new("thumbnail"),
            waveform_slot: GenerationSlot::new("waveform"),
            busy: false,
            show_waveform: true,
            width: 0,
            generated_width: 0,
            resize_deadline: None,
            textures: Vec::new(),
            textures_dirty: false,
        }
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<ScrubEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Media and position
    // =========================================================================

    /// Takes a new clip: duration is updated right away, visuals follow from
    /// the background jobs.
    pub fn set_media(&mut self, source: Arc<ClipSource>) {
        self.duration = source.duration().max(0.0);
        self.position = 0.0;
        self.thumbnails = None;
        self.waveform = None;
        self.textures_dirty = true;
        self.source = Some(source);
        self.revalidate_markers();
        self.regenerate();
    }

    pub fn clear_media(&mut self) {
        let wind_down = self.scrub_config.cancel_wait();
        self.thumbnail_slot.cancel(wind_down);
        self.waveform_slot.cancel(wind_down);
        self.source = None;
        self.duration = 0.0;
        self.position = 0.0;
        self.thumbnails = None;
        self.waveform = None;
        self.textures_dirty = true;
        self.resize_deadline = None;
        self.set_busy(false);
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(0.0);
        self.position = self.position.min(self.duration);
        self.revalidate_markers();
    }

    /// Mirrors the player position. Ignored mid-drag so the handle stays
    /// under the pointer.
    pub fn set_position(&mut self, t: f64) {
        if self.dragging {
            return;
        }
        self.position = t.clamp(0.0, self.duration);
    }

    pub fn position(&self) -> f64 {
        if self.dragging {
            self.drag_position
        } else {
            self.position
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    // =========================================================================
    // Drag and click
    // =========================================================================

    pub fn begin_drag(&mut self) {
        if self.dragging {
            return;
        }
        self.dragging = true;
        self.drag_position = self.position;
        self.events.emit(ScrubEvent::DragStarted);
    }

    pub fn drag_to(&mut self, t: f64) {
        if !self.dragging {
            self.begin_drag();
        }
        self.drag_position = t.clamp(0.0, self.duration);
        self.events.emit(ScrubEvent::PreviewSeek(self.drag_position));
    }

    pub fn end_drag(&mut self) {
        if !self.dragging {
            return;
        }
        self.dragging = false;
        self.position = self.drag_position;
        self.events.emit(ScrubEvent::CommitSeek(self.position));
        self.events.emit(ScrubEvent::DragEnded);
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Click on the track: a committed seek with no drag around it.
    pub fn seek_to(&mut self, t: f64) {
        self.position = t.clamp(0.0, self.duration);
        self.events.emit(ScrubEvent::CommitSeek(self.position));
    }

    // =========================================================================
    // Markers
    // =========================================================================

    pub fn markers(&self) -> MarkerPair {
        self.markers
    }

    pub fn range_label(&self) -> &str {
        &self.range_label
    }

    /// No-op until media with a positive duration is loaded.
    pub fn set_in(&mut self, t: f64) {
        if self.duration <= 0.0 {
            return;
        }
        self.markers.set_in(t.clamp(0.0, self.duration));
        self.markers_changed();
    }

    pub fn set_out(&mut self, t: f64) {
        if self.duration <= 0.0 {
            return;
        }
        self.markers.set_out(t.clamp(0.0, self.duration));
        self.markers_changed();
    }

    pub fn clear_in(&mut self) {
        self.markers.clear_in();
        self.markers_changed();
    }

    pub fn clear_out(&mut self) {
        self.markers.clear_out();
        self.markers_changed();
    }

    pub fn set_markers(&mut self, markers: MarkerPair) {
        self.markers = markers;
        self.revalidate_markers();
    }

    fn revalidate_markers(&mut self) {
        self.markers.clamp_to_duration(self.duration);
        self.markers_changed();
    }

    fn markers_changed(&mut self) {
        self.range_label = self.markers.range_label();
        let (in_point, out_point) = self.markers.pair();
        self.events.emit(ScrubEvent::MarkersChanged { in_point, out_point });
    }

    // =========================================================================
    // Background generation
    // =========================================================================

    /// Records the strip width. Regeneration waits until the width has been
    /// stable for the debounce window, and is skipped when the new width
    /// would produce the same visuals. The first real width after media was
    /// loaded without one regenerates right away.
    pub fn resize(&mut self, width: u32) {
        if width == self.width {
            return;
        }
        let first_layout = self.width == 0;
        self.width = width;
        if self.source.is_none() {
            return;
        }

        if self.same_output(width, self.generated_width) {
            self.resize_deadline = None;
        } else if first_layout {
            self.regenerate();
        } else {
            self.resize_deadline = Some(self.clock.now() + self.scrub_config.resize_debounce());
        }
    }

    fn same_output(&self, a: u32, b: u32) -> bool {
        let thumbs = |w: u32| thumbnail_count(&ThumbnailRequest::from_config(&self.scrub_config, w));
        let points = |w: u32| waveform_point_count(&self.waveform_config, w, usize::MAX);
        thumbs(a) == thumbs(b) && points(a) == points(b)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Cancels in-flight jobs and starts fresh ones for the current width.
    pub fn regenerate(&mut self) {
        self.resize_deadline = None;
        let Some(source) = self.source.clone() else {
            return;
        };
        let wind_down = self.scrub_config.cancel_wait();
        self.generated_width = self.width;

        let request = ThumbnailRequest::from_config(&self.scrub_config, self.width);
        let thumb_source = source.clone();
        let token = self
            .thumbnail_slot
            .start(wind_down, move |cancel| generate_thumbnails(&thumb_source, &request, cancel));
        log::debug!("Thumbnail generation {} started (width {})", token, self.width);

        let config = self.waveform_config.clone();
        let width = self.width;
        let token = self
            .waveform_slot
            .start(wind_down, move |cancel| generate_waveform(&source, &config, width, cancel));
        log::debug!("Waveform generation {} started (width {})", token, width);

        self.set_busy(true);
    }

    /// Fires a due debounce and applies finished jobs for the current tokens.
    pub fn poll(&mut self) {
        if let Some(deadline) = self.resize_deadline {
            if self.clock.now() >= deadline {
                self.regenerate();
            }
        }

        match self.thumbnail_slot.poll() {
            Some(GenerationEvent::Finished { token, value }) => {
                log::debug!("Applying {} thumbnails from generation {}", value.len(), token);
                self.thumbnails = Some(value);
                self.textures_dirty = true;
            }
            Some(GenerationEvent::Failed { token, reason }) => {
                log::warn!("Thumbnail generation {} failed: {}", token, reason);
                if reason.hides_visual() {
                    self.thumbnails = None;
                    self.textures_dirty = true;
                }
            }
            None => {}
        }

        match self.waveform_slot.poll() {
            Some(GenerationEvent::Finished { token, value }) => {
                log::debug!("Applying {}-point waveform from generation {}", value.len(), token);
                self.waveform = Some(value);
            }
            Some(GenerationEvent::Failed { token, reason }) => {
                if reason.hides_visual() {
                    log::debug!("Waveform hidden ({}), generation {}", reason, token);
                    self.waveform = None;
                } else {
                    log::warn!("Waveform generation {} failed: {}", token, reason);
                }
            }
            None => {}
        }

        if self.busy && !self.thumbnail_slot.is_pending() && !self.waveform_slot.is_pending() {
            self.set_busy(false);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Current (thumbnail, waveform) generation tokens.
    pub fn generation_tokens(&self) -> (u64, u64) {
        (self.thumbnail_slot.token(), self.waveform_slot.token())
    }

    pub fn thumbnails(&self) -> Option<&ThumbnailSet> {
        self.thumbnails.as_ref()
    }

    pub fn waveform(&self) -> Option<&WaveformEnvelope> {
        self.waveform.as_ref()
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            self.events.emit(ScrubEvent::GenerationBusy(busy));
        }
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    pub fn show(&mut self, ui: &mut egui::Ui) -> egui::Response {
        let available_width = ui.available_width().max(2.0 * MARGIN + 1.0);
        let thumb_height = self.scrub_config.thumbnail_height as f32;
        let waveform_height = if self.show_waveform && self.waveform.is_some() { WAVEFORM_HEIGHT } else { 0.0 };
        let total_height = LABEL_HEIGHT + TRACK_HEIGHT + thumb_height + waveform_height + 8.0;

        let (rect, response) = ui.allocate_exact_size(Vec2::new(available_width, total_height), Sense::click_and_drag());

        let track_rect = Rect::from_min_size(
            rect.min + Vec2::new(MARGIN, LABEL_HEIGHT),
            Vec2::new(available_width - 2.0 * MARGIN, TRACK_HEIGHT),
        );
        self.resize(track_rect.width() as u32);

        let duration = self.duration;
        let pointer_time = move |pos: Pos2| -> f64 {
            let fraction = ((pos.x - track_rect.min.x) / track_rect.width()).clamp(0.0, 1.0) as f64;
            fraction * duration
        };

        if response.drag_started() {
            self.begin_drag();
        }
        if response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                let t = pointer_time(pos);
                self.drag_to(t);
            }
        }
        if response.drag_stopped() {
            self.end_drag();
        } else if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let t = pointer_time(pos);
                self.seek_to(t);
            }
        }

        if self.textures_dirty {
            self.rebuild_textures(ui.ctx());
        }

        if ui.is_rect_visible(rect) {
            self.paint(ui, rect, track_rect, thumb_height, waveform_height);
        }

        response
    }

    fn rebuild_textures(&mut self, ctx: &egui::Context) {
        self.textures.clear();
        if let Some(set) = &self.thumbnails {
            for (i, thumb) in set.thumbnails.iter().enumerate() {
                let size = [thumb.image.width() as usize, thumb.image.height() as usize];
                let color_image = egui::ColorImage::from_rgb(size, thumb.image.as_raw());
                let handle = ctx.load_texture(format!("scrub-thumb-{}", i), color_image, egui::TextureOptions::LINEAR);
                self.textures.push((thumb.timestamp, handle));
            }
        }
        self.textures_dirty = false;
    }

    fn time_to_x(&self, track_rect: Rect, t: f64) -> f32 {
        if self.duration <= 0.0 {
            return track_rect.min.x;
        }
        track_rect.min.x + ((t / self.duration).clamp(0.0, 1.0) as f32) * track_rect.width()
    }

    fn paint(&self, ui: &egui::Ui, rect: Rect, track_rect: Rect, thumb_height: f32, waveform_height: f32) {
        let painter = ui.painter();
        let visuals = ui.visuals();

        painter.rect_filled(rect, Rounding::same(4.0), visuals.extreme_bg_color);

        // Track with selected span
        painter.rect_stroke(track_rect, Rounding::same(2.0), Stroke::new(1.0, visuals.text_color()));
        if let Some((start, end)) = self.markers.span(self.duration) {
            let span_rect = Rect::from_min_max(
                Pos2::new(self.time_to_x(track_rect, start), track_rect.min.y),
                Pos2::new(self.time_to_x(track_rect, end), track_rect.max.y),
            );
            painter.rect_filled(span_rect, Rounding::same(2.0), visuals.selection.bg_fill.gamma_multiply(0.5));
        }
        for marker in [self.markers.in_point(), self.markers.out_point()].into_iter().flatten() {
            let x = self.time_to_x(track_rect, marker);
            painter.line_segment(
                [Pos2::new(x, track_rect.min.y - 4.0), Pos2::new(x, track_rect.max.y + 4.0)],
                Stroke::new(2.0, visuals.selection.bg_fill),
            );
        }

        // Labels
        painter.text(
            Pos2::new(track_rect.min.x, rect.min.y + 2.0),
            Align2::LEFT_TOP,
            format!("{} / {}", format_time(self.position()), format_time(self.duration)),
            FontId::monospace(11.0),
            visuals.text_color(),
        );
        if !self.range_label.is_empty() {
            painter.text(
                Pos2::new(track_rect.max.x, rect.min.y + 2.0),
                Align2::RIGHT_TOP,
                &self.range_label,
                FontId::monospace(11.0),
                visuals.weak_text_color(),
            );
        }

        // Thumbnail strip
        let strip_rect = Rect::from_min_size(
            Pos2::new(track_rect.min.x, track_rect.max.y + 4.0),
            Vec2::new(track_rect.width(), thumb_height),
        );
        if !self.textures.is_empty() {
            let slot_width = strip_rect.width() / self.textures.len() as f32;
            let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
            for (i, (_, texture)) in self.textures.iter().enumerate() {
                let size = texture.size_vec2();
                let scale = (thumb_height / size.y.max(1.0)).min(slot_width / size.x.max(1.0));
                let image_rect = Rect::from_center_size(
                    Pos2::new(strip_rect.min.x + slot_width * (i as f32 + 0.5), strip_rect.center().y),
                    size * scale,
                );
                painter.image(texture.id(), image_rect, uv, Color32::WHITE);
            }
        } else if self.busy {
            painter.text(
                strip_rect.center(),
                Align2::CENTER_CENTER,
                "Generating thumbnails...",
                FontId::proportional(11.0),
                visuals.weak_text_color(),
            );
        }

        // Waveform strip
        let waveform_rect = Rect::from_min_size(
            Pos2::new(track_rect.min.x, strip_rect.max.y + 4.0),
            Vec2::new(track_rect.width(), waveform_height),
        );
        if let (Some(envelope), true) = (&self.waveform, waveform_height > 0.0) {
            let columns = waveform_rect.width().max(1.0) as usize;
            let half = waveform_rect.height() / 2.0;
            let mid = waveform_rect.center().y;
            for column in 0..columns {
                let t = self.duration * column as f64 / columns as f64;
                let amplitude = envelope.amplitude_at(t) * half;
                let x = waveform_rect.min.x + column as f32;
                painter.line_segment(
                    [Pos2::new(x, mid - amplitude), Pos2::new(x, mid + amplitude)],
                    Stroke::new(1.0, Color32::from_rgb(90, 160, 220)),
                );
            }
        }

        // Playhead across every strip
        let x = self.time_to_x(track_rect, self.position());
        let bottom = if waveform_height > 0.0 { waveform_rect.max.y } else { strip_rect.max.y };
        painter.line_segment(
            [Pos2::new(x, track_rect.min.y), Pos2::new(x, bottom)],
            Stroke::new(2.0, Color32::RED),
        );
        painter.rect_filled(
            Rect::from_center_size(Pos2::new(x, track_rect.min.y), Vec2::new(10.0, 8.0)),
            Rounding::same(2.0),
            Color32::RED,
        );
    }
}
