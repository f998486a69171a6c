use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;

use crate::core::ScrubConfig;
use crate::video::error::GenerationFailure;
use crate::video::source::ClipSource;
use crate::video::task::CancelToken;

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub max_thumbnails: usize,
    pub cap: usize,
    pub height: u32,
    /// Strip width in pixels; 0 when unknown
    pub width_hint: u32,
}

impl ThumbnailRequest {
    pub fn from_config(config: &ScrubConfig, width_hint: u32) -> Self {
        Self {
            max_thumbnails: config.max_thumbnails,
            cap: config.thumbnail_cap,
            height: config.thumbnail_height,
            width_hint,
        }
    }
}

impl Default for ThumbnailRequest {
    fn default() -> Self {
        Self::from_config(&ScrubConfig::default(), 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub image: Arc<RgbImage>,
    pub timestamp: f64,
}

/// One strip of thumbnails, produced for one generation token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThumbnailSet {
    pub thumbnails: Vec<Thumbnail>,
    pub duration: f64,
}

impl ThumbnailSet {
    pub fn len(&self) -> usize {
        self.thumbnails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.thumbnails.iter().map(|t| t.timestamp).collect()
    }
}

/// Roughly one thumbnail per 100 px of strip, never fewer than the configured
/// maximum nor more than the cap.
pub fn thumbnail_count(request: &ThumbnailRequest) -> usize {
    let count = if request.width_hint > 0 {
        let approx = (request.width_hint as usize / 100).max(3);
        request.max_thumbnails.max(approx).min(request.cap)
    } else {
        request.max_thumbnails.min(request.cap)
    };
    count.max(1)
}

pub fn sample_times(duration: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| i as f64 * duration / count as f64).collect()
}

pub fn scale_to_height(frame: &RgbImage, height: u32) -> RgbImage {
    let (w, h) = frame.dimensions();
    if h == 0 || w == 0 || h == height {
        return frame.clone();
    }
    let width = ((w as f64 * height as f64 / h as f64).round() as u32).max(1);
    imageops::resize(frame, width, height.max(1), FilterType::Triangle)
}

/// Decodes one frame per sample time. Returns `None` when cancelled. Frames
/// that fail to decode are skipped; the job fails only if none succeed.
pub fn generate_thumbnails(
    source: &ClipSource,
    request: &ThumbnailRequest,
    cancel: &CancelToken,
) -> Option<Result<ThumbnailSet, GenerationFailure>> {
    let duration = source.duration();
    if !(duration > 0.0) {
        return Some(Err(GenerationFailure::NonPositiveDuration));
    }

    let count = thumbnail_count(request);
    let mut thumbnails = Vec::with_capacity(count);
    let mut last_error = None;

    for timestamp in sample_times(duration, count) {
        if cancel.is_cancelled() {
            return None;
        }
        match source.get_frame(timestamp) {
            Ok(frame) => thumbnails.push(Thumbnail {
                image: Arc::new(scale_to_height(&frame, request.height)),
                timestamp,
            }),
            Err(e) => {
                log::debug!("Skipping thumbnail at {:.3}s: {}", timestamp, e);
                last_error = Some(e);
            }
        }
    }

    if thumbnails.is_empty() {
        return Some(Err(match last_error {
            Some(e) => GenerationFailure::from(e),
            None => GenerationFailure::NoFrames,
        }));
    }

    log::debug!("Generated {}/{} thumbnails", thumbnails.len(), count);
    Some(Ok(ThumbnailSet { thumbnails, duration }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::pattern::TestPatternDecoder;

    fn request(width_hint: u32) -> ThumbnailRequest {
        ThumbnailRequest { width_hint, ..ThumbnailRequest::default() }
    }

    #[test]
    fn test_count_heuristic() {
        assert_eq!(thumbnail_count(&request(0)), 12);
        assert_eq!(thumbnail_count(&request(250)), 12);
        assert_eq!(thumbnail_count(&request(2000)), 20);
        assert_eq!(thumbnail_count(&request(10_000)), 48);
        assert_eq!(thumbnail_count(&ThumbnailRequest { max_thumbnails: 0, width_hint: 0, ..request(0) }), 1);
        assert_eq!(thumbnail_count(&ThumbnailRequest { max_thumbnails: 1, width_hint: 120, ..request(0) }), 3);
    }

    #[test]
    fn test_sample_times_are_evenly_spaced() {
        assert_eq!(sample_times(2.0, 4), vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_scale_preserves_aspect() {
        let frame = RgbImage::new(160, 90);
        let scaled = scale_to_height(&frame, 45);
        assert_eq!(scaled.dimensions(), (80, 45));
    }

    #[test]
    fn test_generate_from_pattern() {
        let source = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(2.0, 24.0)), None);
        let set = generate_thumbnails(&source, &request(0), &CancelToken::new()).unwrap().unwrap();
        assert_eq!(set.len(), 12);
        assert_eq!(set.duration, 2.0);
        assert_eq!(set.thumbnails[0].timestamp, 0.0);
        assert!(set.thumbnails.iter().all(|t| t.image.height() == 50));
    }

    #[test]
    fn test_partial_failures_are_skipped() {
        let decoder = TestPatternDecoder::new(2.0, 24.0).fail_frames_from(1.0);
        let source = ClipSource::from_decoder(Box::new(decoder), None);
        let set = generate_thumbnails(&source, &request(0), &CancelToken::new()).unwrap().unwrap();
        assert_eq!(set.len(), 6);
        assert!(set.timestamps().iter().all(|t| *t < 1.0));
    }

    #[test]
    fn test_all_failures_fail_the_job() {
        let decoder = TestPatternDecoder::new(2.0, 24.0).fail_frames_after(0);
        let source = ClipSource::from_decoder(Box::new(decoder), None);
        let result = generate_thumbnails(&source, &request(0), &CancelToken::new()).unwrap();
        assert!(matches!(result, Err(GenerationFailure::Decode(_))));
    }

    #[test]
    fn test_zero_duration_fails() {
        let source = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(0.0, 24.0)), None);
        let result = generate_thumbnails(&source, &request(0), &CancelToken::new()).unwrap();
        assert_eq!(result, Err(GenerationFailure::NonPositiveDuration));
    }

    #[test]
    fn test_cancelled_job_emits_nothing() {
        let source = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(2.0, 24.0)), None);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(generate_thumbnails(&source, &request(0), &cancel).is_none());
    }
}
