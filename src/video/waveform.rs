use crate::core::WaveformConfig;
use crate::video::error::GenerationFailure;
use crate::video::source::ClipSource;
use crate::video::task::CancelToken;

/// Normalized, compressed RMS amplitudes in `0..=1`, evenly spread over the clip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformEnvelope {
    pub amplitudes: Vec<f32>,
    pub duration: f64,
}

impl WaveformEnvelope {
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Amplitude of the bucket covering `time`.
    pub fn amplitude_at(&self, time: f64) -> f32 {
        if self.amplitudes.is_empty() || self.duration <= 0.0 {
            return 0.0;
        }
        let fraction = (time / self.duration).clamp(0.0, 1.0);
        let index = ((fraction * self.amplitudes.len() as f64) as usize).min(self.amplitudes.len() - 1);
        self.amplitudes[index]
    }
}

/// Two pixels per point, bounded, and never more points than samples.
pub fn waveform_point_count(config: &WaveformConfig, width_hint: u32, sample_count: usize) -> usize {
    let target = if width_hint > 0 {
        width_hint as usize / 2
    } else {
        config.default_points
    };
    target.clamp(config.min_points, config.max_points).min(sample_count)
}

pub fn rms_envelope(mono: &[f32], points: usize, exponent: f32) -> Vec<f32> {
    let n = mono.len();
    if n == 0 || points == 0 {
        return Vec::new();
    }

    let rms: Vec<f32> = (0..points)
        .map(|i| {
            let start = i * n / points;
            let end = ((i + 1) * n / points).max(start + 1).min(n);
            let bucket = &mono[start..end];
            let mean_square = bucket.iter().map(|s| s * s).sum::<f32>() / bucket.len() as f32;
            mean_square.sqrt()
        })
        .collect();

    let peak = rms.iter().copied().fold(0.0f32, f32::max);
    let peak = if peak > 0.0 { peak } else { 1.0 };

    rms.into_iter()
        .map(|value| (value / peak).clamp(0.0, 1.0).powf(exponent))
        .collect()
}

/// Extracts low-rate audio and reduces it to an envelope. Returns `None` when
/// cancelled.
pub fn generate_waveform(
    source: &ClipSource,
    config: &WaveformConfig,
    width_hint: u32,
    cancel: &CancelToken,
) -> Option<Result<WaveformEnvelope, GenerationFailure>> {
    if !source.has_audio() {
        return Some(Err(GenerationFailure::NoAudio));
    }
    let duration = source.duration();
    if !(duration > 0.0) {
        return Some(Err(GenerationFailure::NonPositiveDuration));
    }
    if cancel.is_cancelled() {
        return None;
    }

    let audio = match source.get_audio_samples(config.sample_rate) {
        Ok(Some(audio)) => audio,
        Ok(None) => return Some(Err(GenerationFailure::NoAudio)),
        Err(e) => return Some(Err(e.into())),
    };
    if cancel.is_cancelled() {
        return None;
    }

    let mono = audio.to_mono();
    if mono.is_empty() {
        return Some(Err(GenerationFailure::EmptyAudio));
    }

    let points = waveform_point_count(config, width_hint, mono.len());
    let amplitudes = rms_envelope(&mono, points, config.exponent);
    log::debug!("Waveform envelope: {} points from {} samples", amplitudes.len(), mono.len());

    Some(Ok(WaveformEnvelope { amplitudes, duration }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::pattern::TestPatternDecoder;

    #[test]
    fn test_point_count() {
        let config = WaveformConfig::default();
        assert_eq!(waveform_point_count(&config, 0, 10_000), 400);
        assert_eq!(waveform_point_count(&config, 100, 10_000), 80);
        assert_eq!(waveform_point_count(&config, 1000, 10_000), 500);
        assert_eq!(waveform_point_count(&config, 10_000, 10_000), 1600);
        assert_eq!(waveform_point_count(&config, 1000, 50), 50);
    }

    #[test]
    fn test_envelope_normalized_and_compressed() {
        let mono = vec![0.5, -0.5, 0.25, -0.25];
        let envelope = rms_envelope(&mono, 2, 0.85);
        assert_eq!(envelope.len(), 2);
        assert!((envelope[0] - 1.0).abs() < 1e-6);
        assert!((envelope[1] - 0.5f32.powf(0.85)).abs() < 1e-6);
    }

    #[test]
    fn test_silence_stays_zero() {
        let envelope = rms_envelope(&[0.0; 16], 4, 0.85);
        assert_eq!(envelope, vec![0.0; 4]);
    }

    #[test]
    fn test_generate_from_pattern() {
        let source = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(2.0, 24.0).with_audio(30.0)), None);
        let envelope = generate_waveform(&source, &WaveformConfig::default(), 0, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(envelope.len(), 400);
        assert_eq!(envelope.duration, 2.0);
        assert!(envelope.amplitudes.iter().all(|a| (0.0..=1.0).contains(a)));
        // The pattern tone swells in, so the end is louder than the start
        let head: f32 = envelope.amplitudes[..100].iter().sum();
        let tail: f32 = envelope.amplitudes[300..].iter().sum();
        assert!(tail > head);
        assert_eq!(envelope.amplitude_at(2.0), envelope.amplitudes[399]);
    }

    #[test]
    fn test_failures() {
        let config = WaveformConfig::default();
        let cancel = CancelToken::new();

        let silent = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(2.0, 24.0)), None);
        assert_eq!(generate_waveform(&silent, &config, 0, &cancel), Some(Err(GenerationFailure::NoAudio)));

        let empty = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(0.0, 24.0).with_audio(30.0)), None);
        assert_eq!(
            generate_waveform(&empty, &config, 0, &cancel),
            Some(Err(GenerationFailure::NonPositiveDuration))
        );

        let broken = ClipSource::from_decoder(
            Box::new(TestPatternDecoder::new(1.0, 24.0).with_audio(30.0).fail_audio()),
            None,
        );
        assert!(matches!(
            generate_waveform(&broken, &config, 0, &cancel),
            Some(Err(GenerationFailure::Decode(_)))
        ));
    }

    #[test]
    fn test_cancelled_job_emits_nothing() {
        let source = ClipSource::from_decoder(Box::new(TestPatternDecoder::new(1.0, 24.0).with_audio(30.0)), None);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(generate_waveform(&source, &WaveformConfig::default(), 0, &cancel).is_none());
    }
}
