/// Keeps audio from falling behind video. Only a lagging audio clock is
/// corrected; audio running ahead is left alone so the listener never hears
/// a backwards jump.
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    threshold_ms: i64,
    corrections: u64,
}

impl DriftCorrector {
    pub fn new(threshold_ms: i64) -> Self {
        Self {
            threshold_ms: threshold_ms.abs(),
            corrections: 0,
        }
    }

    pub fn threshold_ms(&self) -> i64 {
        self.threshold_ms
    }

    /// Number of corrections issued so far
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Returns the position audio should jump to, if any.
    pub fn check(&mut self, audio_ms: i64, video_ms: i64) -> Option<i64> {
        let drift = audio_ms - video_ms;
        if drift < -self.threshold_ms {
            self.corrections += 1;
            log::debug!("Audio behind video by {} ms, resyncing to {} ms", -drift, video_ms);
            Some(video_ms)
        } else {
            None
        }
    }
}
