use super::{AcquisitionError, SampleSource};
use std::time::Instant;

/// ECG-like test waveform: narrow QRS-shaped pulses over a slow baseline.
///
/// `sin^50` peaks at both extremes of the sine, so the angular frequency is
/// half what the beat rate alone would suggest.
#[derive(Debug, Clone)]
pub struct SyntheticEcg {
    bpm: f32,
    gain: f32,
    start: Instant,
}

impl SyntheticEcg {
    pub fn new(bpm: f32, gain: f32) -> Self {
        Self {
            bpm,
            gain,
            start: Instant::now(),
        }
    }

    /// Waveform value `t` seconds after the start
    pub fn sample_at(&self, t: f32) -> f32 {
        let x = t * std::f32::consts::PI * self.bpm / 60.0;
        let spike = |phase: f32| (x + phase).sin().powi(50);

        self.gain
            * (2.0 * spike(0.0) + 0.3 * (x - 1.0).sin() + 0.2 * spike(1.0)
                - 0.5 * spike(-0.2)
                - 0.2 * spike(0.4))
    }
}

impl SampleSource for SyntheticEcg {
    fn read(&mut self) -> Result<Option<f32>, AcquisitionError> {
        Ok(Some(self.sample_at(self.start.elapsed().as_secs_f32())))
    }

    fn describe(&self) -> String {
        format!("synthetic ECG at {} bpm", self.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BeatDetector, RateEngine, ThresholdPolicy};

    #[test]
    fn test_waveform_is_periodic_in_beats() {
        let ecg = SyntheticEcg::new(60.0, 0.45);
        // At 60 bpm the baseline term repeats every second beat
        for t in [0.1_f32, 0.37, 0.8] {
            let a = ecg.sample_at(t);
            let b = ecg.sample_at(t + 2.0);
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_pulse_peak_near_quarter_period() {
        let ecg = SyntheticEcg::new(60.0, 0.45);
        // sin(pi * t) peaks at t = 0.5
        assert!(ecg.sample_at(0.5) > 0.8);
        assert!(ecg.sample_at(0.25).abs() < 0.3);
    }

    #[test]
    fn test_detected_rate_matches_configured_bpm() {
        const N: usize = 1024;
        const WINDOW_MS: f32 = 15000.0;
        let ecg = SyntheticEcg::new(72.0, 0.45);
        let dt = WINDOW_MS / 1000.0 / N as f32;
        let samples: Vec<f32> = (0..N).map(|i| ecg.sample_at(i as f32 * dt)).collect();

        let peaks = BeatDetector::new(0.5, ThresholdPolicy::PeakFraction, WINDOW_MS).detect(&samples);
        let assessment = RateEngine::new(WINDOW_MS).assess(&peaks, 0.999, true);

        assert!(peaks.len() >= 4, "only {} peaks", peaks.len());
        assert!((assessment.rate - 72.0).abs() < 8.0, "rate {}", assessment.rate);
    }
}
