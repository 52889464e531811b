//! QRS energy filter and adaptive-threshold peak finder

use serde::{Deserialize, Serialize};

/// Physiological refractory period between two accepted beats
pub const REFRACTORY_MS: f32 = 200.0;

/// How the detection floor adapts to the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdPolicy {
    /// `max(threshold, 0.75 * max(energy))`
    #[default]
    PeakFraction,
    /// Drop every energy value above the threshold, then take
    /// `0.75 * max(remaining)`. Keeps one outlier spike from raising the floor
    /// above every ordinary beat.
    OutlierRejecting,
}

impl ThresholdPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdPolicy::PeakFraction => "peak-fraction",
            ThresholdPolicy::OutlierRejecting => "outlier-rejecting",
        }
    }

    /// Compute the detection floor for `energy` given the configured threshold
    pub fn floor(&self, energy: &[f32], threshold: f32) -> f32 {
        match self {
            ThresholdPolicy::PeakFraction => {
                let max = energy.iter().copied().fold(0.0_f32, f32::max);
                threshold.max(max * 0.75)
            }
            ThresholdPolicy::OutlierRejecting => {
                let mut working = energy.to_vec();
                working.sort_by(|a, b| b.total_cmp(a));
                match working.iter().find(|&&value| value <= threshold) {
                    Some(&remaining_max) => remaining_max * 0.75,
                    None => threshold,
                }
            }
        }
    }
}

/// Five-tap derivative, squared, then smoothed with a 1-2-1 moving sum.
///
/// The output has the same length as `samples`; edge entries the taps cannot
/// reach stay at zero.
pub fn energy(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    let mut squared = vec![0.0_f32; n];
    let mut smoothed = vec![0.0_f32; n];
    if n < 5 {
        return smoothed;
    }

    for i in 2..n - 2 {
        let d = -2.0 * samples[i - 2] - samples[i - 1] + samples[i + 1] + 2.0 * samples[i + 2];
        squared[i] = d * d;
    }

    for i in 1..n - 1 {
        smoothed[i] = squared[i - 1] + 2.0 * squared[i] + squared[i + 1];
    }

    smoothed
}

/// Stateless beat detector over one window snapshot
#[derive(Debug, Clone)]
pub struct BeatDetector {
    threshold: f32,
    policy: ThresholdPolicy,
    window_ms: f32,
}

impl BeatDetector {
    pub fn new(threshold: f32, policy: ThresholdPolicy, window_ms: f32) -> Self {
        Self {
            threshold,
            policy,
            window_ms,
        }
    }

    /// Samples skipped after each accepted peak for a window of `len` samples
    pub fn refractory_samples(&self, len: usize) -> usize {
        if self.window_ms <= 0.0 {
            return 1;
        }
        ((len as f32 / self.window_ms) * REFRACTORY_MS) as usize
    }

    /// Find beats in `samples`, returned as window positions in [-1, 1)
    pub fn detect(&self, samples: &[f32]) -> Vec<f32> {
        self.detect_in_energy(&energy(samples))
    }

    /// Peak scan over an already-filtered window
    pub fn detect_in_energy(&self, energy: &[f32]) -> Vec<f32> {
        let n = energy.len();
        let mut peaks = Vec::new();
        if n < 3 {
            return peaks;
        }

        let floor = self.policy.floor(energy, self.threshold);
        let lockout = self.refractory_samples(n).max(1);

        let mut i = 1;
        while i < n - 1 {
            let value = energy[i];
            if value > floor && value > energy[i - 1] && value > energy[i + 1] {
                peaks.push(2.0 * (i as f32 / n as f32) - 1.0);
                i += lockout;
            } else {
                i += 1;
            }
        }

        peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 1024;
    const WINDOW_MS: f32 = 15000.0;

    fn position_to_index(position: f32, len: usize) -> usize {
        let index = ((position + 1.0) / 2.0 * len as f32).round() as usize;
        index.min(len.saturating_sub(1))
    }

    fn impulses(at: &[usize], amplitude: f32) -> Vec<f32> {
        let mut samples = vec![0.0; N];
        for &i in at {
            samples[i] = amplitude;
        }
        samples
    }

    fn detector() -> BeatDetector {
        BeatDetector::new(0.5, ThresholdPolicy::PeakFraction, WINDOW_MS)
    }

    #[test]
    fn test_energy_of_unit_impulse() {
        let mut samples = vec![0.0; 16];
        samples[8] = 1.0;
        let e = energy(&samples);

        // Two symmetric lobes straddling the impulse
        assert_eq!(e[5], 4.0);
        assert_eq!(e[6], 9.0);
        assert_eq!(e[7], 6.0);
        assert_eq!(e[8], 2.0);
        assert_eq!(e[9], 6.0);
        assert_eq!(e[10], 9.0);
        assert_eq!(e[11], 4.0);
        assert_eq!(e[0], 0.0);
        assert_eq!(e[15], 0.0);
    }

    #[test]
    fn test_energy_short_input_is_zero() {
        assert_eq!(energy(&[1.0, 2.0, 3.0]), vec![0.0; 3]);
        assert!(energy(&[]).is_empty());
    }

    #[test]
    fn test_refractory_lockout_for_default_window() {
        // 1024 samples over 15 s, 200 ms lockout
        assert_eq!(detector().refractory_samples(N), 13);
    }

    #[test]
    fn test_separated_impulses_each_detected_once() {
        let at = [100, 260, 420, 580, 740, 900];
        let peaks = detector().detect(&impulses(&at, 1.0));

        assert_eq!(peaks.len(), at.len());
        for (peak, &expected) in peaks.iter().zip(at.iter()) {
            let index = position_to_index(*peak, N);
            // The leading energy lobe sits two samples before the impulse
            assert!(index.abs_diff(expected) <= 2, "peak {} vs {}", index, expected);
        }
    }

    #[test]
    fn test_close_impulses_collapse_to_one_peak() {
        let peaks = detector().detect(&impulses(&[500, 506], 1.0));
        assert_eq!(peaks.len(), 1);
    }

    #[test]
    fn test_flat_signal_has_no_peaks() {
        assert!(detector().detect(&vec![0.3; N]).is_empty());
        assert!(detector().detect(&vec![0.0; N]).is_empty());
    }

    #[test]
    fn test_peak_positions_are_in_window_range() {
        let peaks = detector().detect(&impulses(&[10, 1013], 1.0));
        assert!(!peaks.is_empty());
        assert!(peaks.iter().all(|&p| (-1.0..1.0).contains(&p)));
    }

    #[test]
    fn test_peaks_respect_refractory_distance() {
        let at: Vec<usize> = (20..1000).step_by(9).collect();
        let d = detector();
        let peaks = d.detect(&impulses(&at, 1.0));
        let lockout = d.refractory_samples(N);

        for pair in peaks.windows(2) {
            let a = position_to_index(pair[0], N);
            let b = position_to_index(pair[1], N);
            assert!(b - a >= lockout, "{} and {} too close", a, b);
        }
    }

    #[test]
    fn test_peak_fraction_floor_ignores_small_beats_next_to_spike() {
        let mut samples = impulses(&[100, 300, 500, 700], 1.0);
        samples[900] = 3.0;
        let detector = BeatDetector::new(12.0, ThresholdPolicy::PeakFraction, WINDOW_MS);

        assert_eq!(detector.detect(&samples).len(), 1);
    }

    #[test]
    fn test_outlier_rejecting_floor_keeps_small_beats() {
        let mut samples = impulses(&[100, 300, 500, 700], 1.0);
        samples[900] = 3.0;
        let detector = BeatDetector::new(12.0, ThresholdPolicy::OutlierRejecting, WINDOW_MS);

        assert_eq!(detector.detect(&samples).len(), 5);
    }

    #[test]
    fn test_outlier_rejecting_floor_falls_back_to_threshold() {
        let floor = ThresholdPolicy::OutlierRejecting.floor(&[5.0, 6.0], 1.0);
        assert_eq!(floor, 1.0);
    }

    #[test]
    fn test_policy_names_match_config_values() {
        for policy in [ThresholdPolicy::PeakFraction, ThresholdPolicy::OutlierRejecting] {
            let json = serde_json::to_string(&policy).unwrap();
            assert_eq!(json, format!("\"{}\"", policy.as_str()));
            assert_eq!(serde_json::from_str::<ThresholdPolicy>(&json).unwrap(), policy);
        }
        assert!(serde_json::from_str::<ThresholdPolicy>("\"median\"").is_err());
    }
}
