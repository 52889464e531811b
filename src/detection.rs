//! Beat detection and rate/severity derivation
//!
//! Everything here runs once per render frame over a fresh snapshot:
//! - `beat`: energy filter and adaptive-threshold peak finder
//! - `rate`: wrap-aware peak ordering, heart rate, severity table
//!
//! No state survives between frames.

mod beat;
mod rate;

pub use beat::{BeatDetector, ThresholdPolicy};
pub use rate::RateEngine;

#[cfg(test)]
mod tests {
    use super::*;
    use super::rate::Assessment;
    use crate::alarm::Severity;
    use crate::waveform::WaveformStore;

    const N: usize = 1024;
    const WINDOW_MS: f32 = 15000.0;

    /// Fill a store with evenly spaced unit beats, `spacing_ms` apart
    fn store_with_beats(spacing_ms: f32, count: usize, first_at: usize) -> WaveformStore {
        let store = WaveformStore::new(N);
        let spacing = spacing_ms / WINDOW_MS * N as f32;
        let beats: Vec<usize> = (0..count)
            .map(|k| first_at + (k as f32 * spacing).round() as usize)
            .collect();

        for i in 0..N {
            store.write(if beats.contains(&i) { 1.0 } else { 0.0 });
        }
        store
    }

    fn assess(store: &WaveformStore) -> Assessment {
        let snapshot = store.snapshot();
        let peaks = BeatDetector::new(0.5, ThresholdPolicy::PeakFraction, WINDOW_MS)
            .detect(&snapshot.samples);
        RateEngine::new(WINDOW_MS).assess(&peaks, snapshot.cursor_fraction(), snapshot.connected)
    }

    #[test]
    fn test_twenty_bpm_is_extreme_brady() {
        let assessment = assess(&store_with_beats(3000.0, 5, 50));

        assert_eq!(assessment.linear_peaks.len(), 5);
        assert!((assessment.rate - 20.0).abs() < 0.5, "rate {}", assessment.rate);
        assert_eq!(assessment.severity, Severity::Critical);
        assert_eq!(assessment.label, Some("XTREME BRADY"));
    }

    #[test]
    fn test_one_forty_bpm_is_tachy() {
        let assessment = assess(&store_with_beats(430.0, 33, 20));

        assert!((assessment.rate - 140.0).abs() < 2.0, "rate {}", assessment.rate);
        assert_eq!(assessment.severity, Severity::Warning);
        assert_eq!(assessment.label, Some("TACHY"));
    }

    #[test]
    fn test_rate_survives_wrapped_window() {
        // One and a half windows of an 80 bpm train leaves the cursor mid-window
        let store = WaveformStore::new(N);
        let spacing = 750.0 / WINDOW_MS * N as f32;
        let beats: Vec<usize> = (0..30)
            .map(|k| 30 + (k as f32 * spacing).round() as usize)
            .collect();
        for t in 0..N + N / 2 {
            store.write(if beats.contains(&t) { 1.0 } else { 0.0 });
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.cursor, N / 2);

        let assessment = assess(&store);
        assert_eq!(assessment.linear_peaks.len(), 20);
        assert!(assessment.linear_peaks.windows(2).all(|w| w[1] > w[0]));
        assert!((assessment.rate - 80.0).abs() < 1.0, "rate {}", assessment.rate);
        assert_eq!(assessment.severity, Severity::None);
    }

    #[test]
    fn test_empty_window_is_asystole() {
        let store = WaveformStore::new(N);
        store.write(0.0);
        let assessment = assess(&store);
        assert_eq!(assessment.rate, 0.0);
        assert_eq!(assessment.label, Some("ASYSTOLE"));
    }
}
