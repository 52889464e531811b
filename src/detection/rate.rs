//! Heart rate and alarm severity from one frame's peaks
//!
//! Peak positions are recorded against the circular window, so the oldest
//! beats can sit to the right of the newest. [`unwrap_peaks`] puts them back
//! into chronological order before any interval is measured.

use crate::alarm::{AlarmStatus, Severity};

/// Fewer unwrapped peaks than this reads as asystole
pub const MIN_PEAKS_FOR_RATE: usize = 4;

/// Largest rate the overlay can show
pub const MAX_DISPLAY_RATE: u32 = 999;

/// Reorder window positions in [-1, 1) into linear time relative to the cursor.
///
/// Peaks after `cursor_fraction` were written before the buffer wrapped, so
/// they are shifted back one window and moved to the front. The result is in
/// window units, strictly increasing when the input is.
pub fn unwrap_peaks(peaks: &[f32], cursor_fraction: f32) -> Vec<f32> {
    let normalized: Vec<f32> = peaks.iter().map(|p| (p + 1.0) / 2.0).collect();
    let split = normalized
        .iter()
        .position(|&p| p > cursor_fraction)
        .unwrap_or(normalized.len());

    let (newest, oldest) = normalized.split_at(split);
    oldest
        .iter()
        .map(|p| p - 1.0)
        .chain(newest.iter().copied())
        .collect()
}

/// Beats per minute from chronologically ordered peaks, or 0 below four peaks
pub fn heart_rate(linear_peaks: &[f32], window_ms: f32) -> f32 {
    if linear_peaks.len() < MIN_PEAKS_FOR_RATE {
        return 0.0;
    }

    let intervals: Vec<f32> = linear_peaks
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) * window_ms)
        .collect();
    let mean_rr = intervals.iter().sum::<f32>() / intervals.len() as f32;

    if mean_rr <= 0.0 {
        return 0.0;
    }
    60_000.0 / mean_rr
}

/// First-match severity table
pub fn classify(rate: f32, connected: bool) -> (Severity, Option<&'static str>) {
    if rate > 150.0 {
        (Severity::Critical, Some("XTREME TACHY"))
    } else if rate > 120.0 {
        (Severity::Warning, Some("TACHY"))
    } else if rate == 0.0 {
        (Severity::Critical, Some("ASYSTOLE"))
    } else if rate < 40.0 {
        (Severity::Critical, Some("XTREME BRADY"))
    } else if rate < 50.0 {
        (Severity::Warning, Some("BRADY"))
    } else if !connected {
        (Severity::Info, Some("LEADS OFF"))
    } else {
        (Severity::None, None)
    }
}

/// Rate as shown on the overlay
pub fn display_rate(rate: f32) -> u32 {
    (rate.max(0.0).round() as u32).min(MAX_DISPLAY_RATE)
}

/// Result of assessing one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub rate: f32,
    pub severity: Severity,
    pub label: Option<&'static str>,
    pub linear_peaks: Vec<f32>,
}

impl Assessment {
    pub fn status(&self) -> AlarmStatus {
        AlarmStatus {
            severity: self.severity,
            rate: display_rate(self.rate),
            label: self.label,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateEngine {
    window_ms: f32,
}

impl RateEngine {
    pub fn new(window_ms: f32) -> Self {
        Self { window_ms }
    }

    pub fn assess(&self, peaks: &[f32], cursor_fraction: f32, connected: bool) -> Assessment {
        let linear_peaks = unwrap_peaks(peaks, cursor_fraction);
        let rate = heart_rate(&linear_peaks, self.window_ms);
        let (severity, label) = classify(rate, connected);

        Assessment {
            rate,
            severity,
            label,
            linear_peaks,
        }
    }
}
