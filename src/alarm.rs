//! Alarm severity shared between the render loop and the alarm thread
//!
//! The render loop publishes one [`AlarmStatus`] per frame; the alarm thread
//! reads it before every trigger decision. Both go through the same lock and
//! neither holds it across a blocking call.

mod throttle;

pub use throttle::{AlarmIntervals, AlarmPlayer, SystemClock, run_throttle};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Prioritized alarm level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Overlay color for the advisory label (cyan, yellow, red)
    pub fn color(&self) -> [u8; 3] {
        match self {
            Severity::None => [200, 200, 200],
            Severity::Info => [0, 255, 255],
            Severity::Warning => [255, 255, 0],
            Severity::Critical => [255, 0, 0],
        }
    }
}

/// Everything the overlay and the alarm thread need from one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmStatus {
    pub severity: Severity,
    /// Display rate, already clamped
    pub rate: u32,
    pub label: Option<&'static str>,
}

/// Injected handle to the current alarm status
#[derive(Debug, Clone, Default)]
pub struct AlarmState {
    inner: Arc<Mutex<AlarmStatus>>,
}

impl AlarmState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace severity, rate and label in one critical section
    pub fn publish(&self, status: AlarmStatus) {
        let previous = self.swap(status);
        if previous.severity != status.severity {
            log::info!(
                "Alarm severity {} -> {} ({})",
                previous.severity.as_str(),
                status.severity.as_str(),
                status.label.unwrap_or("-")
            );
        }
    }

    fn swap(&self, status: AlarmStatus) -> AlarmStatus {
        let mut current = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, status)
    }

    pub fn current(&self) -> AlarmStatus {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn severity(&self) -> Severity {
        self.current().severity
    }
}
