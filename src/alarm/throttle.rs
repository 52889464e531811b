//! Paces audible alarms by the current severity

use super::{AlarmState, Severity};
use crate::audio::AudioError;
use crate::shutdown::TerminationFlag;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Sleep between trigger decisions while waiting out an interval
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Minimum re-trigger interval per severity, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmIntervals {
    #[serde(default = "default_none_ms")]
    pub none: u64,
    #[serde(default = "default_info_ms")]
    pub info: u64,
    #[serde(default = "default_warning_ms")]
    pub warning: u64,
    #[serde(default = "default_critical_ms")]
    pub critical: u64,
}

fn default_none_ms() -> u64 {
    25
}

fn default_info_ms() -> u64 {
    2000
}

fn default_warning_ms() -> u64 {
    2000
}

fn default_critical_ms() -> u64 {
    1000
}

impl Default for AlarmIntervals {
    fn default() -> Self {
        Self {
            none: default_none_ms(),
            info: default_info_ms(),
            warning: default_warning_ms(),
            critical: default_critical_ms(),
        }
    }
}

impl AlarmIntervals {
    pub fn interval(&self, severity: Severity) -> Duration {
        let ms = match severity {
            Severity::None => self.none,
            Severity::Info => self.info,
            Severity::Warning => self.warning,
            Severity::Critical => self.critical,
        };
        Duration::from_millis(ms)
    }
}

/// Time source for the throttle loop
pub trait Clock {
    /// Monotonic time since an arbitrary origin
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Plays the sound for a severity, blocking until it has finished
pub trait AlarmPlayer {
    fn play(&mut self, severity: Severity) -> Result<(), AudioError>;
}

/// Run until `terminate` is set, triggering `player` whenever the time since
/// the last trigger exceeds the interval of the current severity.
///
/// The timer restarts before playback, so triggers are spaced by the longer
/// of the interval and the sound. Returns the number of triggers.
pub fn run_throttle<C, P>(
    state: &AlarmState,
    intervals: &AlarmIntervals,
    player: &mut P,
    clock: &C,
    terminate: &TerminationFlag,
) -> u64
where
    C: Clock,
    P: AlarmPlayer,
{
    let mut last_trigger = clock.now();
    let mut triggers = 0;

    while !terminate.is_set() {
        let severity = state.severity();
        let now = clock.now();

        if now.saturating_sub(last_trigger) > intervals.interval(severity) {
            last_trigger = now;
            triggers += 1;
            if let Err(e) = player.play(severity) {
                log::warn!("Alarm playback failed for {}: {}", severity.as_str(), e);
            }
        } else {
            clock.sleep(POLL_INTERVAL);
        }
    }

    log::debug!("Alarm throttle stopped after {} triggers", triggers);
    triggers
}
