use crate::alarm::{AlarmIntervals, Severity};
use crate::detection::ThresholdPolicy;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Rolling window geometry
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WindowSettings {
    /// Samples held in the window
    #[serde(default = "default_samples")]
    pub samples: usize,

    /// Real-world span of the window in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: f32,
}

fn default_samples() -> usize {
    1024
}

fn default_duration_ms() -> f32 {
    15000.0
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            samples: default_samples(),
            duration_ms: default_duration_ms(),
        }
    }
}

impl WindowSettings {
    /// Nominal time between two samples
    pub fn sample_period(&self) -> Result<Duration, ConfigError> {
        let seconds = self.duration_ms / 1000.0 / self.samples.max(1) as f32;
        Duration::try_from_secs_f32(seconds).map_err(|_| {
            ConfigError::Invalid(format!(
                "window.duration_ms {} gives no usable sample period",
                self.duration_ms
            ))
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectorSettings {
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default)]
    pub policy: ThresholdPolicy,
}

fn default_threshold() -> f32 {
    0.5
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            policy: ThresholdPolicy::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DisplaySettings {
    /// DRM device node
    #[serde(default = "default_card")]
    pub card: PathBuf,

    /// Font file for the overlay. If None, DejaVu Sans is looked up on the system.
    #[serde(default)]
    pub font: Option<PathBuf>,
}

fn default_card() -> PathBuf {
    PathBuf::from("/dev/dri/card0")
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            card: default_card(),
            font: None,
        }
    }
}

/// WAV file per audible severity; a missing entry keeps that severity silent
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AlarmSoundPaths {
    #[serde(default)]
    pub info: Option<PathBuf>,
    #[serde(default)]
    pub warning: Option<PathBuf>,
    #[serde(default)]
    pub critical: Option<PathBuf>,
}

impl AlarmSoundPaths {
    pub fn iter(&self) -> impl Iterator<Item = (Severity, &Path)> {
        [
            (Severity::Info, self.info.as_deref()),
            (Severity::Warning, self.warning.as_deref()),
            (Severity::Critical, self.critical.as_deref()),
        ]
        .into_iter()
        .filter_map(|(severity, path)| path.map(|p| (severity, p)))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AlarmSettings {
    #[serde(default)]
    pub interval_ms: AlarmIntervals,

    #[serde(default)]
    pub sounds: AlarmSoundPaths,

    /// Preferred audio output device name
    /// If None, uses system default device
    #[serde(default)]
    pub device: Option<String>,
}

/// Where samples come from
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Synthetic {
        #[serde(default = "default_bpm")]
        bpm: f32,
        #[serde(default = "default_gain")]
        gain: f32,
    },
    Adc {
        #[serde(default = "default_i2c_bus")]
        bus: PathBuf,
        #[serde(default = "default_adc_address")]
        address: u16,
        #[serde(default)]
        channel: u8,
    },
    Serial {
        #[serde(default = "default_serial_path")]
        path: PathBuf,
        #[serde(default = "default_serial_scale")]
        scale: f32,
    },
}

fn default_bpm() -> f32 {
    72.0
}

fn default_gain() -> f32 {
    0.45
}

fn default_i2c_bus() -> PathBuf {
    PathBuf::from("/dev/i2c-1")
}

fn default_adc_address() -> u16 {
    0x48
}

fn default_serial_path() -> PathBuf {
    PathBuf::from("/dev/ttyUSB0")
}

fn default_serial_scale() -> f32 {
    0.001
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Synthetic {
            bpm: default_bpm(),
            gain: default_gain(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    Synthetic,
    Adc,
    Serial,
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConfig::Synthetic { .. } => SourceKind::Synthetic,
            SourceConfig::Adc { .. } => SourceKind::Adc,
            SourceConfig::Serial { .. } => SourceKind::Serial,
        }
    }

    /// Default configuration for a source kind
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Synthetic => SourceConfig::default(),
            SourceKind::Adc => SourceConfig::Adc {
                bus: default_i2c_bus(),
                address: default_adc_address(),
                channel: 0,
            },
            SourceKind::Serial => SourceConfig::Serial {
                path: default_serial_path(),
                scale: default_serial_scale(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Settings {
    #[serde(default)]
    pub window: WindowSettings,

    #[serde(default)]
    pub detector: DetectorSettings,

    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default)]
    pub alarm: AlarmSettings,

    #[serde(default)]
    pub source: SourceConfig,
}

impl Settings {
    /// Load config from ~/.config/vitalmon/config.toml
    /// Returns default settings if file doesn't exist or fails to parse
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            log::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from: {}", path.display());
                settings
            }
            Err(ConfigError::Read { .. }) => {
                log::info!("No config file found at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load an explicit config file; errors are returned, not defaulted
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.samples < 8 {
            return Err(ConfigError::Invalid(format!(
                "window.samples must be at least 8, got {}",
                self.window.samples
            )));
        }
        if !(self.window.duration_ms.is_finite() && self.window.duration_ms > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "window.duration_ms must be positive and finite, got {}",
                self.window.duration_ms
            )));
        }
        self.window.sample_period()?;
        if self.detector.threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "detector.threshold must not be negative, got {}",
                self.detector.threshold
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Get the path to the config file: ~/.config/vitalmon/config.toml
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "vitalmon").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.window.samples, 1024);
        assert_eq!(settings.window.duration_ms, 15000.0);
        assert_eq!(settings.detector.threshold, 0.5);
        assert_eq!(settings.detector.policy, ThresholdPolicy::PeakFraction);
        assert_eq!(settings.display.card, PathBuf::from("/dev/dri/card0"));
        assert_eq!(settings.alarm.interval_ms, AlarmIntervals::default());
        assert_eq!(settings.source.kind(), SourceKind::Synthetic);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_sample_period() {
        let period = WindowSettings::default().sample_period().unwrap();
        assert!((period.as_secs_f64() * 1000.0 - 14.648).abs() < 0.01);
    }

    #[test]
    fn test_infinite_window_from_file_is_invalid() {
        let parsed: Settings = toml::from_str("[window]\nduration_ms = inf\n").unwrap();
        assert!(parsed.window.duration_ms.is_infinite());
        assert!(matches!(parsed.validate(), Err(ConfigError::Invalid(_))));
        assert!(parsed.window.sample_period().is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[detector]
policy = "outlier-rejecting"

[alarm.interval_ms]
critical = 500

[alarm.sounds]
critical = "/usr/share/sounds/red.wav"

[source]
kind = "adc"
channel = 2
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.window.samples, 1024);
        assert_eq!(settings.detector.threshold, 0.5);
        assert_eq!(settings.detector.policy, ThresholdPolicy::OutlierRejecting);
        assert_eq!(settings.alarm.interval_ms.critical, 500);
        assert_eq!(settings.alarm.interval_ms.info, 2000);
        assert_eq!(
            settings.source,
            SourceConfig::Adc {
                bus: PathBuf::from("/dev/i2c-1"),
                address: 0x48,
                channel: 2
            }
        );

        let sounds: Vec<_> = settings.alarm.sounds.iter().collect();
        assert_eq!(sounds.len(), 1);
        assert_eq!(sounds[0].0, Severity::Critical);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window\nsamples = ").unwrap();

        assert!(matches!(
            Settings::load_from(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        assert!(matches!(
            Settings::load_from(Path::new("/nonexistent/vitalmon.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_degenerate_window() {
        let mut settings = Settings::default();
        settings.window.samples = 4;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        for duration_ms in [0.0, f32::NAN, f32::INFINITY, 1e30] {
            let mut settings = Settings::default();
            settings.window.duration_ms = duration_ms;
            assert!(
                matches!(settings.validate(), Err(ConfigError::Invalid(_))),
                "{} accepted",
                duration_ms
            );
        }

        let mut settings = Settings::default();
        settings.detector.threshold = -1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let settings = Settings::default();
        let text = settings.to_toml().unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }
}
