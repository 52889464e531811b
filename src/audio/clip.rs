//! WAV alarm clips decoded to interleaved f32

use super::AudioError;
use crate::alarm::Severity;
use hound::{SampleFormat, WavReader};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Decoded PCM for one alarm sound
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmClip {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AlarmClip {
    /// Decode a WAV file; any header or sample error is an asset error
    pub fn load(path: &Path) -> Result<Self, AudioError> {
        let asset_error = |source| AudioError::Asset {
            path: path.to_path_buf(),
            source,
        };

        let reader = WavReader::open(path).map_err(asset_error)?;
        let spec = reader.spec();

        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(AudioError::UnsupportedAsset {
                path: path.to_path_buf(),
                reason: "zero channels or sample rate".to_string(),
            });
        }

        let samples = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(asset_error)?,
            SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(AudioError::UnsupportedAsset {
                        path: path.to_path_buf(),
                        reason: format!("{} bits per sample", spec.bits_per_sample),
                    });
                }
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(asset_error)?
            }
        };

        log::debug!(
            "Loaded alarm sound {} ({} Hz, {} ch, {} frames)",
            path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len() / spec.channels as usize
        );

        Ok(Self {
            samples,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Resample (nearest frame) and remap channels for an output device
    pub fn convert(&self, channels: u16, sample_rate: u32) -> AlarmClip {
        if channels == self.channels && sample_rate == self.sample_rate {
            return self.clone();
        }

        let in_channels = self.channels.max(1) as usize;
        let out_channels = channels.max(1) as usize;
        let ratio = self.sample_rate as f64 / sample_rate.max(1) as f64;
        let out_frames = (self.frames() as f64 / ratio).floor() as usize;

        let mut samples = Vec::with_capacity(out_frames * out_channels);
        for frame in 0..out_frames {
            let src = ((frame as f64 * ratio) as usize).min(self.frames().saturating_sub(1));
            let src_frame = &self.samples[src * in_channels..(src + 1) * in_channels];
            for ch in 0..out_channels {
                let value = if in_channels == 1 {
                    src_frame[0]
                } else {
                    src_frame[ch.min(in_channels - 1)]
                };
                samples.push(value);
            }
        }

        AlarmClip {
            samples,
            channels,
            sample_rate,
        }
    }
}

/// Alarm clips keyed by severity; a severity without a clip is silent
#[derive(Debug, Clone, Default)]
pub struct AlarmSounds {
    clips: HashMap<Severity, Arc<AlarmClip>>,
}

impl AlarmSounds {
    /// Decode every configured sound. Fails on the first malformed asset.
    pub fn load<'a, I>(paths: I) -> Result<Self, AudioError>
    where
        I: IntoIterator<Item = (Severity, &'a Path)>,
    {
        let mut clips = HashMap::new();
        for (severity, path) in paths {
            let clip = AlarmClip::load(path)?;
            log::info!(
                "Alarm sound for {}: {} ({:.2}s)",
                severity.as_str(),
                path.display(),
                clip.duration().as_secs_f32()
            );
            clips.insert(severity, Arc::new(clip));
        }
        Ok(Self { clips })
    }

    pub fn get(&self, severity: Severity) -> Option<&Arc<AlarmClip>> {
        self.clips.get(&severity)
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Convert every clip to the device format once, up front
    pub fn converted(&self, channels: u16, sample_rate: u32) -> Self {
        let clips = self
            .clips
            .iter()
            .map(|(&severity, clip)| (severity, Arc::new(clip.convert(channels, sample_rate))))
            .collect();
        Self { clips }
    }
}
