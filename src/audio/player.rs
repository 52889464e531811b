//! Blocking alarm playback through cpal

use super::{AlarmClip, AlarmSounds, AudioError};
use crate::alarm::{AlarmPlayer, Severity};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

/// Grace period on top of the clip length before playback is abandoned
const PLAYBACK_SLACK: Duration = Duration::from_millis(500);

/// Output device with the alarm clips pre-converted to its format.
///
/// cpal streams are not `Send`, so the player is opened on the thread that
/// plays through it.
pub struct CpalAlarmPlayer {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    sounds: AlarmSounds,
}

/// Information about an available audio output device
#[derive(Debug)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub supported_sample_rates: Vec<u32>,
    pub supported_formats: Vec<SampleFormat>,
}

impl CpalAlarmPlayer {
    /// Open `device_name`, or the default output device when `None`
    pub fn open(device_name: Option<&str>, sounds: &AlarmSounds) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::NoOutputDevice(name.to_string()))?,
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::NoOutputDevice("no default device".to_string()))?,
        };

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();

        log::info!(
            "Alarm output: {} ({} Hz, {} ch, {:?})",
            device.name().unwrap_or_else(|_| "Unknown Device".to_string()),
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            sounds: sounds.converted(config.channels, config.sample_rate.0),
            device,
            config,
            sample_format,
        })
    }

    fn build_stream<T>(
        &self,
        clip: Arc<AlarmClip>,
        done: mpsc::Sender<()>,
    ) -> Result<cpal::Stream, AudioError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
    {
        let mut position = 0usize;
        let mut signalled = false;

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    let value = clip.samples.get(position).copied().unwrap_or(0.0);
                    *out = <T as cpal::Sample>::from_sample(value);
                    position += 1;
                }

                // One whole buffer of silence past the end means the tail has
                // been queued on the device
                if !signalled && position >= clip.samples.len() + data.len() {
                    signalled = true;
                    let _ = done.send(());
                }
            },
            |err| {
                // Underruns land here; the backend re-prepares and keeps going
                log::warn!("Alarm output stream error: {}", err);
            },
            None,
        )?;

        Ok(stream)
    }
}

impl AlarmPlayer for CpalAlarmPlayer {
    fn play(&mut self, severity: Severity) -> Result<(), AudioError> {
        let Some(clip) = self.sounds.get(severity).cloned() else {
            return Ok(());
        };
        let timeout = clip.duration() + PLAYBACK_SLACK;

        let (done_tx, done_rx) = mpsc::channel();
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(clip, done_tx)?,
            SampleFormat::I16 => self.build_stream::<i16>(clip, done_tx)?,
            SampleFormat::U16 => self.build_stream::<u16>(clip, done_tx)?,
            SampleFormat::I32 => self.build_stream::<i32>(clip, done_tx)?,
            other => {
                return Err(AudioError::Stream(format!(
                    "Unsupported output sample format {:?}",
                    other
                )));
            }
        };

        stream.play()?;
        log::trace!("Playing {} alarm", severity.as_str());

        let result = done_rx
            .recv_timeout(timeout)
            .map_err(|_| AudioError::PlaybackTimeout(timeout));
        drop(stream);
        result
    }
}

/// List all available audio output devices
pub fn list_output_devices() -> Result<Vec<OutputDeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let devices = host.output_devices()?;
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());

    let mut device_infos = Vec::new();

    for device in devices {
        let name = device.name().unwrap_or("Unknown Device".to_string());
        let is_default = default_name.as_deref() == Some(name.as_str());

        let configs: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| AudioError::Stream(e.to_string()))?
            .collect();

        device_infos.push(OutputDeviceInfo {
            name,
            is_default,
            supported_sample_rates: configs.iter().map(|c| c.max_sample_rate().0).collect(),
            supported_formats: configs.iter().map(|c| c.sample_format()).collect(),
        });
    }

    Ok(device_infos)
}
