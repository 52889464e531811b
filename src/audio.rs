//! Alarm sound assets and audio output
//!
//! Sounds are decoded from WAV once at startup so a malformed asset is caught
//! before any thread runs. Playback goes through cpal and blocks until the
//! clip has been handed to the device in full.

mod clip;
mod player;

pub use clip::{AlarmClip, AlarmSounds};
pub use player::{CpalAlarmPlayer, list_output_devices};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output device found: {0}")]
    NoOutputDevice(String),
    #[error("Invalid alarm sound {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("Unsupported alarm sound {path}: {reason}")]
    UnsupportedAsset { path: PathBuf, reason: String },
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("Playback did not complete within {0:?}")]
    PlaybackTimeout(std::time::Duration),
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(e: cpal::BuildStreamError) -> Self {
        AudioError::Stream(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(e: cpal::PlayStreamError) -> Self {
        AudioError::Stream(e.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        AudioError::Stream(e.to_string())
    }
}

impl From<cpal::DevicesError> for AudioError {
    fn from(e: cpal::DevicesError) -> Self {
        AudioError::Stream(e.to_string())
    }
}
