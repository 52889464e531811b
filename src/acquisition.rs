//! Sample acquisition
//!
//! A [`SampleSource`] yields one scalar per tick; the acquisition thread
//! writes it into the [`WaveformStore`] at the nominal sample period.
//!
//! Sources:
//! - `synthetic`: closed-form ECG-like waveform, no hardware needed
//! - `adc`: PCF8591 8-bit ADC on a Linux i2c-dev bus
//! - `serial`: framed monitor packets over a raw serial line

mod adc;
mod packet;
mod serial;
mod synthetic;

pub use adc::Pcf8591;
pub use serial::SerialSource;
pub use synthetic::SyntheticEcg;

use crate::config::SourceConfig;
use crate::shutdown::TerminationFlag;
use crate::waveform::WaveformStore;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Sensor I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sensor bus error: {0}")]
    Bus(#[from] nix::Error),
}

/// Produces one sample per acquisition tick
pub trait SampleSource {
    /// `Ok(None)` reports the leads as disconnected for this tick
    fn read(&mut self) -> Result<Option<f32>, AcquisitionError>;

    fn describe(&self) -> String;
}

/// Open the source selected in the configuration
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn SampleSource + Send>, AcquisitionError> {
    let source: Box<dyn SampleSource + Send> = match config {
        SourceConfig::Synthetic { bpm, gain } => Box::new(SyntheticEcg::new(*bpm, *gain)),
        SourceConfig::Adc {
            bus,
            address,
            channel,
        } => Box::new(Pcf8591::open(bus, *address, *channel, false)?),
        SourceConfig::Serial { path, scale } => Box::new(SerialSource::open(path, *scale)?),
    };

    log::info!("Acquisition source: {}", source.describe());
    Ok(source)
}

/// Sample `source` every `period` until `terminate` is set.
///
/// Read failures mark the leads disconnected and the loop carries on.
/// Returns the number of samples written.
pub fn run_acquisition(
    store: &WaveformStore,
    source: &mut dyn SampleSource,
    period: Duration,
    terminate: &TerminationFlag,
) -> u64 {
    let mut written = 0;
    let mut failing = false;

    while !terminate.is_set() {
        match source.read() {
            Ok(Some(sample)) => {
                store.write(sample);
                written += 1;
                if failing {
                    log::info!("Acquisition recovered");
                    failing = false;
                }
            }
            Ok(None) => store.mark_disconnected(),
            Err(e) => {
                if !failing {
                    log::warn!("Acquisition read failed: {}", e);
                }
                failing = true;
                store.mark_disconnected();
            }
        }

        std::thread::sleep(period);
    }

    log::debug!("Acquisition stopped after {} samples", written);
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays a script, then requests termination
    struct ScriptedSource {
        script: VecDeque<Result<Option<f32>, AcquisitionError>>,
        terminate: TerminationFlag,
    }

    impl SampleSource for ScriptedSource {
        fn read(&mut self) -> Result<Option<f32>, AcquisitionError> {
            let next = self.script.pop_front().unwrap_or(Ok(Some(0.0)));
            if self.script.is_empty() {
                self.terminate.request();
            }
            next
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn scripted(items: Vec<Result<Option<f32>, AcquisitionError>>, terminate: &TerminationFlag) -> ScriptedSource {
        ScriptedSource {
            script: items.into(),
            terminate: terminate.clone(),
        }
    }

    #[test]
    fn test_samples_are_written_in_order() {
        let terminate = TerminationFlag::new();
        let store = WaveformStore::new(4);
        let mut source = scripted(vec![Ok(Some(0.1)), Ok(Some(0.2)), Ok(Some(0.3))], &terminate);

        let written = run_acquisition(&store, &mut source, Duration::ZERO, &terminate);

        assert_eq!(written, 3);
        let snap = store.snapshot();
        assert_eq!(&snap.samples[..3], &[0.1, 0.2, 0.3]);
        assert!(snap.connected);
    }

    #[test]
    fn test_leads_off_marks_disconnected() {
        let terminate = TerminationFlag::new();
        let store = WaveformStore::new(4);
        let mut source = scripted(vec![Ok(Some(0.5)), Ok(None)], &terminate);

        run_acquisition(&store, &mut source, Duration::ZERO, &terminate);

        let snap = store.snapshot();
        assert!(!snap.connected);
        assert_eq!(snap.samples[0], 0.5);
        assert_eq!(snap.cursor, 1);
    }

    #[test]
    fn test_read_error_is_not_fatal() {
        let terminate = TerminationFlag::new();
        let store = WaveformStore::new(4);
        let failure = AcquisitionError::Io(std::io::Error::other("bus glitch"));
        let mut source = scripted(vec![Err(failure), Ok(Some(0.7))], &terminate);

        let written = run_acquisition(&store, &mut source, Duration::ZERO, &terminate);

        assert_eq!(written, 1);
        assert!(store.snapshot().connected);
    }

    #[test]
    fn test_loop_exits_on_termination() {
        let terminate = TerminationFlag::new();
        let store = Arc::new(WaveformStore::new(16));
        let thread_store = Arc::clone(&store);
        let thread_terminate = terminate.clone();

        let handle = std::thread::spawn(move || {
            let mut source = SyntheticEcg::new(72.0, 0.45);
            run_acquisition(
                &thread_store,
                &mut source,
                Duration::from_millis(1),
                &thread_terminate,
            )
        });

        std::thread::sleep(Duration::from_millis(20));
        terminate.request();
        let written = handle.join().unwrap();
        assert!(written > 0);
        assert!(store.snapshot().connected);
    }
}
