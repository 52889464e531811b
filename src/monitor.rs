//! Monitoring session: startup, worker threads, frame loop and shutdown
//!
//! Three threads run for the life of a session:
//! - `acquisition` samples the source into the [`WaveformStore`]
//! - `alarm` paces audible alarms from the shared [`AlarmState`]
//! - the calling thread detects beats and drives the display once per frame

use crate::acquisition::{open_source, run_acquisition};
use crate::alarm::{AlarmState, SystemClock, run_throttle};
use crate::audio::{AlarmSounds, CpalAlarmPlayer};
use crate::config::Settings;
use crate::detection::{BeatDetector, RateEngine};
use crate::display::{FrameOutcome, KmsDevice, PresentationPipeline};
use crate::render::{FontRenderer, FrameContent, Scene};
use crate::shutdown::{TerminationFlag, install_handlers};
use crate::waveform::WaveformStore;
use anyhow::{Context, Result, anyhow};
use jiff::Zoned;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// Run until a termination signal arrives or a fatal error occurs
pub fn run(settings: &Settings) -> Result<()> {
    settings.validate()?;

    let terminate = TerminationFlag::new();
    install_handlers(&terminate).context("Failed to install signal handlers")?;

    // Fatal preconditions, checked before any thread starts
    let font = FontRenderer::load(settings.display.font.as_deref())?;
    log::info!("Overlay font: {}", font.name());
    let sounds =
        AlarmSounds::load(settings.alarm.sounds.iter()).context("Failed to load alarm sounds")?;
    if sounds.is_empty() {
        log::warn!("No alarm sounds configured, alarms will be silent");
    }
    let source = open_source(&settings.source).context("Failed to open sample source")?;
    let device = KmsDevice::open(&settings.display.card).context("Failed to open display")?;
    let mut pipeline = PresentationPipeline::open(device).context("Failed to set display mode")?;

    let store = Arc::new(WaveformStore::new(settings.window.samples));
    let alarms = AlarmState::new();
    let mut workers: Vec<JoinHandle<u64>> = Vec::new();

    let result = (|| -> Result<u64> {
        workers.push(spawn_acquisition(settings, &store, source, &terminate)?);
        workers.push(spawn_alarm(settings, sounds, &alarms, &terminate)?);
        render_loop(settings, &store, &alarms, &mut pipeline, Scene::new(font), &terminate)
    })();

    // Error exits must still stop the workers
    terminate.request();
    for worker in workers {
        let name = worker.thread().name().unwrap_or("worker").to_string();
        match worker.join() {
            Ok(count) => log::debug!("{} thread finished ({})", name, count),
            Err(_) => log::error!("{} thread panicked", name),
        }
    }

    if let Err(e) = pipeline.shutdown() {
        log::warn!("Display shutdown failed: {}", e);
    }

    let frames = result?;
    log::info!("Monitor stopped after {} frames", frames);
    Ok(())
}

fn spawn_acquisition(
    settings: &Settings,
    store: &Arc<WaveformStore>,
    mut source: Box<dyn crate::acquisition::SampleSource + Send>,
    terminate: &TerminationFlag,
) -> Result<JoinHandle<u64>> {
    let store = store.clone();
    let terminate = terminate.clone();
    let period = settings.window.sample_period()?;

    thread::Builder::new()
        .name("acquisition".to_string())
        .spawn(move || run_acquisition(&store, source.as_mut(), period, &terminate))
        .context("Failed to start acquisition thread")
}

/// Start the alarm thread and wait until its output device is open
fn spawn_alarm(
    settings: &Settings,
    sounds: AlarmSounds,
    alarms: &AlarmState,
    terminate: &TerminationFlag,
) -> Result<JoinHandle<u64>> {
    let alarms = alarms.clone();
    let terminate = terminate.clone();
    let intervals = settings.alarm.interval_ms;
    let device = settings.alarm.device.clone();
    let (ready_tx, ready_rx) = mpsc::channel();

    let handle = thread::Builder::new()
        .name("alarm".to_string())
        .spawn(move || {
            let mut player = match CpalAlarmPlayer::open(device.as_deref(), &sounds) {
                Ok(player) => {
                    let _ = ready_tx.send(Ok(()));
                    player
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return 0;
                }
            };
            run_throttle(&alarms, &intervals, &mut player, &SystemClock::new(), &terminate)
        })
        .context("Failed to start alarm thread")?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => Err(anyhow::Error::new(e).context("Failed to open alarm output")),
        Err(_) => Err(anyhow!("Alarm thread exited during startup")),
    }
}

fn render_loop(
    settings: &Settings,
    store: &WaveformStore,
    alarms: &AlarmState,
    pipeline: &mut PresentationPipeline<KmsDevice>,
    scene: Scene,
    terminate: &TerminationFlag,
) -> Result<u64> {
    let detector = BeatDetector::new(
        settings.detector.threshold,
        settings.detector.policy,
        settings.window.duration_ms,
    );
    let engine = RateEngine::new(settings.window.duration_ms);
    log::info!(
        "Detecting beats over {} samples / {} ms (threshold {}, {})",
        settings.window.samples,
        settings.window.duration_ms,
        settings.detector.threshold,
        settings.detector.policy.as_str()
    );
    let mut frames = 0;

    while !terminate.is_set() {
        let snapshot = store.snapshot();
        let peaks = detector.detect(&snapshot.samples);
        let assessment = engine.assess(&peaks, snapshot.cursor_fraction(), snapshot.connected);
        let status = assessment.status();
        alarms.publish(status);

        let clock = Zoned::now().strftime("%H:%M:%S").to_string();
        let content = FrameContent {
            samples: &snapshot.samples,
            cursor: snapshot.cursor,
            peaks: &peaks,
            status,
            clock: &clock,
        };

        let outcome = pipeline.present(|pixmap| scene.draw(pixmap, &content))?;
        log::trace!(
            "Frame {}: {:?}, {} beats, rate {}",
            frames,
            outcome,
            assessment.linear_peaks.len(),
            status.rate
        );
        if outcome == FrameOutcome::Presented {
            frames += 1;
        }
    }

    Ok(frames)
}
