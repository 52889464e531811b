//! Vsync-gated double buffering over a [`ScanoutDevice`]
//!
//! One flip may be outstanding at a time. A frame is only rendered once the
//! previous flip has been confirmed, so the buffer being drawn into is never
//! the one on screen.

use super::buffers::BufferArena;
use super::{DisplayError, ScanoutDevice};
use std::time::Duration;
use tiny_skia::{Color, Pixmap};

/// Length of a single wait on the device
const WAIT_SLICE: Duration = Duration::from_millis(100);
/// Slices waited per call before giving the frame loop control back
const WAIT_SLICES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    ModeSet,
    Idle,
    SwapPending,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Flip confirmed, roles rotated
    Presented,
    /// Flip request refused; nothing changed on screen
    Dropped,
    /// Flip still outstanding; the next frame resumes the wait
    Pending,
}

pub struct PresentationPipeline<D: ScanoutDevice> {
    device: D,
    arena: BufferArena,
    state: PipelineState,
    frame: Pixmap,
    next_tag: u64,
    pending: Option<u64>,
}

impl<D: ScanoutDevice> PresentationPipeline<D> {
    /// Show a blank first frame with a full modeset
    pub fn open(mut device: D) -> Result<Self, DisplayError> {
        let mode = device.mode();
        let mut frame = Pixmap::new(mode.width, mode.height).ok_or_else(|| {
            DisplayError::Allocation(format!("{}x{} render target", mode.width, mode.height))
        })?;
        frame.fill(Color::BLACK);

        let mut arena = BufferArena::new();
        let slot = 0;
        arena.check_writable(slot)?;
        device.write_frame(slot, &frame)?;
        device.modeset(slot)?;
        arena.show_immediately(slot)?;

        log::info!("Display mode {}x{}@{}Hz", mode.width, mode.height, mode.refresh);

        let mut pipeline = Self {
            device,
            arena,
            state: PipelineState::ModeSet,
            frame,
            next_tag: 1,
            pending: None,
        };
        pipeline.state = PipelineState::Idle;
        Ok(pipeline)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Render one frame with `draw` and flip it onto the screen
    pub fn present<F>(&mut self, draw: F) -> Result<FrameOutcome, DisplayError>
    where
        F: FnOnce(&mut Pixmap),
    {
        match self.state {
            PipelineState::Idle => {}
            PipelineState::SwapPending => {
                if self.await_flip()? != FrameOutcome::Presented {
                    return Ok(FrameOutcome::Pending);
                }
            }
            PipelineState::ModeSet | PipelineState::Shutdown => {
                return Err(DisplayError::Closed);
            }
        }

        let slot = self.arena.back().ok_or(DisplayError::BufferState {
            slot: 0,
            role: self.arena.role(0),
            action: "find a free back buffer",
        })?;
        self.arena.check_writable(slot)?;

        draw(&mut self.frame);
        self.device.write_frame(slot, &self.frame)?;

        let tag = self.next_tag;
        self.next_tag += 1;
        if let Err(e) = self.device.schedule_flip(slot, tag) {
            log::warn!("Dropping frame {}: {}", tag, e);
            return Ok(FrameOutcome::Dropped);
        }

        self.arena.queue(slot)?;
        self.pending = Some(tag);
        self.state = PipelineState::SwapPending;

        self.await_flip()
    }

    /// Blank the screen, then hand the output back
    pub fn shutdown(&mut self) -> Result<(), DisplayError> {
        if self.state == PipelineState::Shutdown {
            return Ok(());
        }

        match self.present(|pixmap| pixmap.fill(Color::BLACK)) {
            Ok(FrameOutcome::Presented) => {}
            Ok(outcome) => log::warn!("Blank frame not confirmed: {:?}", outcome),
            Err(e) => log::warn!("Failed to blank display: {}", e),
        }

        self.state = PipelineState::Shutdown;
        self.device.release()
    }

    fn await_flip(&mut self) -> Result<FrameOutcome, DisplayError> {
        let Some(tag) = self.pending else {
            self.state = PipelineState::Idle;
            return Ok(FrameOutcome::Presented);
        };

        for _ in 0..WAIT_SLICES {
            match self.device.wait_flip(WAIT_SLICE) {
                Ok(Some(done)) if done == tag => {
                    self.arena.complete()?;
                    self.pending = None;
                    self.state = PipelineState::Idle;
                    return Ok(FrameOutcome::Presented);
                }
                Ok(Some(stale)) => log::debug!("Ignoring completion for flip {}", stale),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Flip {} still pending: {}", tag, e);
                    return Ok(FrameOutcome::Pending);
                }
            }
        }

        log::warn!(
            "Flip {} not completed after {:?}",
            tag,
            WAIT_SLICE * WAIT_SLICES
        );
        Ok(FrameOutcome::Pending)
    }
}
