//! Double-buffered presentation to a directly driven display
//!
//! The display layer is organized into:
//! - `buffers`: two-slot arena with an explicit role per scanout buffer
//! - `pipeline`: the vsync-gated swap protocol over any [`ScanoutDevice`]
//! - `kms`: Linux DRM/KMS implementation of [`ScanoutDevice`]

mod buffers;
mod kms;
mod pipeline;

pub use kms::{KmsDevice, probe_outputs};
pub use pipeline::{FrameOutcome, PresentationPipeline};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tiny_skia::Pixmap;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Failed to open display device {path}: {source}")]
    NoDevice {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No connected display output")]
    NoConnectedOutput,
    #[error("Connected output offers no usable mode")]
    NoValidMode,
    #[error("No CRTC can drive the connected output")]
    NoCrtc,
    #[error("Failed to allocate scanout buffer: {0}")]
    Allocation(String),
    #[error("Display I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Page flip rejected: {0}")]
    FlipRejected(String),
    #[error("Waiting for page flip failed: {0}")]
    WaitFailed(String),
    #[error("Presentation pipeline is shut down")]
    Closed,
    #[error("Scanout buffer {slot} is {role:?}, cannot {action}")]
    BufferState {
        slot: usize,
        role: buffers::BufferRole,
        action: &'static str,
    },
}

/// Resolution and timing of the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh: u32,
    pub preferred: bool,
}

impl DisplayMode {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Index of the mode flagged preferred, else the one with the largest area
pub fn select_mode(modes: &[DisplayMode]) -> Option<usize> {
    modes.iter().position(|m| m.preferred).or_else(|| {
        modes
            .iter()
            .enumerate()
            .filter(|(_, m)| m.area() > 0)
            .max_by_key(|(_, m)| m.area())
            .map(|(i, _)| i)
    })
}

/// Hardware side of the presentation pipeline.
///
/// Slots are indices into a fixed pair of scanout buffers. The pipeline is
/// responsible for never writing a slot that is on screen or queued.
pub trait ScanoutDevice {
    fn mode(&self) -> DisplayMode;

    /// Copy a rendered frame into a slot's buffer
    fn write_frame(&mut self, slot: usize, frame: &Pixmap) -> Result<(), DisplayError>;

    /// Program the output to scan out `slot` immediately
    fn modeset(&mut self, slot: usize) -> Result<(), DisplayError>;

    /// Ask for `slot` to be shown at the next vertical blank
    fn schedule_flip(&mut self, slot: usize, tag: u64) -> Result<(), DisplayError>;

    /// Wait up to `timeout` for a flip completion; returns its tag
    fn wait_flip(&mut self, timeout: Duration) -> Result<Option<u64>, DisplayError>;

    /// Restore the previous output state and free the buffers
    fn release(&mut self) -> Result<(), DisplayError>;
}

/// Copy premultiplied RGBA rows into an XRGB8888 (little-endian BGRX) buffer
pub fn copy_to_xrgb8888(frame: &Pixmap, dst: &mut [u8], pitch: usize) {
    let width = frame.width() as usize;
    let row_bytes = width * 4;
    let src = frame.data();

    for (y, src_row) in src.chunks_exact(row_bytes).enumerate() {
        let start = y * pitch;
        let Some(dst_row) = dst.get_mut(start..start + row_bytes) else {
            break;
        };
        for (s, d) in src_row.chunks_exact(4).zip(dst_row.chunks_exact_mut(4)) {
            d[0] = s[2];
            d[1] = s[1];
            d[2] = s[0];
            d[3] = 0xFF;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u32, height: u32, preferred: bool) -> DisplayMode {
        DisplayMode {
            width,
            height,
            refresh: 60,
            preferred,
        }
    }

    #[test]
    fn test_select_preferred_mode() {
        let modes = [mode(1920, 1080, false), mode(1280, 720, true), mode(3840, 2160, false)];
        assert_eq!(select_mode(&modes), Some(1));
    }

    #[test]
    fn test_select_largest_without_preferred() {
        let modes = [mode(1280, 720, false), mode(1920, 1200, false), mode(1920, 1080, false)];
        assert_eq!(select_mode(&modes), Some(1));
    }

    #[test]
    fn test_select_none_from_empty() {
        assert_eq!(select_mode(&[]), None);
        assert_eq!(select_mode(&[mode(0, 0, false)]), None);
    }

    #[test]
    fn test_copy_swaps_red_and_blue_and_honors_pitch() {
        let mut frame = Pixmap::new(2, 2).unwrap();
        frame.fill(tiny_skia::Color::from_rgba8(10, 20, 30, 255));

        let pitch = 12;
        let mut dst = vec![0u8; pitch * 2];
        copy_to_xrgb8888(&frame, &mut dst, pitch);

        assert_eq!(&dst[0..4], &[30, 20, 10, 0xFF]);
        assert_eq!(&dst[4..8], &[30, 20, 10, 0xFF]);
        // Row padding untouched
        assert_eq!(&dst[8..12], &[0, 0, 0, 0]);
        assert_eq!(&dst[12..16], &[30, 20, 10, 0xFF]);
    }
}
