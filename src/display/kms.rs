//! Linux DRM/KMS scanout with dumb buffers and page-flip events

use super::buffers::SLOT_COUNT;
use super::{DisplayError, DisplayMode, ScanoutDevice, copy_to_xrgb8888, select_mode};
use drm::buffer::{Buffer, DrmFourcc};
use drm::control::dumbbuffer::DumbBuffer;
use drm::control::{
    Device as ControlDevice, Event, Mode, ModeTypeFlags, PageFlipFlags, ResourceHandles,
    connector, crtc, framebuffer,
};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use std::time::Duration;
use tiny_skia::Pixmap;

struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

impl Card {
    fn open(path: &Path) -> Result<Self, DisplayError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map(Card)
            .map_err(|source| DisplayError::NoDevice {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// A connector as reported by the card, for listing
#[derive(Debug, Clone)]
pub struct OutputInfo {
    pub name: String,
    pub connected: bool,
    pub modes: Vec<DisplayMode>,
}

/// Enumerate the connectors of `path` without touching the output
pub fn probe_outputs(path: &Path) -> Result<Vec<OutputInfo>, DisplayError> {
    let card = Card::open(path)?;
    let resources = card.resource_handles()?;

    let mut outputs = Vec::new();
    for &handle in resources.connectors() {
        let info = match card.get_connector(handle, true) {
            Ok(info) => info,
            Err(e) => {
                log::warn!("Skipping connector {:?}: {}", handle, e);
                continue;
            }
        };
        outputs.push(OutputInfo {
            name: format!("{:?}-{}", info.interface(), info.interface_id()),
            connected: info.state() == connector::State::Connected,
            modes: info.modes().iter().map(describe_mode).collect(),
        });
    }
    Ok(outputs)
}

fn describe_mode(mode: &Mode) -> DisplayMode {
    let (width, height) = mode.size();
    DisplayMode {
        width: width as u32,
        height: height as u32,
        refresh: mode.vrefresh(),
        preferred: mode.mode_type().contains(ModeTypeFlags::PREFERRED),
    }
}

struct Scanout {
    buffer: Option<DumbBuffer>,
    framebuffer: framebuffer::Handle,
}

/// First connected output of a card, driven through two dumb buffers
pub struct KmsDevice {
    card: Card,
    connector: connector::Handle,
    crtc: crtc::Handle,
    mode: Mode,
    display_mode: DisplayMode,
    saved_crtc: Option<crtc::Info>,
    scanouts: Vec<Scanout>,
    /// Slot and tag of the flip in flight
    pending: Option<(usize, u64)>,
    released: bool,
}

impl KmsDevice {
    pub fn open(path: &Path) -> Result<Self, DisplayError> {
        let card = Card::open(path)?;
        let resources = card.resource_handles()?;

        let connector = resources
            .connectors()
            .iter()
            .filter_map(|&handle| card.get_connector(handle, true).ok())
            .find(|info| info.state() == connector::State::Connected)
            .ok_or(DisplayError::NoConnectedOutput)?;

        let modes: Vec<DisplayMode> = connector.modes().iter().map(describe_mode).collect();
        let index = select_mode(&modes).ok_or(DisplayError::NoValidMode)?;
        let crtc = find_crtc(&card, &resources, &connector).ok_or(DisplayError::NoCrtc)?;
        let saved_crtc = card.get_crtc(crtc).ok();

        log::info!(
            "Using {:?}-{} on {}",
            connector.interface(),
            connector.interface_id(),
            path.display()
        );

        let mut device = Self {
            card,
            connector: connector.handle(),
            crtc,
            mode: connector.modes()[index],
            display_mode: modes[index],
            saved_crtc,
            scanouts: Vec::with_capacity(SLOT_COUNT),
            pending: None,
            released: false,
        };

        for _ in 0..SLOT_COUNT {
            let scanout = device.allocate()?;
            device.scanouts.push(scanout);
        }
        Ok(device)
    }

    fn allocate(&self) -> Result<Scanout, DisplayError> {
        let (width, height) = (self.display_mode.width, self.display_mode.height);
        let buffer = self
            .card
            .create_dumb_buffer((width, height), DrmFourcc::Xrgb8888, 32)
            .map_err(|e| DisplayError::Allocation(format!("{}x{} dumb buffer: {}", width, height, e)))?;

        match self.card.add_framebuffer(&buffer, 24, 32) {
            Ok(framebuffer) => Ok(Scanout {
                buffer: Some(buffer),
                framebuffer,
            }),
            Err(e) => {
                if let Err(destroy) = self.card.destroy_dumb_buffer(buffer) {
                    log::warn!("Failed to free dumb buffer: {}", destroy);
                }
                Err(DisplayError::Allocation(format!("framebuffer: {}", e)))
            }
        }
    }

    fn framebuffer(&self, slot: usize) -> Result<framebuffer::Handle, DisplayError> {
        self.scanouts
            .get(slot)
            .map(|s| s.framebuffer)
            .ok_or_else(|| DisplayError::Allocation(format!("no scanout buffer {}", slot)))
    }
}

fn find_crtc(
    card: &Card,
    resources: &ResourceHandles,
    connector: &connector::Info,
) -> Option<crtc::Handle> {
    let current = connector
        .current_encoder()
        .and_then(|handle| card.get_encoder(handle).ok())
        .and_then(|encoder| encoder.crtc());
    if current.is_some() {
        return current;
    }

    connector
        .encoders()
        .iter()
        .filter_map(|&handle| card.get_encoder(handle).ok())
        .find_map(|encoder| resources.filter_crtcs(encoder.possible_crtcs()).first().copied())
}

impl ScanoutDevice for KmsDevice {
    fn mode(&self) -> DisplayMode {
        self.display_mode
    }

    fn write_frame(&mut self, slot: usize, frame: &Pixmap) -> Result<(), DisplayError> {
        let Some(buffer) = self.scanouts.get_mut(slot).and_then(|s| s.buffer.as_mut()) else {
            return Err(DisplayError::Allocation(format!("no scanout buffer {}", slot)));
        };
        let pitch = buffer.pitch() as usize;
        let mut mapping = self.card.map_dumb_buffer(buffer)?;
        copy_to_xrgb8888(frame, &mut mapping, pitch);
        Ok(())
    }

    fn modeset(&mut self, slot: usize) -> Result<(), DisplayError> {
        let framebuffer = self.framebuffer(slot)?;
        self.card.set_crtc(
            self.crtc,
            Some(framebuffer),
            (0, 0),
            &[self.connector],
            Some(self.mode),
        )?;
        Ok(())
    }

    fn schedule_flip(&mut self, slot: usize, tag: u64) -> Result<(), DisplayError> {
        if let Some((_, pending)) = self.pending {
            return Err(DisplayError::FlipRejected(format!("flip {} still in flight", pending)));
        }

        let framebuffer = self.framebuffer(slot)?;
        self.card
            .page_flip(self.crtc, framebuffer, PageFlipFlags::EVENT, None)
            .map_err(|e| DisplayError::FlipRejected(e.to_string()))?;
        self.pending = Some((slot, tag));
        Ok(())
    }

    fn wait_flip(&mut self, timeout: Duration) -> Result<Option<u64>, DisplayError> {
        let Some((_, tag)) = self.pending else {
            return Ok(None);
        };

        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.card.as_fd(), PollFlags::POLLIN)];
        let ready = poll(&mut fds, PollTimeout::from(millis))
            .map_err(|e| DisplayError::WaitFailed(e.to_string()))?;
        if ready == 0 {
            return Ok(None);
        }

        let events = self
            .card
            .receive_events()
            .map_err(|e| DisplayError::WaitFailed(e.to_string()))?;
        for event in events {
            if let Event::PageFlip(flip) = event
                && flip.crtc == self.crtc
            {
                self.pending = None;
                return Ok(Some(tag));
            }
        }
        Ok(None)
    }

    fn release(&mut self) -> Result<(), DisplayError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if let Some(saved) = &self.saved_crtc {
            let restored = self.card.set_crtc(
                self.crtc,
                saved.framebuffer(),
                saved.position(),
                &[self.connector],
                saved.mode(),
            );
            if let Err(e) = restored {
                log::warn!("Failed to restore previous display state: {}", e);
            }
        }

        for scanout in self.scanouts.drain(..).rev() {
            if let Err(e) = self.card.destroy_framebuffer(scanout.framebuffer) {
                log::warn!("Failed to remove framebuffer: {}", e);
            }
            if let Some(buffer) = scanout.buffer
                && let Err(e) = self.card.destroy_dumb_buffer(buffer)
            {
                log::warn!("Failed to free dumb buffer: {}", e);
            }
        }
        Ok(())
    }
}

impl Drop for KmsDevice {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to release display: {}", e);
        }
    }
}
