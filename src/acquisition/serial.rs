use super::packet::{PacketError, PacketFramer};
use super::{AcquisitionError, SampleSource};
use nix::sys::termios::{self, BaudRate, SetArg, SpecialCharacterIndices};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

const READ_CHUNK: usize = 512;

/// Lead II from monitor packets on a raw 115200-8N1 serial line.
///
/// Reads never block. When no new packet arrived, or the newest one failed
/// its checksum, the previous sample is repeated.
pub struct SerialSource {
    port: File,
    path: PathBuf,
    framer: PacketFramer,
    scale: f32,
    last: f32,
}

impl SerialSource {
    pub fn open(path: &Path, scale: f32) -> Result<Self, AcquisitionError> {
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NOCTTY)
            .open(path)
            .map_err(|source| AcquisitionError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let mut tty = termios::tcgetattr(&port)?;
        termios::cfmakeraw(&mut tty);
        termios::cfsetspeed(&mut tty, BaudRate::B115200)?;
        tty.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tty.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(&port, SetArg::TCSANOW, &tty)?;

        Ok(Self {
            port,
            path: path.to_path_buf(),
            framer: PacketFramer::new(),
            scale,
            last: 0.0,
        })
    }

    /// Feed raw bytes and fold every complete packet into the held sample
    fn ingest(&mut self, bytes: &[u8]) {
        self.framer.push(bytes);
        while let Some(packet) = self.framer.next_packet() {
            match packet {
                Ok(packet) => self.last = packet.lead2 as f32 * self.scale,
                Err(PacketError::Checksum(sum)) => {
                    log::warn!(
                        "Serial packet from {} failed checksum (0x{:02X}), holding last sample",
                        self.path.display(),
                        sum
                    );
                }
            }
        }
    }
}

impl SampleSource for SerialSource {
    fn read(&mut self) -> Result<Option<f32>, AcquisitionError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.ingest(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        log::trace!("{} bytes awaiting a full packet", self.framer.buffered());
        Ok(Some(self.last))
    }

    fn describe(&self) -> String {
        format!("serial monitor packets on {}", self.path.display())
    }
}
