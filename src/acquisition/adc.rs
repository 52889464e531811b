//! PCF8591 8-bit ADC on a Linux i2c-dev bus

use super::{AcquisitionError, SampleSource};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const MAX_CHANNEL: u8 = 3;
const MAX_ADDRESS: u16 = 0x7F;

// I2C_SLAVE from <linux/i2c-dev.h>
nix::ioctl_write_int_bad!(i2c_set_slave, 0x0703);

/// Clamp an analog input selector to the four PCF8591 inputs
pub fn clamp_channel(channel: u8) -> u8 {
    if channel > MAX_CHANNEL {
        log::warn!("ADC channel {} out of range, using {}", channel, MAX_CHANNEL);
        MAX_CHANNEL
    } else {
        channel
    }
}

/// Clamp a bus address to the 7-bit range
pub fn clamp_address(address: u16) -> u16 {
    if address > MAX_ADDRESS {
        log::warn!("I2C address 0x{:X} out of range, using 0x{:X}", address, MAX_ADDRESS);
        MAX_ADDRESS
    } else {
        address
    }
}

/// Analog-output-enable, auto-increment and channel bits
pub fn control_byte(channel: u8, auto_increment: bool) -> u8 {
    0x40 | ((auto_increment as u8) << 2) | (channel & 0b11)
}

/// Raw conversion byte to a sample in [0, 1]
pub fn byte_to_sample(value: u8) -> f32 {
    value as f32 / 255.0
}

pub struct Pcf8591 {
    bus: File,
    bus_path: PathBuf,
    address: u16,
    channel: u8,
}

impl Pcf8591 {
    pub fn open(
        bus_path: &Path,
        address: u16,
        channel: u8,
        auto_increment: bool,
    ) -> Result<Self, AcquisitionError> {
        let address = clamp_address(address);
        let channel = clamp_channel(channel);

        let mut bus = OpenOptions::new()
            .read(true)
            .write(true)
            .open(bus_path)
            .map_err(|source| AcquisitionError::Open {
                path: bus_path.to_path_buf(),
                source,
            })?;

        // SAFETY: the fd is owned by `bus` and stays open for the call.
        unsafe { i2c_set_slave(bus.as_raw_fd(), address as nix::libc::c_int) }?;

        bus.write_all(&[control_byte(channel, auto_increment)])?;

        Ok(Self {
            bus,
            bus_path: bus_path.to_path_buf(),
            address,
            channel,
        })
    }
}

impl SampleSource for Pcf8591 {
    fn read(&mut self) -> Result<Option<f32>, AcquisitionError> {
        let mut byte = [0u8; 1];
        self.bus.read_exact(&mut byte)?;
        Ok(Some(byte_to_sample(byte[0])))
    }

    fn describe(&self) -> String {
        format!(
            "PCF8591 at 0x{:02X} channel {} on {}",
            self.address,
            self.channel,
            self.bus_path.display()
        )
    }
}
