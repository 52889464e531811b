//! Monitor packet framing for the serial link
//!
//! Wire layout (little-endian, packed):
//!
//! | bytes | field |
//! |---|---|
//! | 0..5 | magic `".MON\0"` |
//! | 5..9 | lead I (i32) |
//! | 9..13 | lead II (i32) |
//! | 13..17 | lead III (i32) |
//! | 17..21 | respiration (i32) |
//! | 21 | checksum |
//!
//! The checksum byte makes the wrapping byte sum of the whole packet zero.

use thiserror::Error;

pub const MAGIC: [u8; 5] = *b".MON\0";
pub const PACKET_LEN: usize = 22;

/// Bytes kept while hunting for the magic before old data is dropped
const MAX_BUFFERED: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorPacket {
    pub lead1: i32,
    pub lead2: i32,
    pub lead3: i32,
    pub resp: i32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet checksum mismatch (sum 0x{0:02X})")]
    Checksum(u8),
}

/// True when the wrapping byte sum of `bytes` is zero
pub fn checksum_ok(bytes: &[u8]) -> bool {
    sum(bytes) == 0
}

fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

impl MonitorPacket {
    /// Decode one packet starting at the magic
    pub fn decode(bytes: &[u8; PACKET_LEN]) -> Result<Self, PacketError> {
        if !checksum_ok(bytes) {
            return Err(PacketError::Checksum(sum(bytes)));
        }

        Ok(Self {
            lead1: read_i32(bytes, 5),
            lead2: read_i32(bytes, 9),
            lead3: read_i32(bytes, 13),
            resp: read_i32(bytes, 17),
        })
    }

    #[cfg(test)]
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut bytes = [0u8; PACKET_LEN];
        bytes[..5].copy_from_slice(&MAGIC);
        bytes[5..9].copy_from_slice(&self.lead1.to_le_bytes());
        bytes[9..13].copy_from_slice(&self.lead2.to_le_bytes());
        bytes[13..17].copy_from_slice(&self.lead3.to_le_bytes());
        bytes[17..21].copy_from_slice(&self.resp.to_le_bytes());
        bytes[21] = 0u8.wrapping_sub(sum(&bytes[..21]));
        bytes
    }
}

/// Reassembles packets from an arbitrary chunked byte stream
#[derive(Debug, Default)]
pub struct PacketFramer {
    buffer: Vec<u8>,
}

impl PacketFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            self.buffer.drain(..excess);
        }
    }

    /// Next complete packet, skipping anything before the magic.
    ///
    /// `None` means more bytes are needed.
    pub fn next_packet(&mut self) -> Option<Result<MonitorPacket, PacketError>> {
        let Some(start) = self
            .buffer
            .windows(MAGIC.len())
            .position(|window| window == MAGIC)
        else {
            // Keep a possible partial magic at the tail
            let keep = self.buffer.len().min(MAGIC.len() - 1);
            self.buffer.drain(..self.buffer.len() - keep);
            return None;
        };

        self.buffer.drain(..start);
        if self.buffer.len() < PACKET_LEN {
            return None;
        }

        let mut raw = [0u8; PACKET_LEN];
        raw.copy_from_slice(&self.buffer[..PACKET_LEN]);
        self.buffer.drain(..PACKET_LEN);
        Some(MonitorPacket::decode(&raw))
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> MonitorPacket {
        MonitorPacket {
            lead1: 120,
            lead2: -340,
            lead3: 77_000,
            resp: 5,
        }
    }

    #[test]
    fn test_checksum_definition() {
        let bytes = sample_packet().encode();
        assert!(checksum_ok(&bytes));
        // chk -= b over the whole packet ends at zero
        let chk = bytes.iter().fold(0u8, |chk, &b| chk.wrapping_sub(b));
        assert_eq!(chk, 0);
    }

    #[test]
    fn test_decode_valid_packet() {
        let decoded = MonitorPacket::decode(&sample_packet().encode()).unwrap();
        assert_eq!(decoded, sample_packet());
    }

    #[test]
    fn test_corrupted_packet_fails_checksum() {
        let mut bytes = sample_packet().encode();
        bytes[10] ^= 0x01;
        assert!(matches!(
            MonitorPacket::decode(&bytes),
            Err(PacketError::Checksum(_))
        ));
    }

    #[test]
    fn test_framer_skips_garbage_and_handles_split_chunks() {
        let packet = sample_packet().encode();
        let mut stream = vec![0xAA, 0x00, b'.', b'M'];
        stream.extend_from_slice(&packet);
        stream.extend_from_slice(&packet);

        let mut framer = PacketFramer::new();
        framer.push(&stream[..10]);
        assert!(framer.next_packet().is_none());

        framer.push(&stream[10..]);
        assert_eq!(framer.next_packet(), Some(Ok(sample_packet())));
        assert_eq!(framer.next_packet(), Some(Ok(sample_packet())));
        assert_eq!(framer.next_packet(), None);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_framer_keeps_partial_magic() {
        let packet = sample_packet().encode();
        let mut framer = PacketFramer::new();

        framer.push(&[1, 2, 3, 4, 5, 6]);
        framer.push(&packet[..3]);
        assert!(framer.next_packet().is_none());

        framer.push(&packet[3..]);
        assert_eq!(framer.next_packet(), Some(Ok(sample_packet())));
    }

    #[test]
    fn test_framer_reports_bad_checksum_and_continues() {
        let good = sample_packet().encode();
        let mut bad = good;
        bad[15] = bad[15].wrapping_add(1);

        let mut framer = PacketFramer::new();
        framer.push(&bad);
        framer.push(&good);

        assert!(matches!(framer.next_packet(), Some(Err(PacketError::Checksum(_)))));
        assert_eq!(framer.next_packet(), Some(Ok(sample_packet())));
    }
}
