//! Record framing for segment files.
//!
//! Every record is `[header | payload]`; the header is 32 bytes, all fields
//! big-endian:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  Offset  │  Size  │  Field                            │
//! ├───────────────────────────────────────────────────────┤
//! │  0       │  4     │  magic_and_version (0xAAAAAA01)   │
//! │  4       │  4     │  relative_sequence_number         │
//! │  8       │  4     │  byte_position (informational)    │
//! │  12      │  8     │  crc                              │
//! │  20      │  8     │  timestamp (ms since Unix epoch)  │
//! │  28      │  4     │  payload_length_bytes             │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! The CRC is a CRC-32 widened to 64 bits, computed over the big-endian
//! `timestamp`, the big-endian `payload_length_bytes` and the raw payload.
//! `byte_position` records the writer's cumulative offset at append time; it
//! is never verified on read, so files written by other implementations of
//! this format always load.

use bytes::Bytes;
use shale_checksum::crc32_of;

/// Magic word and format version of every record header.
pub(crate) const MAGIC_AND_VERSION: u32 = 0xAAAA_AA01;

/// Serialized header size in bytes.
pub(crate) const RECORD_HEADER_SIZE: u32 = 32;

/// A decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub magic_and_version: u32,
    pub relative_sequence_number: i32,
    pub byte_position: i32,
    pub crc: i64,
    pub timestamp: i64,
    pub payload_length_bytes: i32,
}

impl RecordHeader {
    /// Serializes the header into its 32-byte on-disk form.
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE as usize] {
        let mut buf = [0u8; RECORD_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.magic_and_version.to_be_bytes());
        buf[4..8].copy_from_slice(&self.relative_sequence_number.to_be_bytes());
        buf[8..12].copy_from_slice(&self.byte_position.to_be_bytes());
        buf[12..20].copy_from_slice(&self.crc.to_be_bytes());
        buf[20..28].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[28..32].copy_from_slice(&self.payload_length_bytes.to_be_bytes());
        buf
    }

    /// Deserializes a header from its on-disk form. The caller validates the
    /// magic word.
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            magic_and_version: u32::from_be_bytes(buf[0..4].try_into().expect("4-byte slice")),
            relative_sequence_number: i32::from_be_bytes(
                buf[4..8].try_into().expect("4-byte slice"),
            ),
            byte_position: i32::from_be_bytes(buf[8..12].try_into().expect("4-byte slice")),
            crc: i64::from_be_bytes(buf[12..20].try_into().expect("8-byte slice")),
            timestamp: i64::from_be_bytes(buf[20..28].try_into().expect("8-byte slice")),
            payload_length_bytes: i32::from_be_bytes(
                buf[28..32].try_into().expect("4-byte slice"),
            ),
        }
    }
}

/// CRC over the checksummed fields of a record: big-endian timestamp,
/// big-endian payload length, raw payload. Widened to the header's 64-bit
/// field.
pub(crate) fn record_crc(timestamp: i64, payload_length_bytes: i32, payload: &[u8]) -> i64 {
    i64::from(crc32_of([
        &timestamp.to_be_bytes()[..],
        &payload_length_bytes.to_be_bytes()[..],
        payload,
    ]))
}

/// A record read out of a stream.
#[derive(Debug)]
pub struct OwnedRecord {
    /// Payload bytes.
    pub data: Bytes,
    /// Milliseconds since the Unix epoch, recorded at append.
    pub timestamp: i64,
    /// Absolute sequence number of this record.
    pub sequence_number: u64,
    /// Byte offset of the payload within its segment file. Useful as a
    /// `suggested_start` hint for a follow-up read.
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let header = RecordHeader {
            magic_and_version: MAGIC_AND_VERSION,
            relative_sequence_number: 7,
            byte_position: 96,
            crc: record_crc(1_700_000_000_123, 5, b"hello"),
            timestamp: 1_700_000_000_123,
            payload_length_bytes: 5,
        };
        assert_eq!(RecordHeader::decode(&header.encode()), header);
    }

    #[test]
    fn header_fields_are_big_endian_on_disk() {
        let header = RecordHeader {
            magic_and_version: MAGIC_AND_VERSION,
            relative_sequence_number: 1,
            byte_position: 0,
            crc: 0,
            timestamp: 2,
            payload_length_bytes: 3,
        };
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], &[0xAA, 0xAA, 0xAA, 0x01]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 1]);
        assert_eq!(&bytes[20..28], &[0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(&bytes[28..32], &[0, 0, 0, 3]);
    }

    #[test]
    fn crc_is_a_widened_crc32() {
        let crc = record_crc(0, 0, b"");
        assert!(crc >= 0);
        assert!(crc <= i64::from(u32::MAX));
        assert_ne!(record_crc(1, 5, b"hello"), record_crc(2, 5, b"hello"));
        assert_ne!(record_crc(1, 5, b"hello"), record_crc(1, 5, b"hellp"));
    }
}
