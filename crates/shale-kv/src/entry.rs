//! On-disk entry header for the KV log.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  Offset  │  Size  │  Field                       │
//! ├──────────────────────────────────────────────────┤
//! │  0       │  1     │  magic_and_version (0xB1)    │
//! │  1       │  1     │  flags (bit 0 = tombstone)   │
//! │  2       │  2     │  key_length                  │
//! │  4       │  4     │  crc32                       │
//! │  8       │  4     │  value_length                │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Integers are host-endian. The CRC covers `[flags, key_length,
//! value_length, value bytes]` in that order; keys are not checksummed.

use shale_checksum::crc32_of;

/// Magic-and-version byte of every entry. This exact value is load-bearing:
/// files written by earlier releases carry it, so it must never be
/// "rederived".
pub(crate) const MAGIC_AND_VERSION: u8 = 0xB1;

/// Flag bit marking an entry as a tombstone. Remaining bits are reserved and
/// must be zero.
pub(crate) const TOMBSTONE_FLAG: u8 = 0x01;

/// Serialized header size in bytes.
pub(crate) const ENTRY_HEADER_SIZE: u32 = 12;

/// Exclusive upper bound on key length.
pub(crate) const KEY_LENGTH_MAX: u16 = 0xFFFF;

/// Exclusive upper bound on value length (2^31).
pub(crate) const VALUE_LENGTH_MAX: u32 = u32::MAX / 2;

/// A decoded entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryHeader {
    pub magic_and_version: u8,
    pub flags: u8,
    pub key_length: u16,
    pub crc32: u32,
    pub value_length: u32,
}

impl EntryHeader {
    /// Builds the header for an entry, computing the CRC over the flags, the
    /// two length fields and the value bytes.
    pub fn for_entry(flags: u8, key: &str, value: &[u8]) -> Self {
        let key_length = key.len() as u16;
        let value_length = value.len() as u32;
        Self {
            magic_and_version: MAGIC_AND_VERSION,
            flags,
            key_length,
            crc32: entry_crc(flags, key_length, value_length, value),
            value_length,
        }
    }

    /// Serializes the header into its 12-byte on-disk form.
    pub fn encode(&self) -> [u8; ENTRY_HEADER_SIZE as usize] {
        let mut buf = [0u8; ENTRY_HEADER_SIZE as usize];
        buf[0] = self.magic_and_version;
        buf[1] = self.flags;
        buf[2..4].copy_from_slice(&self.key_length.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.crc32.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.value_length.to_ne_bytes());
        buf
    }

    /// Deserializes a header from its on-disk form. The caller validates the
    /// magic byte; lengths are validated implicitly by the reads they bound.
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            magic_and_version: buf[0],
            flags: buf[1],
            key_length: u16::from_ne_bytes(buf[2..4].try_into().expect("2-byte slice")),
            crc32: u32::from_ne_bytes(buf[4..8].try_into().expect("4-byte slice")),
            value_length: u32::from_ne_bytes(buf[8..12].try_into().expect("4-byte slice")),
        }
    }

    /// Total on-disk size of the entry this header describes.
    pub fn entry_size(&self) -> u32 {
        ENTRY_HEADER_SIZE + u32::from(self.key_length) + self.value_length
    }
}

/// CRC over `[flags, key_length, value_length, value]`, the discontiguous
/// checksummed fields of an entry.
pub(crate) fn entry_crc(flags: u8, key_length: u16, value_length: u32, value: &[u8]) -> u32 {
    crc32_of([
        &[flags][..],
        &key_length.to_ne_bytes()[..],
        &value_length.to_ne_bytes()[..],
        value,
    ])
}
