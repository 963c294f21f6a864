//! A single segment file: a contiguous run of framed records sharing a base
//! sequence number.
//!
//! The base is encoded in the filename as a zero-padded 19-digit decimal
//! followed by `.log`, wide enough for any `u64`. The segment recovers
//! itself on open by scanning from offset zero and truncating at the first
//! torn or corrupt record; the stream holding it never sees that damage,
//! only the shortened segment.

use std::sync::Arc;

use shale_io::{FileError, FileLike, FileSystem, LogLevel, Logger};

use crate::StreamError;
use crate::record::{MAGIC_AND_VERSION, OwnedRecord, RECORD_HEADER_SIZE, RecordHeader, record_crc};
use crate::stream::ReadOptions;

/// A segment and its recovered extent. Exclusively owned by its stream.
pub(crate) struct Segment {
    file: Option<Box<dyn FileLike>>,
    filesystem: Arc<dyn FileSystem>,
    logger: Arc<dyn Logger>,
    base_sequence_number: u64,
    highest_sequence_number: u64,
    total_bytes: u32,
    latest_timestamp_ms: i64,
    id: String,
}

impl Segment {
    pub fn new(
        base_sequence_number: u64,
        filesystem: Arc<dyn FileSystem>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            file: None,
            filesystem,
            logger,
            base_sequence_number,
            highest_sequence_number: base_sequence_number,
            total_bytes: 0,
            latest_timestamp_ms: 0,
            id: format!("{base_sequence_number:019}.log"),
        }
    }

    pub fn base_sequence_number(&self) -> u64 {
        self.base_sequence_number
    }

    pub fn highest_sequence_number(&self) -> u64 {
        self.highest_sequence_number
    }

    pub fn total_bytes(&self) -> u32 {
        self.total_bytes
    }

    pub fn latest_timestamp_ms(&self) -> i64 {
        self.latest_timestamp_ms
    }

    /// Opens (creating if absent) the segment file and recovers its extent
    /// by scanning records from offset zero.
    ///
    /// A short tail, a bad magic word, or (with `full_corruption_check`) a
    /// failing CRC truncates the file at the bad record; recovery then
    /// finishes successfully with whatever precedes it.
    pub fn open(&mut self, full_corruption_check: bool) -> Result<(), StreamError> {
        let file = self
            .filesystem
            .open(&self.id)
            .map_err(|e| StreamError::WriteError(e.to_string()))?;
        self.file = Some(file);

        let mut offset = 0u32;
        loop {
            let header_bytes = match self.file().read(offset, offset + RECORD_HEADER_SIZE) {
                Ok(bytes) => bytes,
                Err(FileError::EndOfFile) => {
                    // Less data at the tail than a header: everything before
                    // this point is known valid, everything after is gone.
                    let _ = self.file().truncate(offset);
                    return Ok(());
                }
                Err(e) => {
                    self.truncate_and_log(offset, &StreamError::ReadError(e.to_string()));
                    continue;
                }
            };
            let header = RecordHeader::decode(&header_bytes);

            if header.magic_and_version != MAGIC_AND_VERSION {
                self.truncate_and_log(offset, &StreamError::HeaderDataCorrupted);
                continue;
            }

            let sequence_number = self
                .base_sequence_number
                .wrapping_add(header.relative_sequence_number as u64);

            if full_corruption_check {
                let options = ReadOptions {
                    check_for_corruption: true,
                    may_return_later_records: false,
                    suggested_start: offset,
                };
                if let Err(e) = self.read(sequence_number, &options) {
                    self.truncate_and_log(offset, &e);
                    continue;
                }
            }

            offset += RECORD_HEADER_SIZE + header.payload_length_bytes as u32;
            self.total_bytes += RECORD_HEADER_SIZE + header.payload_length_bytes as u32;
            self.highest_sequence_number = self.highest_sequence_number.max(sequence_number);
            self.latest_timestamp_ms = self.latest_timestamp_ms.max(header.timestamp);
        }
    }

    /// Appends one framed record. On any append or flush failure the file is
    /// truncated back to the recovered extent and the error is returned; the
    /// segment keeps no partial record.
    ///
    /// Returns the number of bytes the record occupies on disk.
    pub fn append(
        &mut self,
        payload: &[u8],
        timestamp_ms: i64,
        sequence_number: u64,
        sync: bool,
    ) -> Result<u32, FileError> {
        let payload_length = payload.len() as i32;
        let header = RecordHeader {
            magic_and_version: MAGIC_AND_VERSION,
            relative_sequence_number: sequence_number.wrapping_sub(self.base_sequence_number)
                as i32,
            byte_position: self.total_bytes as i32,
            crc: record_crc(timestamp_ms, payload_length, payload),
            timestamp: timestamp_ms,
            payload_length_bytes: payload_length,
        };

        let rollback_to = self.total_bytes;
        let encoded = header.encode();
        let file = self.file();
        for part in [&encoded[..], payload] {
            if let Err(e) = file.append(part) {
                let _ = file.truncate(rollback_to);
                return Err(e);
            }
        }
        if let Err(e) = file.flush() {
            let _ = file.truncate(rollback_to);
            return Err(e);
        }
        if sync {
            file.sync();
        }

        self.highest_sequence_number = self.highest_sequence_number.max(sequence_number);
        self.latest_timestamp_ms = self.latest_timestamp_ms.max(timestamp_ms);
        let written = RECORD_HEADER_SIZE + payload.len() as u32;
        self.total_bytes += written;
        Ok(written)
    }

    /// Finds the record with the given sequence number by scanning forward.
    ///
    /// The scan starts at `suggested_start` when non-zero; any header read
    /// failure there restarts it once from offset zero, since the hint may
    /// point into records that have since been truncated away.
    pub fn read(
        &mut self,
        sequence_number: u64,
        options: &ReadOptions,
    ) -> Result<OwnedRecord, StreamError> {
        let mut offset = options.suggested_start;
        let mut from_suggested_start = offset != 0;

        loop {
            let header_bytes = match self.file().read(offset, offset + RECORD_HEADER_SIZE) {
                Ok(bytes) => bytes,
                Err(e) => {
                    if from_suggested_start {
                        offset = 0;
                        from_suggested_start = false;
                        continue;
                    }
                    return Err(match e {
                        FileError::EndOfFile => StreamError::RecordNotFound,
                        other => StreamError::ReadError(other.to_string()),
                    });
                }
            };
            let header = RecordHeader::decode(&header_bytes);

            if header.magic_and_version != MAGIC_AND_VERSION {
                return Err(StreamError::HeaderDataCorrupted);
            }

            let expected_relative = sequence_number.wrapping_sub(self.base_sequence_number) as i32;

            // The record is after the one requested: fail unless the caller
            // accepts later records.
            if header.relative_sequence_number > expected_relative
                && !options.may_return_later_records
            {
                return Err(StreamError::RecordNotFound);
            }

            if header.relative_sequence_number >= expected_relative {
                let payload_begin = offset + RECORD_HEADER_SIZE;
                let payload_end = payload_begin + header.payload_length_bytes as u32;
                let data = self
                    .file()
                    .read(payload_begin, payload_end)
                    .map_err(|e| StreamError::ReadError(e.to_string()))?;

                if options.check_for_corruption
                    && header.crc != record_crc(header.timestamp, header.payload_length_bytes, &data)
                {
                    return Err(StreamError::RecordDataCorrupted);
                }

                return Ok(OwnedRecord {
                    data,
                    timestamp: header.timestamp,
                    sequence_number: self
                        .base_sequence_number
                        .wrapping_add(header.relative_sequence_number as u64),
                    offset: payload_begin,
                });
            }

            offset += RECORD_HEADER_SIZE + header.payload_length_bytes as u32;
        }
    }

    /// Closes the file handle and deletes the segment file. A failed delete
    /// is logged; the in-memory segment is gone either way.
    pub fn remove(&mut self) {
        self.file = None;
        if let Err(e) = self.filesystem.remove(&self.id)
            && self.logger.level() <= LogLevel::Warning
        {
            self.logger.log(
                LogLevel::Warning,
                &format!("Issue deleting {} due to: {e}", self.id),
            );
        }
    }

    fn file(&mut self) -> &mut dyn FileLike {
        self.file.as_deref_mut().expect("segment file is open")
    }

    fn truncate_and_log(&mut self, truncate_to: u32, err: &StreamError) {
        if self.logger.level() <= LogLevel::Warning {
            self.logger.log(
                LogLevel::Warning,
                &format!(
                    "Truncating {} to a length of {truncate_to} because {err}",
                    self.id
                ),
            );
        }
        let _ = self.file().truncate(truncate_to);
    }
}
