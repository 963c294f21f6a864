//! Persistent named iterators and their cursors.
//!
//! A [`PersistentIterator`] is the stream-side state of a named reader: its
//! identifier and the sequence number it will resume from, backed by an
//! 8-byte checkpoint in the embedded KV store. The stream owns these.
//!
//! A [`StreamIterator`] is the caller-side cursor. It holds only a weak
//! handle to its stream, so dropping the stream invalidates cursors instead
//! of keeping the files open: a cycle cannot form, because the persistent
//! iterator inside the stream holds the KV store, not the stream itself.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use shale_kv::Kv;

use crate::StreamError;
use crate::record::OwnedRecord;
use crate::stream::{FileStream, ReadOptions};

/// Stream-side state of a named iterator.
pub(crate) struct PersistentIterator {
    identifier: String,
    store: Arc<Kv>,
    sequence_number: u64,
}

impl PersistentIterator {
    /// Loads the checkpoint stored under `identifier`, if any. The resume
    /// position is the stored sequence number or `start`, whichever is
    /// later.
    pub fn new(identifier: String, start: u64, store: Arc<Kv>) -> Self {
        let mut sequence_number = start;
        if let Ok(value) = store.get(&identifier)
            && value.len() == 8
        {
            let stored = u64::from_ne_bytes(value[..].try_into().expect("8-byte value"));
            sequence_number = start.max(stored);
        }
        Self {
            identifier,
            store,
            sequence_number,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Persists the position after `sequence_number` — the first unread
    /// record — as the checkpoint.
    pub fn set_checkpoint(&mut self, sequence_number: u64) -> Result<(), StreamError> {
        self.sequence_number = sequence_number + 1;
        self.store
            .put(&self.identifier, &self.sequence_number.to_ne_bytes())
            .map_err(StreamError::from)
    }
}

/// A pull-based cursor over a stream, restartable and unbounded.
///
/// Reading does not advance the cursor; call [`advance`] after consuming a
/// record. Because reads use [`ReadOptions::may_return_later_records`], a
/// cursor pointed at an evicted or corrupted stretch lands on the next
/// available record and reports that record's sequence number.
///
/// [`advance`]: StreamIterator::advance
pub struct StreamIterator {
    stream: Weak<FileStream>,
    identifier: String,
    /// Byte-offset hint for the next read, from the last record returned.
    offset_hint: u32,
    /// Sequence number the next read starts from.
    pub sequence_number: u64,
    /// Timestamp of the record last read; zero after [`advance`].
    ///
    /// [`advance`]: StreamIterator::advance
    pub timestamp: i64,
}

impl StreamIterator {
    pub(crate) fn new(stream: Weak<FileStream>, identifier: &str, sequence_number: u64) -> Self {
        Self {
            stream,
            identifier: identifier.to_string(),
            offset_hint: 0,
            sequence_number,
            timestamp: 0,
        }
    }

    /// Reads the record at the cursor (or the next available one), caching
    /// its position so the record can be checkpointed later.
    ///
    /// # Errors
    ///
    /// [`StreamError::StreamClosed`] if the stream has been dropped;
    /// [`StreamError::RecordNotFound`] at the head of the stream.
    pub fn read(&mut self) -> Result<CheckpointableRecord, StreamError> {
        let stream = self.stream.upgrade().ok_or_else(|| {
            StreamError::StreamClosed("Unable to read from a destroyed stream".to_string())
        })?;

        let options = ReadOptions {
            check_for_corruption: true,
            may_return_later_records: true,
            suggested_start: self.offset_hint,
        };
        let record = stream.read(self.sequence_number, &options)?;

        self.timestamp = record.timestamp;
        self.offset_hint = record.offset + record.data.len() as u32;
        self.sequence_number = record.sequence_number;

        Ok(CheckpointableRecord {
            stream: self.stream.clone(),
            identifier: self.identifier.clone(),
            sequence_number: record.sequence_number,
            record,
        })
    }

    /// Moves the cursor past the record last read.
    pub fn advance(&mut self) {
        self.sequence_number += 1;
        self.timestamp = 0;
    }
}

/// A record captured by a cursor, able to checkpoint its own position.
///
/// Dereferences to the underlying [`OwnedRecord`]. Holds a weak handle back
/// to the stream so a client can keep records around and checkpoint them
/// after processing; if the stream is gone by then, checkpointing fails
/// with [`StreamError::StreamClosed`].
pub struct CheckpointableRecord {
    stream: Weak<FileStream>,
    identifier: String,
    sequence_number: u64,
    record: OwnedRecord,
}

impl CheckpointableRecord {
    /// Persists this record's position as its iterator's checkpoint; a
    /// reopened iterator with the same identifier resumes just after it.
    pub fn checkpoint(&self) -> Result<(), StreamError> {
        let stream = self.stream.upgrade().ok_or_else(|| {
            StreamError::StreamClosed("Unable to set checkpoint in a destroyed stream".to_string())
        })?;
        stream.set_checkpoint(&self.identifier, self.sequence_number)
    }

    /// Consumes the wrapper, returning the record.
    pub fn into_record(self) -> OwnedRecord {
        self.record
    }
}

impl Deref for CheckpointableRecord {
    type Target = OwnedRecord;

    fn deref(&self) -> &OwnedRecord {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shale_io::MemoryFileSystem;

    use crate::stream::{AppendOptions, FileStream, IteratorOptions, StreamOptions};

    use super::*;

    fn stream_with_records(count: usize) -> (Arc<MemoryFileSystem>, Arc<FileStream>) {
        let fs = Arc::new(MemoryFileSystem::new());
        let stream = FileStream::open_or_create(StreamOptions::new(fs.clone())).unwrap();
        for i in 0..count {
            stream
                .append(format!("record-{i}").as_bytes(), &AppendOptions::default())
                .unwrap();
        }
        (fs, stream)
    }

    #[test]
    fn cursor_walks_records_in_order() {
        let (_fs, stream) = stream_with_records(3);
        let mut cursor = stream.open_or_create_iterator("it", IteratorOptions::default());
        for i in 0..3u64 {
            let record = cursor.read().unwrap();
            assert_eq!(&record.data[..], format!("record-{i}").as_bytes());
            assert_eq!(record.sequence_number, i);
            assert_eq!(cursor.sequence_number, i);
            cursor.advance();
            assert_eq!(cursor.timestamp, 0);
        }
    }

    #[test]
    fn cursor_reports_head_of_stream() {
        let (_fs, stream) = stream_with_records(1);
        let mut cursor = stream.open_or_create_iterator("it", IteratorOptions::default());
        cursor.read().unwrap();
        cursor.advance();
        assert!(matches!(cursor.read(), Err(StreamError::RecordNotFound)));
    }

    #[test]
    fn checkpoint_resumes_after_last_read_record() {
        let (_fs, stream) = stream_with_records(3);
        {
            let mut cursor = stream.open_or_create_iterator("it", IteratorOptions::default());
            let record = cursor.read().unwrap();
            record.checkpoint().unwrap();
            cursor.advance();
            let record = cursor.read().unwrap();
            record.checkpoint().unwrap();
        }
        let cursor = stream.open_or_create_iterator("it", IteratorOptions::default());
        assert_eq!(cursor.sequence_number, 2);
    }

    #[test]
    fn deleted_iterator_restarts_from_the_beginning() {
        let (_fs, stream) = stream_with_records(3);
        let mut cursor = stream.open_or_create_iterator("it", IteratorOptions::default());
        cursor.read().unwrap().checkpoint().unwrap();
        stream.delete_iterator("it").unwrap();
        let cursor = stream.open_or_create_iterator("it", IteratorOptions::default());
        assert_eq!(cursor.sequence_number, 0);
        // Deleting an unknown iterator is fine too.
        stream.delete_iterator("never-existed").unwrap();
    }

    #[test]
    fn cursor_outliving_its_stream_fails_closed() {
        let (_fs, stream) = stream_with_records(1);
        let mut cursor = stream.open_or_create_iterator("it", IteratorOptions::default());
        let record = cursor.read().unwrap();
        drop(stream);
        assert!(matches!(cursor.read(), Err(StreamError::StreamClosed(_))));
        assert!(matches!(record.checkpoint(), Err(StreamError::StreamClosed(_))));
    }

    #[test]
    fn checkpoint_for_unknown_iterator_is_reported() {
        let (_fs, stream) = stream_with_records(1);
        assert!(matches!(
            stream.set_checkpoint("ghost", 0),
            Err(StreamError::IteratorNotFound)
        ));
    }
}
