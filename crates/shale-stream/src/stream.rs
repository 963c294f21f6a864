//! The stream: an ordered collection of segments plus the embedded
//! checkpoint store.
//!
//! # Invariants
//!
//! - Segments hold disjoint, monotonically increasing sequence ranges.
//! - `first_sequence_number` is the first segment's base, or the previous
//!   highest plus one when every segment has been evicted.
//! - `current_size_bytes` never exceeds `maximum_size_bytes` after a
//!   successful append.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use shale_io::{FileSystem, Logger, default_logger};
use shale_kv::{Kv, KvOptions};

use crate::StreamError;
use crate::iterator::{PersistentIterator, StreamIterator};
use crate::record::{OwnedRecord, RECORD_HEADER_SIZE};
use crate::segment::Segment;

/// Milliseconds since the Unix epoch, from the system clock.
pub fn timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// Configuration for [`FileStream::open_or_create`].
pub struct StreamOptions {
    /// Once the newest segment reaches this size a fresh one is started.
    pub minimum_segment_size_bytes: u32,
    /// Cap on the stream's total on-disk size.
    pub maximum_size_bytes: u32,
    /// Verify every record's CRC while recovering segments on open.
    pub full_corruption_check_on_open: bool,
    /// Backing filesystem implementation.
    pub filesystem: Arc<dyn FileSystem>,
    /// Sink for recovery and eviction warnings.
    pub logger: Arc<dyn Logger>,
    /// Options for the embedded store holding iterator checkpoints.
    pub kv_options: KvOptions,
    /// Source of record timestamps. Tests substitute a deterministic clock.
    pub clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl StreamOptions {
    /// Defaults: 16 MiB minimum segment size, 128 MiB size cap, fast open
    /// scan, checkpoint store named `m` compacting after 128 KiB of
    /// reclaimable bytes, system clock.
    pub fn new(filesystem: Arc<dyn FileSystem>) -> Self {
        let mut kv_options = KvOptions::new(filesystem.clone(), "m");
        kv_options.compact_after = 128 * 1024;
        Self {
            minimum_segment_size_bytes: 16 * 1024 * 1024,
            maximum_size_bytes: 128 * 1024 * 1024,
            full_corruption_check_on_open: false,
            logger: default_logger(),
            kv_options,
            filesystem,
            clock: Arc::new(timestamp_ms),
        }
    }
}

/// Per-append knobs.
#[derive(Debug, Clone, Copy)]
pub struct AppendOptions {
    /// Ask the OS to persist the record before returning.
    pub sync_on_append: bool,
    /// When the cap would be exceeded, evict oldest segments to make room
    /// instead of failing with [`StreamError::StreamFull`].
    pub remove_oldest_segments_if_full: bool,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            sync_on_append: false,
            remove_oldest_segments_if_full: true,
        }
    }
}

/// Per-read knobs.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Verify the record's CRC before returning it.
    pub check_for_corruption: bool,
    /// When the exact record is unavailable (evicted or corrupted), return
    /// the next available one instead of failing.
    pub may_return_later_records: bool,
    /// Byte offset hint into the segment; zero means scan from the start.
    pub suggested_start: u32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            check_for_corruption: true,
            may_return_later_records: false,
            suggested_start: 0,
        }
    }
}

/// Options for [`FileStream::open_or_create_iterator`]. Reserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct IteratorOptions {}

/// State guarded by the stream mutex.
struct StreamInner {
    /// Sorted by base sequence number, oldest first.
    segments: Vec<Segment>,
    /// Named iterators known to this stream instance.
    iterators: Vec<PersistentIterator>,
}

/// A segmented, size-bounded, crash-safe record stream.
///
/// Every public operation is serialized by a per-instance mutex. The three
/// counters are atomics so the observers read them without taking it.
pub struct FileStream {
    filesystem: Arc<dyn FileSystem>,
    logger: Arc<dyn Logger>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
    minimum_segment_size_bytes: u32,
    maximum_size_bytes: u32,
    full_corruption_check_on_open: bool,
    kv: Arc<Kv>,
    /// Handed to cursors and checkpointable records, so they never keep a
    /// dropped stream's files open.
    weak_self: Weak<FileStream>,
    first_sequence_number: AtomicU64,
    next_sequence_number: AtomicU64,
    current_size_bytes: AtomicU64,
    inner: Mutex<StreamInner>,
}

impl FileStream {
    /// Opens the stream, recovering any existing segments and the embedded
    /// checkpoint store.
    ///
    /// Directory entries ending in `.log` whose name prefix parses as an
    /// unsigned decimal become segments; anything else is ignored. Segment
    /// corruption is recovered by truncation inside [`Segment::open`]; any
    /// other failure aborts the open.
    pub fn open_or_create(options: StreamOptions) -> Result<Arc<FileStream>, StreamError> {
        let kv = Arc::new(Kv::open_or_create(options.kv_options)?);

        let names = options.filesystem.list()?;
        let mut segments = Vec::new();
        for name in names {
            if !name.ends_with(".log") {
                continue;
            }
            let digits: &str = &name[..name.len() - ".log".len()];
            let Ok(base) = digits.parse::<u64>() else {
                // Not one of ours; leave it alone.
                continue;
            };
            let mut segment =
                Segment::new(base, options.filesystem.clone(), options.logger.clone());
            segment.open(options.full_corruption_check_on_open)?;
            segments.push(segment);
        }
        segments.sort_by_key(Segment::base_sequence_number);

        let (first, next) = match (segments.first(), segments.last()) {
            (Some(front), Some(back)) => (
                front.base_sequence_number(),
                back.highest_sequence_number() + 1,
            ),
            _ => (0, 0),
        };
        let total: u64 = segments.iter().map(|s| u64::from(s.total_bytes())).sum();

        Ok(Arc::new_cyclic(|weak| FileStream {
            filesystem: options.filesystem,
            logger: options.logger,
            clock: options.clock,
            minimum_segment_size_bytes: options.minimum_segment_size_bytes,
            maximum_size_bytes: options.maximum_size_bytes,
            full_corruption_check_on_open: options.full_corruption_check_on_open,
            kv,
            weak_self: weak.clone(),
            first_sequence_number: AtomicU64::new(first),
            next_sequence_number: AtomicU64::new(next),
            current_size_bytes: AtomicU64::new(total),
            inner: Mutex::new(StreamInner {
                segments,
                iterators: Vec::new(),
            }),
        }))
    }

    /// Sequence number of the oldest record still in the stream.
    pub fn first_sequence_number(&self) -> u64 {
        self.first_sequence_number.load(Ordering::SeqCst)
    }

    /// Sequence number of the newest record in the stream.
    pub fn highest_sequence_number(&self) -> u64 {
        self.next_sequence_number.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Total on-disk size of the live segments in bytes.
    pub fn current_size_bytes(&self) -> u64 {
        self.current_size_bytes.load(Ordering::SeqCst)
    }

    /// Appends a record, assigning it the next sequence number.
    ///
    /// Rolls to a new segment when the newest one has reached the minimum
    /// segment size, and evicts oldest segments first when the cap would be
    /// exceeded (unless the options forbid it).
    pub fn append(&self, payload: &[u8], options: &AppendOptions) -> Result<u64, StreamError> {
        let mut inner = self.inner.lock().expect("stream lock poisoned");
        let inner = &mut *inner;

        self.make_room_for(
            inner,
            payload.len() as u32,
            options.remove_oldest_segments_if_full,
        )?;

        let needs_new_segment = match inner.segments.last() {
            Some(last) => last.total_bytes() >= self.minimum_segment_size_bytes,
            None => true,
        };
        if needs_new_segment {
            let mut segment = Segment::new(
                self.next_sequence_number.load(Ordering::SeqCst),
                self.filesystem.clone(),
                self.logger.clone(),
            );
            segment.open(self.full_corruption_check_on_open)?;
            inner.segments.push(segment);
        }

        let sequence_number = self.next_sequence_number.fetch_add(1, Ordering::SeqCst);
        let timestamp = (self.clock)();
        let segment = inner.segments.last_mut().expect("segment was just ensured");
        match segment.append(payload, timestamp, sequence_number, options.sync_on_append) {
            Ok(written) => {
                // Only count the bytes on success; a failed append has
                // already truncated itself away inside the segment.
                self.current_size_bytes
                    .fetch_add(u64::from(written), Ordering::SeqCst);
                Ok(sequence_number)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the record with the given sequence number.
    ///
    /// With [`ReadOptions::may_return_later_records`] the read skips forward
    /// over evicted or corrupted stretches — including across a corrupted
    /// segment tail into the following segment — and returns the first
    /// record at or after the requested sequence number.
    pub fn read(
        &self,
        sequence_number: u64,
        options: &ReadOptions,
    ) -> Result<OwnedRecord, StreamError> {
        if sequence_number < self.first_sequence_number.load(Ordering::SeqCst)
            || sequence_number >= self.next_sequence_number.load(Ordering::SeqCst)
        {
            return Err(StreamError::RecordNotFound);
        }

        let mut inner = self.inner.lock().expect("stream lock poisoned");
        let mut read_options = *options;

        // Start by looking for the exact record. Once a segment turns out to
        // be unable to produce it (truncated by corruption recovery, or the
        // record sat in an evicted range), fall forward to the next
        // available record if the caller allows that.
        let mut find_exact = true;
        for segment in &mut inner.segments {
            let has_exact_range = sequence_number >= segment.base_sequence_number()
                && sequence_number <= segment.highest_sequence_number();

            if sequence_number < segment.base_sequence_number()
                && read_options.may_return_later_records
            {
                find_exact = false;
            }

            if has_exact_range || !find_exact {
                match segment.read(sequence_number, &read_options) {
                    Ok(record) => return Ok(record),
                    Err(
                        StreamError::RecordNotFound
                        | StreamError::RecordDataCorrupted
                        | StreamError::HeaderDataCorrupted,
                    ) if read_options.may_return_later_records => {
                        find_exact = false;
                        // A new segment means the hint no longer applies.
                        read_options.suggested_start = 0;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Err(StreamError::RecordNotFound)
    }

    /// Evicts whole segments whose newest record is older than the cutoff,
    /// stopping at the first segment that is not entirely expired. Returns
    /// the number of bytes removed.
    pub fn remove_older_records(&self, older_than_timestamp_ms: i64) -> u64 {
        let mut inner = self.inner.lock().expect("stream lock poisoned");
        let mut removed = 0u64;
        while let Some(oldest) = inner.segments.first() {
            if oldest.latest_timestamp_ms() >= older_than_timestamp_ms {
                break;
            }
            removed += u64::from(oldest.total_bytes());
            self.erase_oldest_segment(&mut inner);
        }
        removed
    }

    /// Returns a cursor for the named persistent iterator, creating it (and
    /// loading its checkpoint from the embedded store) if this stream hasn't
    /// seen the identifier yet.
    ///
    /// The cursor starts at the checkpointed position, clamped to the first
    /// sequence number still in the stream.
    pub fn open_or_create_iterator(
        &self,
        identifier: &str,
        _options: IteratorOptions,
    ) -> StreamIterator {
        let mut inner = self.inner.lock().expect("stream lock poisoned");
        let first = self.first_sequence_number.load(Ordering::SeqCst);

        if let Some(existing) = inner
            .iterators
            .iter()
            .find(|it| it.identifier() == identifier)
        {
            let start = first.max(existing.sequence_number());
            return StreamIterator::new(self.weak_self.clone(), identifier, start);
        }

        let iterator = PersistentIterator::new(identifier.to_string(), first, self.kv.clone());
        let start = first.max(iterator.sequence_number());
        inner.iterators.push(iterator);
        StreamIterator::new(self.weak_self.clone(), identifier, start)
    }

    /// Deletes the named iterator: forgets it in memory and removes its
    /// checkpoint from the embedded store. Deleting an unknown iterator is
    /// not an error.
    pub fn delete_iterator(&self, identifier: &str) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().expect("stream lock poisoned");
        if let Some(position) = inner
            .iterators
            .iter()
            .position(|it| it.identifier() == identifier)
        {
            inner.iterators.remove(position);
        }
        match self.kv.remove(identifier) {
            Ok(()) | Err(shale_kv::KvError::KeyNotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists `sequence_number` as the last record the named iterator has
    /// consumed; a reopened iterator resumes at the record after it.
    pub fn set_checkpoint(
        &self,
        identifier: &str,
        sequence_number: u64,
    ) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().expect("stream lock poisoned");
        let iterator = inner
            .iterators
            .iter_mut()
            .find(|it| it.identifier() == identifier)
            .ok_or(StreamError::IteratorNotFound)?;
        iterator.set_checkpoint(sequence_number)
    }

    /// Checks the size cap, evicting oldest segments when permitted.
    fn make_room_for(
        &self,
        inner: &mut StreamInner,
        record_size: u32,
        remove_oldest_segments_if_full: bool,
    ) -> Result<(), StreamError> {
        let max_size = self.maximum_size_bytes - RECORD_HEADER_SIZE;
        if record_size > max_size {
            return Err(StreamError::RecordTooLarge);
        }

        let budget = u64::from(max_size - record_size);
        if self.current_size_bytes.load(Ordering::SeqCst) > budget
            && !remove_oldest_segments_if_full
        {
            return Err(StreamError::StreamFull);
        }

        while self.current_size_bytes.load(Ordering::SeqCst) > budget
            && !inner.segments.is_empty()
        {
            self.erase_oldest_segment(inner);
        }
        Ok(())
    }

    /// Removes the oldest segment on disk and in memory, advancing
    /// `first_sequence_number` past it.
    fn erase_oldest_segment(&self, inner: &mut StreamInner) {
        let mut segment = inner.segments.remove(0);
        self.current_size_bytes
            .fetch_sub(u64::from(segment.total_bytes()), Ordering::SeqCst);
        let previous_highest = segment.highest_sequence_number();
        segment.remove();

        let new_first = match inner.segments.first() {
            Some(front) => front.base_sequence_number(),
            None => previous_highest + 1,
        };
        self.first_sequence_number.store(new_first, Ordering::SeqCst);
    }
}
