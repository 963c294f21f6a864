//! End-to-end stream scenarios on a real filesystem.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use shale::{
    AppendOptions, FileStream, FileSystem, IteratorOptions, PosixFileSystem, ReadOptions,
    StreamError, StreamOptions,
};

const MIB: u32 = 1024 * 1024;

fn posix(dir: &Path) -> Arc<dyn FileSystem> {
    Arc::new(PosixFileSystem::new(dir).unwrap())
}

fn mib_stream_options(dir: &Path) -> StreamOptions {
    let mut options = StreamOptions::new(posix(dir));
    options.minimum_segment_size_bytes = MIB;
    options.maximum_size_bytes = 10 * MIB;
    options.full_corruption_check_on_open = true;
    options.kv_options.full_corruption_check_on_open = true;
    options.kv_options.compact_after = 1024;
    options
}

/// Small segments so tests span several of them with little data:
/// 128-byte records, 8 records per segment, 1 KiB cap.
fn small_stream_options(dir: &Path) -> StreamOptions {
    let mut options = StreamOptions::new(posix(dir));
    options.minimum_segment_size_bytes = 1024;
    options.maximum_size_bytes = 64 * 1024;
    options
}

#[test]
fn rollover_evicts_down_to_nine_segments() {
    let dir = tempfile::tempdir().unwrap();
    let stream = FileStream::open_or_create(mib_stream_options(dir.path())).unwrap();

    let payload = vec![0xABu8; MIB as usize];
    for _ in 0..30 {
        stream.append(&payload, &AppendOptions::default()).unwrap();
    }

    assert_eq!(stream.current_size_bytes(), 9 * (u64::from(MIB) + 32));
    assert_eq!(
        stream.highest_sequence_number() - stream.first_sequence_number() + 1,
        9
    );
    assert!(stream.first_sequence_number() > 0);
}

#[test]
fn full_stream_without_eviction_rejects_the_tenth_append() {
    let dir = tempfile::tempdir().unwrap();
    let stream = FileStream::open_or_create(mib_stream_options(dir.path())).unwrap();
    let no_eviction = AppendOptions {
        remove_oldest_segments_if_full: false,
        ..AppendOptions::default()
    };

    let payload = vec![0xABu8; MIB as usize];
    for expected in 0..9 {
        assert_eq!(stream.append(&payload, &no_eviction).unwrap(), expected);
    }
    assert!(matches!(
        stream.append(&payload, &no_eviction),
        Err(StreamError::StreamFull)
    ));
    assert_eq!(stream.first_sequence_number(), 0);
    assert_eq!(stream.highest_sequence_number(), 8);
}

#[test]
fn corrupted_segment_tail_and_skip_forward_reads() {
    let dir = tempfile::tempdir().unwrap();
    let stream = FileStream::open_or_create(small_stream_options(dir.path())).unwrap();

    // Two full segments of eight 128-byte records each.
    for i in 0..16u8 {
        stream.append(&[i; 96], &AppendOptions::default()).unwrap();
    }
    drop(stream);

    // Corrupt the second record's header in the first segment.
    let first_segment = dir.path().join("0000000000000000000.log");
    let mut bytes = fs::read(&first_segment).unwrap();
    bytes[128] = 0x00;
    fs::write(&first_segment, &bytes).unwrap();

    // Reopen: recovery truncates the first segment down to one record.
    let stream = FileStream::open_or_create(small_stream_options(dir.path())).unwrap();
    assert_eq!(stream.first_sequence_number(), 0);
    assert_eq!(stream.highest_sequence_number(), 15);

    let record = stream.read(0, &ReadOptions::default()).unwrap();
    assert_eq!(&record.data[..], &[0u8; 96]);

    // Sequence numbers 1..=7 fell inside the truncated tail.
    for seq in 1..8 {
        assert!(
            matches!(
                stream.read(seq, &ReadOptions::default()),
                Err(StreamError::RecordNotFound)
            ),
            "sequence {seq} should be gone"
        );
    }

    // The second segment still serves its base record exactly.
    let record = stream.read(8, &ReadOptions::default()).unwrap();
    assert_eq!(&record.data[..], &[8u8; 96]);

    // Skip-forward reads ride over the hole into the next segment.
    let skip_forward = ReadOptions {
        may_return_later_records: true,
        ..ReadOptions::default()
    };
    let record = stream.read(1, &skip_forward).unwrap();
    assert_eq!(record.sequence_number, 8);
    assert_eq!(&record.data[..], &[8u8; 96]);
}

#[test]
fn iterator_checkpoints_persist_across_stream_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let stream = FileStream::open_or_create(small_stream_options(dir.path())).unwrap();
    for i in 0..3u8 {
        stream.append(&[i; 16], &AppendOptions::default()).unwrap();
    }

    let mut cursor = stream.open_or_create_iterator("ita", IteratorOptions::default());
    assert_eq!(cursor.sequence_number, 0);

    // Read two records, checkpointing each.
    for _ in 0..2 {
        let record = cursor.read().unwrap();
        record.checkpoint().unwrap();
        cursor.advance();
    }

    // Reopening the iterator on the same stream resumes at 2.
    let cursor = stream.open_or_create_iterator("ita", IteratorOptions::default());
    assert_eq!(cursor.sequence_number, 2);
    drop(cursor);
    drop(stream);

    // Reopening the whole stream still resumes at 2.
    let stream = FileStream::open_or_create(small_stream_options(dir.path())).unwrap();
    let cursor = stream.open_or_create_iterator("ita", IteratorOptions::default());
    assert_eq!(cursor.sequence_number, 2);
    drop(cursor);

    // Deleting the iterator resets it to the head of the stream.
    stream.delete_iterator("ita").unwrap();
    let cursor = stream.open_or_create_iterator("ita", IteratorOptions::default());
    assert_eq!(cursor.sequence_number, 0);
}

#[test]
fn time_based_eviction_removes_only_fully_expired_segments() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(AtomicI64::new(0));
    let mut options = small_stream_options(dir.path());
    let clock_handle = clock.clone();
    options.clock = Arc::new(move || clock_handle.load(Ordering::SeqCst));

    let stream = FileStream::open_or_create(options).unwrap();
    // Segment one holds timestamps 0..=7, segment two 8..=15, and one more
    // record opens segment three.
    for t in 0..17i64 {
        clock.store(t, Ordering::SeqCst);
        stream.append(&[1u8; 96], &AppendOptions::default()).unwrap();
    }

    // Cut off at a timestamp inside segment two: segment one goes, segment
    // two stays.
    let removed = stream.remove_older_records(10);
    assert_eq!(removed, 8 * 128);
    assert_eq!(stream.first_sequence_number(), 8);
    assert!(stream.read(8, &ReadOptions::default()).is_ok());
    assert!(matches!(
        stream.read(7, &ReadOptions::default()),
        Err(StreamError::RecordNotFound)
    ));
}

#[test]
fn iterator_rides_over_evicted_records() {
    let dir = tempfile::tempdir().unwrap();
    let stream = FileStream::open_or_create(small_stream_options(dir.path())).unwrap();
    for i in 0..8u8 {
        stream.append(&[i; 16], &AppendOptions::default()).unwrap();
    }

    let mut cursor = stream.open_or_create_iterator("lagging", IteratorOptions::default());
    cursor.read().unwrap().checkpoint().unwrap();
    drop(cursor);

    // Evict everything by age; the checkpointed position no longer exists.
    stream.remove_older_records(i64::MAX);
    for i in 8..12u8 {
        stream.append(&[i; 16], &AppendOptions::default()).unwrap();
    }

    // The reopened cursor is clamped to the stream's first live record.
    let mut cursor = stream.open_or_create_iterator("lagging", IteratorOptions::default());
    let record = cursor.read().unwrap();
    assert_eq!(record.sequence_number, stream.first_sequence_number());
}

#[test]
fn sync_on_append_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let stream = FileStream::open_or_create(small_stream_options(dir.path())).unwrap();
    let durable = AppendOptions {
        sync_on_append: true,
        ..AppendOptions::default()
    };
    let seq = stream.append(b"synced", &durable).unwrap();
    let record = stream.read(seq, &ReadOptions::default()).unwrap();
    assert_eq!(&record.data[..], b"synced");
}
