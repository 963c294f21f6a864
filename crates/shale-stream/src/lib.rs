//! # shale-stream: segmented append-only record stream
//!
//! An embedded, file-backed log of records identified by monotonic 64-bit
//! sequence numbers. Records are framed with a checksummed 32-byte big-endian
//! header and appended to size-bounded segment files that roll over, age out
//! by total size, and can be evicted wholesale by record timestamp. Named
//! *persistent iterators* resume where they left off across process
//! restarts: their checkpoints live in an embedded [`shale_kv`] store kept in
//! the same directory.
//!
//! # File layout
//!
//! ```text
//! {base_dir}/
//! ├── 0000000000000000000.log   <- segment, base sequence number 0
//! ├── 0000000000000001352.log   <- segment, base sequence number 1352
//! ├── m                         <- embedded KV store (iterator checkpoints)
//! └── ms                        <- transient KV shadow during compaction
//! ```
//!
//! # Crash safety
//!
//! A torn or corrupt segment tail is detected on open (bad magic, short
//! read, or CRC mismatch with the full check enabled) and truncated away;
//! recovery then continues from the surviving records. Reads can skip across
//! a corrupted tail into the next segment when
//! [`ReadOptions::may_return_later_records`] is set, which is how iterators
//! ride out damage in the middle of a stream.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use shale_io::MemoryFileSystem;
//! use shale_stream::{AppendOptions, FileStream, IteratorOptions, ReadOptions, StreamOptions};
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! let stream = FileStream::open_or_create(StreamOptions::new(fs)).unwrap();
//!
//! let seq = stream.append(b"hello", &AppendOptions::default()).unwrap();
//! let record = stream.read(seq, &ReadOptions::default()).unwrap();
//! assert_eq!(&record.data[..], b"hello");
//!
//! let mut cursor = stream.open_or_create_iterator("reader", IteratorOptions::default());
//! let record = cursor.read().unwrap();
//! record.checkpoint().unwrap();
//! ```

mod error;
mod iterator;
mod record;
mod segment;
mod stream;

pub use error::StreamError;
pub use iterator::{CheckpointableRecord, StreamIterator};
pub use record::OwnedRecord;
pub use stream::{
    AppendOptions, FileStream, IteratorOptions, ReadOptions, StreamOptions, timestamp_ms,
};
