//! # Shale
//!
//! Embedded, file-backed persistence primitives for edge and IoT devices.
//!
//! Shale provides two building blocks that run in-process, hold modest
//! working sets, and survive crashes and partial writes:
//!
//! - **[`Kv`]** — a log-structured, append-only key–value store with
//!   per-entry checksums and whole-file shadow compaction
//! - **[`FileStream`]** — a segmented append-only record stream with
//!   monotonic sequence numbers, size- and time-based retention, and named
//!   [persistent iterators](FileStream::open_or_create_iterator) whose
//!   checkpoints live in an embedded [`Kv`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                        Shale                        │
//! │  ┌────────────┐      ┌─────────────┐                │
//! │  │ FileStream │ ───→ │     Kv      │  (checkpoints) │
//! │  │ (segments) │      │ (append map)│                │
//! │  └─────┬──────┘      └──────┬──────┘                │
//! │        └────────┬───────────┘                       │
//! │          ┌──────┴──────┐     ┌──────────┐           │
//! │          │  shale-io   │     │ checksum │           │
//! │          │ (FileSystem)│     │ (CRC-32) │           │
//! │          └─────────────┘     └──────────┘           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Both primitives are written against the [`FileSystem`] capability trait,
//! so the backing store is swappable: [`PosixFileSystem`] in production,
//! [`MemoryFileSystem`] for tests or diskless hosts, [`SpyFileSystem`] to
//! inject faults.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use shale::{
//!     AppendOptions, FileStream, IteratorOptions, MemoryFileSystem, StreamOptions,
//! };
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! let stream = FileStream::open_or_create(StreamOptions::new(fs)).unwrap();
//!
//! stream.append(b"reading 1", &AppendOptions::default()).unwrap();
//! stream.append(b"reading 2", &AppendOptions::default()).unwrap();
//!
//! let mut uploader = stream.open_or_create_iterator("uploader", IteratorOptions::default());
//! while let Ok(record) = uploader.read() {
//!     // ship record.data somewhere, then:
//!     record.checkpoint().unwrap();
//!     uploader.advance();
//! }
//! ```

pub use shale_checksum::{Crc32, crc32, crc32_of};
pub use shale_io::{
    FileError, FileLike, FileSystem, LogLevel, Logger, MemoryFileSystem, SpyFile, SpyFileSystem,
    TracingLogger, default_logger,
};
#[cfg(unix)]
pub use shale_io::PosixFileSystem;
pub use shale_kv::{Kv, KvError, KvOptions};
pub use shale_stream::{
    AppendOptions, CheckpointableRecord, FileStream, IteratorOptions, OwnedRecord, ReadOptions,
    StreamError, StreamIterator, StreamOptions, timestamp_ms,
};
