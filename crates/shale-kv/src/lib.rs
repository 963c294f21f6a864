//! # shale-kv: log-structured key–value store
//!
//! An embedded, append-only, file-backed map for small working sets on edge
//! devices. Every write appends a checksummed entry to a single log file; an
//! in-memory index maps each key to the offset of its most recent entry.
//! Removals append tombstones. Space is reclaimed by whole-file shadow
//! compaction with an atomic rename as the commit point.
//!
//! # On-disk format
//!
//! Entries are written back-to-back with no padding:
//!
//! ```text
//! [magic:u8][flags:u8][key_len:u16][crc32:u32][value_len:u32][key][value]
//!     1B        1B         2B          4B          4B
//! ```
//!
//! Integers are host-endian; the file is not portable across differently-
//! endian hosts. The CRC covers `[flags, key_len, value_len, value]`.
//!
//! # Crash safety
//!
//! - A torn append is detected on open (bad magic, short read, or CRC
//!   mismatch with the full check enabled) and truncated away; everything
//!   before it is preserved.
//! - A crash during compaction leaves either the original file, or both the
//!   original and the shadow (shadow is discarded), or only the finished
//!   shadow (renamed into place on the next open).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use shale_io::MemoryFileSystem;
//! use shale_kv::{Kv, KvOptions};
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! let kv = Kv::open_or_create(KvOptions::new(fs, "m")).unwrap();
//! kv.put("key", b"value").unwrap();
//! assert_eq!(&kv.get("key").unwrap()[..], b"value");
//! ```

mod entry;
mod error;
mod store;

pub use error::KvError;
pub use store::{Kv, KvOptions};
