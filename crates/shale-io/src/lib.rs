//! # shale-io: filesystem abstraction for Shale storage
//!
//! This crate provides the capability interfaces the storage primitives are
//! written against, so host code can swap the backing store:
//!
//! - **[`PosixFileSystem`]** (default): buffered `std::fs` I/O rooted at a
//!   base directory
//! - **[`MemoryFileSystem`]**: an in-memory implementation, usable as a test
//!   fake or as a volatile store on hosts without persistent storage
//! - **[`SpyFileSystem`]**: a wrapper that records operations and injects
//!   one-shot errors, for exercising failure paths in tests
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────┐
//! │     shale-kv / shale-stream   │
//! │ (use FileSystem + FileLike)   │
//! └──────────────┬────────────────┘
//!                │
//! ┌──────────────┴────────────────┐
//! │           shale-io            │
//! │  ┌───────┐ ┌────────┐ ┌─────┐ │
//! │  │ Posix │ │ Memory │ │ Spy │ │
//! │  └───────┘ └────────┘ └─────┘ │
//! └───────────────────────────────┘
//! ```
//!
//! The crate also carries the levelled [`Logger`] adapter the storage layers
//! report recovery events through; the default sink forwards to `tracing`.

mod error;
mod file;
mod logging;
mod memory;
#[cfg(unix)]
mod posix;
mod spy;

pub use error::FileError;
pub use file::{FileLike, FileSystem};
pub use logging::{LogLevel, Logger, TracingLogger, default_logger};
pub use memory::MemoryFileSystem;
#[cfg(unix)]
pub use posix::PosixFileSystem;
pub use spy::{SpyFile, SpyFileSystem};
