//! The file and filesystem capability traits.
//!
//! The storage layers never touch `std::fs` directly; they operate on these
//! traits so that hosts can substitute their own backing store and tests can
//! substitute fakes and spies.

use bytes::Bytes;

use crate::FileError;

/// An open file handle supporting ranged reads and appends.
///
/// Offsets and lengths are 32-bit: the storage layers bound individual files
/// well below 4 GiB by design (segments roll over, the KV map compacts).
///
/// # Contract
///
/// - `read` returns exactly `end - begin` bytes or [`FileError::EndOfFile`];
///   `end < begin` fails with [`FileError::InvalidArguments`] and
///   `end == begin` returns an empty buffer.
/// - `append` writes at the end of the file. A partial write must be
///   reported as a full error; callers recover by truncating.
/// - `sync` is best-effort and infallible: it asks the OS to persist to
///   stable storage but has no way to act on failure.
pub trait FileLike: Send {
    /// Reads the byte range `begin..end`.
    fn read(&mut self, begin: u32, end: u32) -> Result<Bytes, FileError>;

    /// Appends `data` at the end of the file.
    fn append(&mut self, data: &[u8]) -> Result<(), FileError>;

    /// Pushes userspace buffers to the OS.
    fn flush(&mut self) -> Result<(), FileError>;

    /// Asks the OS to persist the file to stable storage. Best-effort.
    fn sync(&mut self);

    /// Sets the file length to `length` bytes.
    fn truncate(&mut self, length: u32) -> Result<(), FileError>;
}

/// A namespace of files addressed by flat string identifiers.
///
/// Identifiers are plain names, not paths; implementations decide where the
/// bytes live. `rename` must be atomic where the platform allows it (it is
/// the commit point of KV compaction).
pub trait FileSystem: Send + Sync {
    /// Opens the named file for read/append, creating it if absent.
    fn open(&self, identifier: &str) -> Result<Box<dyn FileLike>, FileError>;

    /// Returns whether the named file exists.
    fn exists(&self, identifier: &str) -> bool;

    /// Atomically renames `old_id` to `new_id`, replacing any existing file.
    fn rename(&self, old_id: &str, new_id: &str) -> Result<(), FileError>;

    /// Removes the named file. Removing a missing file is not an error.
    fn remove(&self, identifier: &str) -> Result<(), FileError>;

    /// Lists the identifiers currently present.
    fn list(&self) -> Result<Vec<String>, FileError>;
}
