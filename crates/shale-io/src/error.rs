//! File-level error taxonomy shared by every [`FileSystem`] implementation.
//!
//! [`FileSystem`]: crate::FileSystem

use std::io;

/// Errors reported by [`FileLike`] and [`FileSystem`] operations.
///
/// The storage layers map these onto their own error enums; see the KV and
/// stream crates for the fixed mapping tables.
///
/// [`FileLike`]: crate::FileLike
/// [`FileSystem`]: crate::FileSystem
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// A caller-supplied argument was out of range or malformed.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A read reached the end of the file before the requested range was
    /// satisfied.
    #[error("end of file")]
    EndOfFile,

    /// The operation was denied by the OS.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The named file does not exist.
    #[error("file does not exist: {0}")]
    FileDoesNotExist(String),

    /// The process hit its open-file limit.
    #[error("too many open files: {0}")]
    TooManyOpenFiles(String),

    /// The disk or quota is exhausted.
    #[error("disk full: {0}")]
    DiskFull(String),

    /// Any other I/O failure.
    #[error("i/o error: {0}")]
    IoError(String),

    /// An error the implementation could not classify.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<io::Error> for FileError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::PermissionDenied => FileError::AccessDenied(e.to_string()),
            io::ErrorKind::NotFound => FileError::FileDoesNotExist(e.to_string()),
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
                FileError::DiskFull(e.to_string())
            }
            io::ErrorKind::InvalidInput => FileError::InvalidArguments(e.to_string()),
            io::ErrorKind::UnexpectedEof => FileError::EndOfFile,
            _ => FileError::IoError(e.to_string()),
        }
    }
}
