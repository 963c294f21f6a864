//! KV error taxonomy and the fixed mapping from file errors.

use shale_io::FileError;

/// Errors returned by [`Kv`] operations.
///
/// [`Kv`]: crate::Kv
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The key is not present in the store.
    #[error("key not found")]
    KeyNotFound,

    /// Reading from the backing file failed.
    #[error("read error: {0}")]
    ReadError(String),

    /// Writing to the backing file failed.
    #[error("write error: {0}")]
    WriteError(String),

    /// An entry header failed validation (bad magic byte).
    #[error("header corrupted: {0}")]
    HeaderCorrupted(String),

    /// An entry's value failed its CRC check.
    #[error("data corrupted: {0}")]
    DataCorrupted(String),

    /// The backing file ended before the requested range.
    #[error("end of file")]
    EndOfFile,

    /// A caller-supplied argument was rejected.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The disk is full.
    #[error("disk full: {0}")]
    DiskFull(String),

    /// An unclassified failure.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<FileError> for KvError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::EndOfFile => KvError::EndOfFile,
            FileError::InvalidArguments(msg) => KvError::InvalidArguments(msg),
            FileError::AccessDenied(msg) | FileError::TooManyOpenFiles(msg) => {
                KvError::WriteError(msg)
            }
            FileError::DiskFull(msg) => KvError::DiskFull(msg),
            FileError::FileDoesNotExist(msg)
            | FileError::IoError(msg)
            | FileError::Unknown(msg) => KvError::ReadError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_errors_map_per_table() {
        assert!(matches!(KvError::from(FileError::EndOfFile), KvError::EndOfFile));
        assert!(matches!(
            KvError::from(FileError::InvalidArguments(String::new())),
            KvError::InvalidArguments(_)
        ));
        assert!(matches!(
            KvError::from(FileError::AccessDenied(String::new())),
            KvError::WriteError(_)
        ));
        assert!(matches!(
            KvError::from(FileError::TooManyOpenFiles(String::new())),
            KvError::WriteError(_)
        ));
        assert!(matches!(
            KvError::from(FileError::DiskFull(String::new())),
            KvError::DiskFull(_)
        ));
        assert!(matches!(
            KvError::from(FileError::FileDoesNotExist(String::new())),
            KvError::ReadError(_)
        ));
        assert!(matches!(
            KvError::from(FileError::IoError(String::new())),
            KvError::ReadError(_)
        ));
        assert!(matches!(
            KvError::from(FileError::Unknown(String::new())),
            KvError::ReadError(_)
        ));
    }
}
