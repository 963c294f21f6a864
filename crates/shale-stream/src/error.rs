//! Stream error taxonomy and the fixed mappings from file and KV errors.

use shale_io::FileError;
use shale_kv::KvError;

/// Errors returned by [`FileStream`] operations.
///
/// [`FileStream`]: crate::FileStream
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No record with the requested sequence number is available.
    #[error("record not found")]
    RecordNotFound,

    /// A record's payload failed its CRC check.
    #[error("record data corrupted")]
    RecordDataCorrupted,

    /// A record header failed validation (bad magic word).
    #[error("record header corrupted")]
    HeaderDataCorrupted,

    /// The payload is larger than the stream could ever hold.
    #[error("record too large")]
    RecordTooLarge,

    /// Reading from a segment or checkpoint store failed.
    #[error("read error: {0}")]
    ReadError(String),

    /// Writing to a segment or checkpoint store failed.
    #[error("write error: {0}")]
    WriteError(String),

    /// The stream behind a cursor or record has been dropped.
    #[error("stream closed: {0}")]
    StreamClosed(String),

    /// A caller-supplied argument was rejected.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The disk is full.
    #[error("disk full: {0}")]
    DiskFull(String),

    /// No iterator with the given identifier is known to the stream.
    #[error("iterator not found")]
    IteratorNotFound,

    /// The stream is at its size cap and eviction was not permitted.
    #[error("stream full")]
    StreamFull,

    /// An unclassified failure.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<KvError> for StreamError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::InvalidArguments(msg) => StreamError::InvalidArguments(msg),
            KvError::ReadError(msg) => StreamError::ReadError(msg),
            KvError::DiskFull(msg) => StreamError::DiskFull(msg),
            other => StreamError::WriteError(other.to_string()),
        }
    }
}

impl From<FileError> for StreamError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::DiskFull(msg) => StreamError::DiskFull(msg),
            other => StreamError::ReadError(other.to_string()),
        }
    }
}
