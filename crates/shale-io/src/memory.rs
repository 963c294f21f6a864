//! In-memory [`FileSystem`] implementation.
//!
//! Backs every file with a growable byte vector behind a shared map. Used as
//! the test fake and as a volatile store on hosts with no writable
//! filesystem. Open handles keep their buffer alive across `rename` and
//! `remove`, matching POSIX file-descriptor semantics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::{FileError, FileLike, FileSystem};

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// An in-memory filesystem fake. Cloning shares the underlying files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Arc<Mutex<HashMap<String, SharedBuffer>>>,
}

impl MemoryFileSystem {
    /// Creates an empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, identifier: &str) -> Result<Box<dyn FileLike>, FileError> {
        let mut files = self.files.lock().expect("memory fs lock poisoned");
        let buffer = files
            .entry(identifier.to_string())
            .or_default()
            .clone();
        Ok(Box::new(MemoryFile { buffer }))
    }

    fn exists(&self, identifier: &str) -> bool {
        self.files
            .lock()
            .expect("memory fs lock poisoned")
            .contains_key(identifier)
    }

    fn rename(&self, old_id: &str, new_id: &str) -> Result<(), FileError> {
        let mut files = self.files.lock().expect("memory fs lock poisoned");
        match files.remove(old_id) {
            Some(buffer) => {
                files.insert(new_id.to_string(), buffer);
                Ok(())
            }
            None => Err(FileError::FileDoesNotExist(old_id.to_string())),
        }
    }

    fn remove(&self, identifier: &str) -> Result<(), FileError> {
        let mut files = self.files.lock().expect("memory fs lock poisoned");
        files.remove(identifier);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, FileError> {
        let files = self.files.lock().expect("memory fs lock poisoned");
        Ok(files.keys().cloned().collect())
    }
}

struct MemoryFile {
    buffer: SharedBuffer,
}

impl FileLike for MemoryFile {
    fn read(&mut self, begin: u32, end: u32) -> Result<Bytes, FileError> {
        if end < begin {
            return Err(FileError::InvalidArguments(
                "read end must not precede begin".to_string(),
            ));
        }
        if end == begin {
            return Ok(Bytes::new());
        }
        let data = self.buffer.lock().expect("memory file lock poisoned");
        if (end as usize) > data.len() {
            return Err(FileError::EndOfFile);
        }
        Ok(Bytes::copy_from_slice(&data[begin as usize..end as usize]))
    }

    fn append(&mut self, data: &[u8]) -> Result<(), FileError> {
        let mut buffer = self.buffer.lock().expect("memory file lock poisoned");
        buffer.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FileError> {
        Ok(())
    }

    fn sync(&mut self) {}

    fn truncate(&mut self, length: u32) -> Result<(), FileError> {
        let mut buffer = self.buffer.lock().expect("memory file lock poisoned");
        buffer.resize(length as usize, 0);
        Ok(())
    }
}
