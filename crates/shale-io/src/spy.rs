//! Error-injecting spy around a [`FileSystem`].
//!
//! Wraps a real implementation, records the operations performed on it, and
//! lets tests queue one-shot errors per operation. Files opened through the
//! spy share its queues, so file-level failures (`append`, `flush`, `read`,
//! `truncate`) can be injected the same way.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::{FileError, FileLike, FileSystem};

#[derive(Default)]
struct SpyState {
    operations: Mutex<Vec<String>>,
    open: Mutex<VecDeque<FileError>>,
    rename: Mutex<VecDeque<FileError>>,
    remove: Mutex<VecDeque<FileError>>,
    list: Mutex<VecDeque<FileError>>,
    read: Mutex<VecDeque<FileError>>,
    append: Mutex<VecDeque<FileError>>,
    flush: Mutex<VecDeque<FileError>>,
    truncate: Mutex<VecDeque<FileError>>,
}

impl SpyState {
    fn record(&self, operation: String) {
        self.operations.lock().expect("spy lock poisoned").push(operation);
    }

    fn take(queue: &Mutex<VecDeque<FileError>>) -> Option<FileError> {
        queue.lock().expect("spy lock poisoned").pop_front()
    }
}

/// A [`FileSystem`] wrapper that records calls and injects queued errors.
pub struct SpyFileSystem {
    inner: Box<dyn FileSystem>,
    state: Arc<SpyState>,
}

impl SpyFileSystem {
    /// Wraps `inner`, delegating every call that has no queued error.
    pub fn new(inner: impl FileSystem + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            state: Arc::new(SpyState::default()),
        }
    }

    /// Returns the operations performed so far, e.g. `"open m"`.
    pub fn operations(&self) -> Vec<String> {
        self.state.operations.lock().expect("spy lock poisoned").clone()
    }

    /// Queues an error for the next `open` call.
    pub fn fail_next_open(&self, err: FileError) {
        self.state.open.lock().expect("spy lock poisoned").push_back(err);
    }

    /// Queues an error for the next `rename` call.
    pub fn fail_next_rename(&self, err: FileError) {
        self.state.rename.lock().expect("spy lock poisoned").push_back(err);
    }

    /// Queues an error for the next `remove` call.
    pub fn fail_next_remove(&self, err: FileError) {
        self.state.remove.lock().expect("spy lock poisoned").push_back(err);
    }

    /// Queues an error for the next `list` call.
    pub fn fail_next_list(&self, err: FileError) {
        self.state.list.lock().expect("spy lock poisoned").push_back(err);
    }

    /// Queues an error for the next `read` on any file opened via this spy.
    pub fn fail_next_read(&self, err: FileError) {
        self.state.read.lock().expect("spy lock poisoned").push_back(err);
    }

    /// Queues an error for the next `append` on any file opened via this spy.
    pub fn fail_next_append(&self, err: FileError) {
        self.state.append.lock().expect("spy lock poisoned").push_back(err);
    }

    /// Queues an error for the next `flush` on any file opened via this spy.
    pub fn fail_next_flush(&self, err: FileError) {
        self.state.flush.lock().expect("spy lock poisoned").push_back(err);
    }

    /// Queues an error for the next `truncate` on any file opened via this spy.
    pub fn fail_next_truncate(&self, err: FileError) {
        self.state.truncate.lock().expect("spy lock poisoned").push_back(err);
    }
}

impl FileSystem for SpyFileSystem {
    fn open(&self, identifier: &str) -> Result<Box<dyn FileLike>, FileError> {
        self.state.record(format!("open {identifier}"));
        if let Some(err) = SpyState::take(&self.state.open) {
            return Err(err);
        }
        let inner = self.inner.open(identifier)?;
        Ok(Box::new(SpyFile {
            inner,
            state: self.state.clone(),
        }))
    }

    fn exists(&self, identifier: &str) -> bool {
        self.state.record(format!("exists {identifier}"));
        self.inner.exists(identifier)
    }

    fn rename(&self, old_id: &str, new_id: &str) -> Result<(), FileError> {
        self.state.record(format!("rename {old_id} {new_id}"));
        if let Some(err) = SpyState::take(&self.state.rename) {
            return Err(err);
        }
        self.inner.rename(old_id, new_id)
    }

    fn remove(&self, identifier: &str) -> Result<(), FileError> {
        self.state.record(format!("remove {identifier}"));
        if let Some(err) = SpyState::take(&self.state.remove) {
            return Err(err);
        }
        self.inner.remove(identifier)
    }

    fn list(&self) -> Result<Vec<String>, FileError> {
        self.state.record("list".to_string());
        if let Some(err) = SpyState::take(&self.state.list) {
            return Err(err);
        }
        self.inner.list()
    }
}

/// A [`FileLike`] opened through a [`SpyFileSystem`].
pub struct SpyFile {
    inner: Box<dyn FileLike>,
    state: Arc<SpyState>,
}

impl FileLike for SpyFile {
    fn read(&mut self, begin: u32, end: u32) -> Result<Bytes, FileError> {
        if let Some(err) = SpyState::take(&self.state.read) {
            return Err(err);
        }
        self.inner.read(begin, end)
    }

    fn append(&mut self, data: &[u8]) -> Result<(), FileError> {
        if let Some(err) = SpyState::take(&self.state.append) {
            return Err(err);
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> Result<(), FileError> {
        if let Some(err) = SpyState::take(&self.state.flush) {
            return Err(err);
        }
        self.inner.flush()
    }

    fn sync(&mut self) {
        self.inner.sync();
    }

    fn truncate(&mut self, length: u32) -> Result<(), FileError> {
        if let Some(err) = SpyState::take(&self.state.truncate) {
            return Err(err);
        }
        self.inner.truncate(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFileSystem;

    #[test]
    fn records_operations() {
        let spy = SpyFileSystem::new(MemoryFileSystem::new());
        spy.open("a").unwrap();
        spy.exists("a");
        spy.list().unwrap();
        assert_eq!(spy.operations(), vec!["open a", "exists a", "list"]);
    }

    #[test]
    fn injected_open_error_fires_once() {
        let spy = SpyFileSystem::new(MemoryFileSystem::new());
        spy.fail_next_open(FileError::AccessDenied("injected".to_string()));
        assert!(matches!(spy.open("a"), Err(FileError::AccessDenied(_))));
        assert!(spy.open("a").is_ok());
    }

    #[test]
    fn injected_append_error_reaches_open_files() {
        let spy = SpyFileSystem::new(MemoryFileSystem::new());
        let mut f = spy.open("a").unwrap();
        spy.fail_next_append(FileError::DiskFull("injected".to_string()));
        assert!(matches!(f.append(b"x"), Err(FileError::DiskFull(_))));
        f.append(b"x").unwrap();
    }

    #[test]
    fn delegates_after_queue_drains() {
        let spy = SpyFileSystem::new(MemoryFileSystem::new());
        spy.fail_next_list(FileError::IoError("injected".to_string()));
        assert!(spy.list().is_err());
        spy.open("seen").unwrap();
        assert_eq!(spy.list().unwrap(), vec!["seen".to_string()]);
    }
}
