//! POSIX [`FileSystem`] implementation over `std::fs`.
//!
//! All identifiers resolve inside a base directory created at construction.
//! Files are opened in append mode; reads use positional `read_at` so the
//! append cursor is never disturbed.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use bytes::Bytes;

use crate::{FileError, FileLike, FileSystem};

/// A [`FileSystem`] rooted at a directory on a POSIX host.
#[derive(Debug)]
pub struct PosixFileSystem {
    base_path: PathBuf,
}

impl PosixFileSystem {
    /// Creates the base directory (and parents) if needed and returns the
    /// filesystem rooted there.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, FileError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn path_of(&self, identifier: &str) -> PathBuf {
        self.base_path.join(identifier)
    }
}

impl FileSystem for PosixFileSystem {
    fn open(&self, identifier: &str) -> Result<Box<dyn FileLike>, FileError> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(self.path_of(identifier))?;
        Ok(Box::new(PosixFile { file }))
    }

    fn exists(&self, identifier: &str) -> bool {
        self.path_of(identifier).exists()
    }

    fn rename(&self, old_id: &str, new_id: &str) -> Result<(), FileError> {
        fs::rename(self.path_of(old_id), self.path_of(new_id))?;
        Ok(())
    }

    fn remove(&self, identifier: &str) -> Result<(), FileError> {
        match fs::remove_file(self.path_of(identifier)) {
            Ok(()) => Ok(()),
            // Removing an absent file is a no-op, as with std::filesystem.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>, FileError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

struct PosixFile {
    file: File,
}

impl FileLike for PosixFile {
    fn read(&mut self, begin: u32, end: u32) -> Result<Bytes, FileError> {
        if end < begin {
            return Err(FileError::InvalidArguments(
                "read end must not precede begin".to_string(),
            ));
        }
        if end == begin {
            return Ok(Bytes::new());
        }
        let mut buf = vec![0u8; (end - begin) as usize];
        let mut filled = 0usize;
        while filled < buf.len() {
            let offset = u64::from(begin) + filled as u64;
            let n = self.file.read_at(&mut buf[filled..], offset)?;
            if n == 0 {
                return Err(FileError::EndOfFile);
            }
            filled += n;
        }
        Ok(Bytes::from(buf))
    }

    fn append(&mut self, data: &[u8]) -> Result<(), FileError> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FileError> {
        self.file.flush()?;
        Ok(())
    }

    fn sync(&mut self) {
        // fdatasync where available; there is nothing useful to do on failure.
        let _ = self.file.sync_data();
    }

    fn truncate(&mut self, length: u32) -> Result<(), FileError> {
        self.file.set_len(u64::from(length))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = PosixFileSystem::new(dir.path()).unwrap();
        let mut f = fs.open("data").unwrap();
        f.append(b"hello world").unwrap();
        f.flush().unwrap();
        assert_eq!(&f.read(0, 5).unwrap()[..], b"hello");
        assert_eq!(&f.read(6, 11).unwrap()[..], b"world");
        assert!(matches!(f.read(0, 12), Err(FileError::EndOfFile)));
    }

    #[test]
    fn reopen_appends_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let fs = PosixFileSystem::new(dir.path()).unwrap();
        fs.open("data").unwrap().append(b"hello").unwrap();
        let mut f = fs.open("data").unwrap();
        f.append(b" world").unwrap();
        assert_eq!(&f.read(0, 11).unwrap()[..], b"hello world");
    }

    #[test]
    fn truncate_then_eof() {
        let dir = tempfile::tempdir().unwrap();
        let fs = PosixFileSystem::new(dir.path()).unwrap();
        let mut f = fs.open("data").unwrap();
        f.append(b"abcdef").unwrap();
        f.truncate(2).unwrap();
        assert_eq!(&f.read(0, 2).unwrap()[..], b"ab");
        assert!(matches!(f.read(0, 3), Err(FileError::EndOfFile)));
    }

    #[test]
    fn rename_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let fs = PosixFileSystem::new(dir.path()).unwrap();
        fs.open("a").unwrap().append(b"x").unwrap();
        fs.rename("a", "b").unwrap();
        assert!(!fs.exists("a"));
        assert!(fs.exists("b"));
        fs.remove("b").unwrap();
        assert!(!fs.exists("b"));
        // removing again is fine
        fs.remove("b").unwrap();
    }

    #[test]
    fn list_sees_created_files() {
        let dir = tempfile::tempdir().unwrap();
        let fs = PosixFileSystem::new(dir.path()).unwrap();
        fs.open("one").unwrap();
        fs.open("two").unwrap();
        let mut names = fs.list().unwrap();
        names.sort();
        assert_eq!(names, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn unwritable_base_is_an_error() {
        let err = PosixFileSystem::new("/proc/shale-does-not-exist/x");
        assert!(err.is_err());
    }
}
