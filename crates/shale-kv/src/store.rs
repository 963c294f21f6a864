//! The append-only map file and its in-memory index.
//!
//! # Invariants
//!
//! - Every offset in the index points at a header whose magic byte is valid
//!   and whose CRC verifies against the bytes at that offset.
//! - `byte_position` equals the sum of all entry sizes applied since the
//!   last open or compaction; it only moves backwards through open-time
//!   truncation or compaction.
//! - After any successful mutating call, the on-disk file either contains
//!   the new entry in full or has been truncated back to `byte_position`,
//!   and the index matches whichever is true.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use shale_io::{FileLike, FileSystem, LogLevel, Logger, default_logger};

use crate::KvError;
use crate::entry::{
    ENTRY_HEADER_SIZE, EntryHeader, KEY_LENGTH_MAX, MAGIC_AND_VERSION, TOMBSTONE_FLAG,
    VALUE_LENGTH_MAX, entry_crc,
};

/// Configuration for [`Kv::open_or_create`].
pub struct KvOptions {
    /// Backing filesystem implementation.
    pub filesystem: Arc<dyn FileSystem>,
    /// Sink for recovery and compaction warnings.
    pub logger: Arc<dyn Logger>,
    /// Name of the map file. The shadow file used during compaction is this
    /// name with an `s` appended.
    pub identifier: String,
    /// Compaction threshold in reclaimable bytes. Zero or negative disables
    /// automatic compaction; a positive value compacts inline once the bytes
    /// recoverable by compaction exceed it.
    pub compact_after: i32,
    /// Verify every entry's CRC during the open-time scan, not just the
    /// header framing.
    pub full_corruption_check_on_open: bool,
}

impl KvOptions {
    /// Options with the default logger, no automatic compaction and the
    /// fast open-time scan.
    pub fn new(filesystem: Arc<dyn FileSystem>, identifier: impl Into<String>) -> Self {
        Self {
            filesystem,
            logger: default_logger(),
            identifier: identifier.into(),
            compact_after: 0,
            full_corruption_check_on_open: false,
        }
    }
}

/// Mutable state guarded by the store mutex.
struct KvInner {
    /// Active map file. `None` only transiently, while compaction swaps the
    /// shadow into place.
    file: Option<Box<dyn FileLike>>,
    /// (key, offset-of-header) pairs in insertion order; the last write for
    /// a key wins. Linear scan — expected key counts are small.
    index: Vec<(String, u32)>,
    /// Logical length of the active file.
    byte_position: u32,
    /// Bytes reclaimable by compaction (duplicates and tombstones) written
    /// since the last open or compaction.
    added_bytes: u32,
}

impl KvInner {
    fn file(&mut self) -> &mut dyn FileLike {
        self.file.as_deref_mut().expect("kv file is open")
    }
}

/// An embedded, crash-safe, append-only key–value store.
///
/// Every public operation is serialized by a per-instance mutex; different
/// instances are independent. See the crate docs for format and recovery
/// details.
pub struct Kv {
    filesystem: Arc<dyn FileSystem>,
    logger: Arc<dyn Logger>,
    identifier: String,
    shadow_name: String,
    compact_after: i32,
    full_corruption_check_on_open: bool,
    inner: Mutex<KvInner>,
}

impl std::fmt::Debug for Kv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kv")
            .field("identifier", &self.identifier)
            .field("shadow_name", &self.shadow_name)
            .field("compact_after", &self.compact_after)
            .field(
                "full_corruption_check_on_open",
                &self.full_corruption_check_on_open,
            )
            .finish_non_exhaustive()
    }
}

impl Kv {
    /// Opens the store, creating the map file if absent, and rebuilds the
    /// in-memory index by scanning it.
    ///
    /// Recovers from a crash during a previous compaction: a finished shadow
    /// with no main file is renamed into place; a stale shadow next to a
    /// main file is discarded. Any torn or corrupt tail is truncated away
    /// with a warning.
    pub fn open_or_create(options: KvOptions) -> Result<Kv, KvError> {
        if options.identifier.is_empty() {
            return Err(KvError::InvalidArguments(
                "Identifier cannot be empty".to_string(),
            ));
        }

        let shadow_name = format!("{}s", options.identifier);
        let kv = Kv {
            filesystem: options.filesystem,
            logger: options.logger,
            identifier: options.identifier,
            shadow_name,
            compact_after: options.compact_after,
            full_corruption_check_on_open: options.full_corruption_check_on_open,
            inner: Mutex::new(KvInner {
                file: None,
                index: Vec::new(),
                byte_position: 0,
                added_bytes: 0,
            }),
        };
        {
            let mut inner = kv.inner.lock().expect("kv lock poisoned");
            inner.file = Some(kv.open_file()?);
            kv.recover(&mut inner)?;
        }
        Ok(kv)
    }

    /// Returns the value most recently written for `key`.
    ///
    /// # Errors
    ///
    /// [`KvError::KeyNotFound`] if absent, [`KvError::HeaderCorrupted`] or
    /// [`KvError::DataCorrupted`] if the entry fails validation on disk.
    pub fn get(&self, key: &str) -> Result<Bytes, KvError> {
        let mut inner = self.inner.lock().expect("kv lock poisoned");
        let offset = inner
            .index
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|&(_, offset)| offset)
            .ok_or(KvError::KeyNotFound)?;
        let header = read_header_from(inner.file(), offset)?;
        read_value_from(inner.file(), offset, &header)
    }

    /// Writes `value` under `key`, overwriting any previous value.
    ///
    /// Either the new value is readable after this returns, or the file and
    /// index are exactly as they were before the call.
    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        if key.is_empty() {
            return Err(KvError::InvalidArguments("Key cannot be empty".to_string()));
        }
        if key.len() >= usize::from(KEY_LENGTH_MAX) {
            return Err(KvError::InvalidArguments(format!(
                "Key length cannot exceed {KEY_LENGTH_MAX}"
            )));
        }
        if value.len() >= VALUE_LENGTH_MAX as usize {
            return Err(KvError::InvalidArguments(format!(
                "Value length cannot exceed {VALUE_LENGTH_MAX}"
            )));
        }

        let mut inner = self.inner.lock().expect("kv lock poisoned");
        let inner = &mut *inner;
        self.write_entry(inner, key, value, 0)?;

        let written_at = inner.byte_position;
        let added_size = ENTRY_HEADER_SIZE + key.len() as u32 + value.len() as u32;
        match inner.index.iter().position(|(k, _)| k.as_str() == key) {
            Some(existing) => {
                inner.index[existing].1 = written_at;
                // The previous entry for this key is now dead weight that
                // compaction can reclaim. Brand-new keys don't count.
                inner.added_bytes += added_size;
            }
            None => inner.index.push((key.to_string(), written_at)),
        }
        inner.byte_position += added_size;

        self.maybe_compact(inner)
    }

    /// Removes `key`, persisting a tombstone so the removal survives reopen.
    pub fn remove(&self, key: &str) -> Result<(), KvError> {
        let mut inner = self.inner.lock().expect("kv lock poisoned");
        let position = inner
            .index
            .iter()
            .position(|(k, _)| k.as_str() == key)
            .ok_or(KvError::KeyNotFound)?;
        inner.index.remove(position);

        self.write_entry(&mut inner, key, b"", TOMBSTONE_FLAG)?;

        let added_size = ENTRY_HEADER_SIZE + key.len() as u32;
        inner.byte_position += added_size;
        inner.added_bytes += added_size;

        self.maybe_compact(&mut inner)
    }

    /// Returns a snapshot of the live keys in insertion order.
    pub fn list_keys(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("kv lock poisoned");
        inner.index.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Returns the logical length of the map file in bytes.
    pub fn current_size_bytes(&self) -> u32 {
        self.inner.lock().expect("kv lock poisoned").byte_position
    }

    /// Rewrites the map file to contain exactly one live entry per key, in
    /// index order, and resets the reclaimable-bytes counter.
    pub fn compact(&self) -> Result<(), KvError> {
        let mut inner = self.inner.lock().expect("kv lock poisoned");
        self.compact_locked(&mut inner)
    }

    /// Opens the map file, first resolving any leftover shadow from a
    /// crashed compaction.
    fn open_file(&self) -> Result<Box<dyn FileLike>, KvError> {
        if self.filesystem.exists(&self.identifier) {
            let _ = self.filesystem.remove(&self.shadow_name);
        } else if self.filesystem.exists(&self.shadow_name) {
            let _ = self.filesystem.rename(&self.shadow_name, &self.identifier);
        }

        self.filesystem
            .open(&self.identifier)
            .map_err(|e| KvError::ReadError(e.to_string()))
    }

    /// Scans the file from offset 0, rebuilding the index and truncating any
    /// torn or corrupt tail.
    fn recover(&self, inner: &mut KvInner) -> Result<(), KvError> {
        loop {
            let beginning = inner.byte_position;
            let header = match read_header_from(inner.file(), beginning) {
                Ok(header) => header,
                Err(KvError::EndOfFile) => {
                    // Less data at the tail than an entry header: everything
                    // before this point is known valid, everything after is
                    // gone.
                    let _ = inner.file().truncate(beginning);
                    return Ok(());
                }
                Err(e) => {
                    self.truncate_and_log(inner.file(), beginning, &e);
                    continue;
                }
            };

            let key = match read_key_from(inner.file(), beginning, header.key_length) {
                Ok(key) => key,
                Err(e) => {
                    self.truncate_and_log(inner.file(), beginning, &e);
                    continue;
                }
            };

            if self.full_corruption_check_on_open {
                if let Err(e) = read_value_from(inner.file(), beginning, &header) {
                    self.truncate_and_log(inner.file(), beginning, &e);
                    continue;
                }
            }

            let added_size = header.entry_size();
            if header.flags & TOMBSTONE_FLAG != 0 {
                if let Some(position) = inner.index.iter().position(|(k, _)| k.as_str() == key) {
                    inner.index.remove(position);
                }
                // A tombstone and whatever it shadows are both reclaimable.
                inner.added_bytes += added_size;
            } else {
                match inner.index.iter().position(|(k, _)| k.as_str() == key) {
                    Some(existing) => {
                        inner.index[existing].1 = beginning;
                        inner.added_bytes += added_size;
                    }
                    None => inner.index.push((key, beginning)),
                }
            }

            inner.byte_position += added_size;
        }
    }

    /// Appends a framed entry, flushing afterwards. Any failure truncates
    /// back to `byte_position` so the file shows no partial entry.
    fn write_entry(
        &self,
        inner: &mut KvInner,
        key: &str,
        value: &[u8],
        flags: u8,
    ) -> Result<(), KvError> {
        let header = EntryHeader::for_entry(flags, key, value);
        let encoded = header.encode();
        let rollback_to = inner.byte_position;
        let file = inner.file();

        for part in [&encoded[..], key.as_bytes(), value] {
            if part.is_empty() {
                continue;
            }
            if let Err(e) = file.append(part) {
                let _ = file.truncate(rollback_to);
                return Err(e.into());
            }
        }
        if let Err(e) = file.flush() {
            let _ = file.truncate(rollback_to);
            return Err(e.into());
        }
        Ok(())
    }

    fn maybe_compact(&self, inner: &mut KvInner) -> Result<(), KvError> {
        if self.compact_after > 0 && i64::from(inner.added_bytes) > i64::from(self.compact_after) {
            return self.compact_locked(inner);
        }
        Ok(())
    }

    fn compact_locked(&self, inner: &mut KvInner) -> Result<(), KvError> {
        // Remove any previous partially written shadow.
        let _ = self.filesystem.remove(&self.shadow_name);
        let mut shadow = self
            .filesystem
            .open(&self.shadow_name)
            .map_err(|e| KvError::WriteError(e.to_string()))?;

        let mut new_byte_position = 0u32;
        let mut new_index: Vec<(String, u32)> = Vec::with_capacity(inner.index.len());
        for entry_index in 0..inner.index.len() {
            let (key, old_offset) = inner.index[entry_index].clone();
            match copy_entry(inner.file(), old_offset, &key, shadow.as_mut()) {
                Ok(size) => {
                    new_index.push((key, new_byte_position));
                    new_byte_position += size;
                }
                Err(KvError::HeaderCorrupted(_) | KvError::DataCorrupted(_)) => {
                    self.logger.log(
                        LogLevel::Warning,
                        &format!(
                            "Encountered corruption during compaction. Key <{key}> will be dropped."
                        ),
                    );
                }
                Err(e) => {
                    drop(shadow);
                    let _ = self.filesystem.remove(&self.shadow_name);
                    return Err(KvError::WriteError(e.to_string()));
                }
            }
        }

        if let Err(e) = shadow.flush() {
            drop(shadow);
            let _ = self.filesystem.remove(&self.shadow_name);
            return Err(KvError::WriteError(e.to_string()));
        }
        shadow.sync();
        drop(shadow);

        // Close the active handle before the rename replaces the file under
        // it, then reopen the shadow as the new main file.
        inner.file = None;
        let _ = self.filesystem.rename(&self.shadow_name, &self.identifier);
        let main = self
            .filesystem
            .open(&self.identifier)
            .map_err(|e| KvError::ReadError(e.to_string()))?;
        inner.file = Some(main);

        inner.added_bytes = 0;
        inner.byte_position = new_byte_position;
        inner.index = new_index;

        Ok(())
    }

    fn truncate_and_log(&self, file: &mut dyn FileLike, truncate_to: u32, err: &KvError) {
        if self.logger.level() <= LogLevel::Warning {
            self.logger.log(
                LogLevel::Warning,
                &format!(
                    "Truncating {} to a length of {truncate_to} because {err}",
                    self.identifier
                ),
            );
        }
        let _ = file.truncate(truncate_to);
    }
}

/// Reads and validates the 12-byte header at `begin`.
fn read_header_from(file: &mut dyn FileLike, begin: u32) -> Result<EntryHeader, KvError> {
    let raw = file.read(begin, begin + ENTRY_HEADER_SIZE)?;
    let header = EntryHeader::decode(&raw);
    if header.magic_and_version != MAGIC_AND_VERSION {
        return Err(KvError::HeaderCorrupted(
            "Invalid magic and version".to_string(),
        ));
    }
    Ok(header)
}

/// Reads the key bytes of the entry at `begin`.
///
/// Keys are not checksummed; bytes that no longer form valid UTF-8 are
/// replaced rather than rejected.
fn read_key_from(file: &mut dyn FileLike, begin: u32, key_length: u16) -> Result<String, KvError> {
    let start = begin + ENTRY_HEADER_SIZE;
    let raw = file.read(start, start + u32::from(key_length))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Reads the value bytes of the entry at `begin` and verifies the CRC.
fn read_value_from(
    file: &mut dyn FileLike,
    begin: u32,
    header: &EntryHeader,
) -> Result<Bytes, KvError> {
    let start = begin + ENTRY_HEADER_SIZE + u32::from(header.key_length);
    let value = file.read(start, start + header.value_length)?;
    let crc = entry_crc(header.flags, header.key_length, header.value_length, &value);
    if crc != header.crc32 {
        return Err(KvError::DataCorrupted("CRC mismatch".to_string()));
    }
    Ok(value)
}

/// Copies the entry at `old_offset` to `shadow`, validating it on the way.
/// Returns the entry's on-disk size.
fn copy_entry(
    file: &mut dyn FileLike,
    old_offset: u32,
    key: &str,
    shadow: &mut dyn FileLike,
) -> Result<u32, KvError> {
    let header = read_header_from(file, old_offset)?;
    let value = read_value_from(file, old_offset, &header)?;

    shadow.append(&header.encode()).map_err(KvError::from)?;
    shadow.append(key.as_bytes()).map_err(KvError::from)?;
    if !value.is_empty() {
        shadow.append(&value).map_err(KvError::from)?;
    }
    Ok(header.entry_size())
}
