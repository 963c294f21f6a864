//! End-to-end KV store scenarios on a real filesystem.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use shale::{FileSystem, Kv, KvError, KvOptions, PosixFileSystem};

fn posix(dir: &Path) -> Arc<dyn FileSystem> {
    Arc::new(PosixFileSystem::new(dir).unwrap())
}

fn open(dir: &Path) -> Kv {
    Kv::open_or_create(KvOptions::new(posix(dir), "m")).unwrap()
}

fn open_full_check(dir: &Path) -> Kv {
    let mut options = KvOptions::new(posix(dir), "m");
    options.full_corruption_check_on_open = true;
    Kv::open_or_create(options).unwrap()
}

#[test]
fn happy_path_survives_compaction_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let kv = open(dir.path());

    kv.put("key", b"value").unwrap();
    assert_eq!(kv.list_keys(), vec!["key".to_string()]);
    assert_eq!(&kv.get("key").unwrap()[..], b"value");

    kv.compact().unwrap();
    assert_eq!(&kv.get("key").unwrap()[..], b"value");
    drop(kv);

    let kv = open(dir.path());
    assert_eq!(&kv.get("key").unwrap()[..], b"value");
}

#[test]
fn argument_validation() {
    let dir = tempfile::tempdir().unwrap();
    let kv = open(dir.path());

    let err = kv.put("", b"x").unwrap_err();
    assert!(matches!(&err, KvError::InvalidArguments(msg) if msg.contains("empty")), "{err}");

    let err = kv.put(&"k".repeat(65535), b"x").unwrap_err();
    assert!(matches!(&err, KvError::InvalidArguments(msg) if msg.contains("Key length")), "{err}");

    let huge = vec![0u8; 2_147_483_647];
    let err = kv.put("a", &huge).unwrap_err();
    assert!(
        matches!(&err, KvError::InvalidArguments(msg) if msg.contains("Value length")),
        "{err}"
    );
}

#[test]
fn truncated_shadow_is_adopted_after_compaction_crash() {
    let dir = tempfile::tempdir().unwrap();
    let kv = open(dir.path());
    for _ in 0..100 {
        kv.put("a", b"123456789").unwrap();
    }
    drop(kv);

    // Simulate a crash mid-compaction: the main file vanished and only a
    // partially valid shadow remains.
    let main = dir.path().join("m");
    let file = fs::OpenOptions::new().write(true).open(&main).unwrap();
    file.set_len(150).unwrap();
    drop(file);
    fs::rename(&main, dir.path().join("ms")).unwrap();

    let kv = open(dir.path());
    assert!(kv.list_keys().contains(&"a".to_string()));
}

#[test]
fn value_corruption_mid_file() {
    let dir = tempfile::tempdir().unwrap();
    let kv = open(dir.path());
    let mut offsets = Vec::new();
    for i in 1..=10 {
        offsets.push(kv.current_size_bytes() as usize);
        kv.put(&format!("key{i}"), b"0123456789").unwrap();
    }
    drop(kv);

    // Overwrite bytes in the 9th entry's value region
    // (12-byte header + 4-byte key "key9").
    let path = dir.path().join("m");
    let mut bytes = fs::read(&path).unwrap();
    let value_start = offsets[8] + 12 + 4;
    for b in &mut bytes[value_start..value_start + 4] {
        *b ^= 0xFF;
    }
    fs::write(&path, &bytes).unwrap();

    let kv = open(dir.path());
    assert!(matches!(kv.get("key9"), Err(KvError::DataCorrupted(_))));
    assert_eq!(&kv.get("key8").unwrap()[..], b"0123456789");
    drop(kv);

    // Reopening with the full check truncates entries 9..10 away.
    let kv = open_full_check(dir.path());
    let keys = kv.list_keys();
    for i in 1..=8 {
        assert!(keys.contains(&format!("key{i}")));
        assert_eq!(&kv.get(&format!("key{i}")).unwrap()[..], b"0123456789");
    }
    assert!(matches!(kv.get("key9"), Err(KvError::KeyNotFound)));
    assert!(matches!(kv.get("key10"), Err(KvError::KeyNotFound)));
}

#[test]
fn header_corruption_mid_file() {
    let dir = tempfile::tempdir().unwrap();
    let kv = open(dir.path());
    let mut offsets = Vec::new();
    for i in 1..=10 {
        offsets.push(kv.current_size_bytes() as usize);
        kv.put(&format!("key{i}"), b"0123456789").unwrap();
    }

    // Flip the magic byte of entry 9. The open store notices on get.
    let path = dir.path().join("m");
    let mut bytes = fs::read(&path).unwrap();
    bytes[offsets[8]] = 0x00;
    fs::write(&path, &bytes).unwrap();
    assert!(matches!(kv.get("key9"), Err(KvError::HeaderCorrupted(_))));
    drop(kv);

    // Any reopen truncates from the bad header on.
    let kv = open(dir.path());
    let keys = kv.list_keys();
    assert_eq!(keys.len(), 8);
    assert!(!keys.contains(&"key9".to_string()));
    assert!(!keys.contains(&"key10".to_string()));
    assert_eq!(&kv.get("key8").unwrap()[..], b"0123456789");
}

#[test]
fn compaction_drops_corrupted_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let kv = open(dir.path());
    kv.put("a", b"stale-a").unwrap();
    kv.put("b", b"stale-b").unwrap();
    let a_live = kv.current_size_bytes() as usize;
    kv.put("a", b"fresh-a").unwrap();
    kv.put("b", b"fresh-b").unwrap();

    // Corrupt the header of the live entry for "a", then compact: the store
    // drops the key it can no longer read and keeps the rest.
    let path = dir.path().join("m");
    let mut bytes = fs::read(&path).unwrap();
    bytes[a_live] = 0x00;
    fs::write(&path, &bytes).unwrap();
    kv.compact().unwrap();

    assert!(matches!(kv.get("a"), Err(KvError::KeyNotFound)));
    assert_eq!(&kv.get("b").unwrap()[..], b"fresh-b");

    // The compacted state is what persists.
    drop(kv);
    let kv = open(dir.path());
    assert_eq!(kv.list_keys(), vec!["b".to_string()]);
    assert_eq!(&kv.get("b").unwrap()[..], b"fresh-b");
}

#[test]
fn durability_roundtrip_over_mixed_operations() {
    let dir = tempfile::tempdir().unwrap();
    let kv = open(dir.path());
    for i in 0..20 {
        kv.put(&format!("key{i}"), format!("v{i}").as_bytes()).unwrap();
    }
    for i in (0..20).step_by(3) {
        kv.remove(&format!("key{i}")).unwrap();
    }
    for i in (0..20).step_by(4) {
        kv.put(&format!("key{i}"), format!("again{i}").as_bytes()).unwrap();
    }
    let mut expected = kv.list_keys();
    expected.sort();
    drop(kv);

    let kv = open(dir.path());
    let mut keys = kv.list_keys();
    keys.sort();
    assert_eq!(keys, expected);
    for key in &keys {
        let i: u32 = key.trim_start_matches("key").parse().unwrap();
        let expected_value = if i % 4 == 0 {
            format!("again{i}")
        } else {
            format!("v{i}")
        };
        assert_eq!(&kv.get(key).unwrap()[..], expected_value.as_bytes());
    }
}
