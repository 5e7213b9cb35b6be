//! Recovery Tests
//!
//! Tests for crash images, checksum enforcement, best-effort recovery and
//! torn tails.

use crate::common::*;

fn find(bytes: &[u8], needle: &[u8]) -> usize {
    bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("needle present in log")
}

// ============================================================================
// Crash Images
// ============================================================================

#[test]
fn flushed_state_survives_a_crash() {
    let medium = MemoryMedium::new("spool.log");
    let db = opened(memory_db(&medium));
    let q = db.get_queue("q").unwrap();
    let r = q.push("kept").unwrap();
    db.flush().unwrap();
    let crashed = medium.snapshot();

    let db = opened(memory_db(&crashed));
    assert_eq!(
        db.get_queue("q").unwrap().get(r).unwrap(),
        Some(Value::from("kept"))
    );
}

#[test]
fn move_is_atomic_at_every_crash_point() {
    let medium = MemoryMedium::new("spool.log");
    let db = opened(memory_db(&medium));
    let source = db.get_queue("source").unwrap();
    let target = db.get_queue("target").unwrap();
    target.push("filler").unwrap();
    let r = source.push("job").unwrap();
    db.flush().unwrap();
    let pushed = medium.bytes().len();
    let moved = source.move_to(r, &target).unwrap().unwrap();
    db.flush().unwrap();
    let full = medium.bytes();
    assert!(full.len() > pushed);

    for cut in pushed..=full.len() {
        let crashed = MemoryMedium::with_bytes("spool.log", full[..cut].to_vec());
        let db = opened(memory_db(&crashed));
        let source = db.get_queue("source").unwrap();
        let target = db.get_queue("target").unwrap();
        let in_source = source.get(r).unwrap().is_some();
        let in_target = target.get(moved).unwrap().is_some();
        assert!(
            in_source != in_target,
            "cut at {}: in source {}, in target {}",
            cut,
            in_source,
            in_target
        );
        assert_eq!(source.size().unwrap() + target.size().unwrap(), 2);
        if cut == full.len() {
            assert!(in_target);
        }
    }
}

// ============================================================================
// Checksums
// ============================================================================

fn damaged_file_db() -> (TempDir, Database, Vec<QueueRef>) {
    let (dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    let refs = ["alpha", "bravo", "charlie"]
        .iter()
        .map(|s| q.push(*s).unwrap())
        .collect();
    db.close().unwrap();

    let path = log_path(&dir);
    let mut bytes = std::fs::read(&path).unwrap();
    let pos = find(&bytes, b"bravo");
    bytes[pos + 1] ^= 0x04;
    std::fs::write(&path, &bytes).unwrap();
    (dir, db, refs)
}

#[test]
fn flipped_byte_fails_strict_open() {
    let (_dir, db, _) = damaged_file_db();
    let err = db.open().unwrap_err();
    assert!(err.is_corruption(), "unexpected error: {}", err);
    assert!(!db.is_open());
}

#[test]
fn recover_skips_only_the_damaged_record() {
    let (_dir, db, refs) = damaged_file_db();
    let summary = db.recover().unwrap();
    assert!(summary.has_issues());
    assert_eq!(summary.damaged_frames, 1);

    let q = db.get_queue("q").unwrap();
    assert_eq!(q.get(refs[0]).unwrap(), Some(Value::from("alpha")));
    assert_eq!(q.get(refs[1]).unwrap(), None);
    assert_eq!(q.get(refs[2]).unwrap(), Some(Value::from("charlie")));
    db.close().unwrap();

    // The damage is compacted away.
    let summary = db.open().unwrap();
    assert!(!summary.has_issues());
    assert_eq!(queue_values(&db.get_queue("q").unwrap()).len(), 2);
}

#[test]
fn recover_tolerates_garbage_between_records() {
    let (dir, db) = file_db();
    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    idx.put("before", 1).unwrap();
    db.close().unwrap();

    let path = log_path(&dir);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend_from_slice(&[0x5E, 0x0F, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x13, 0x37]);
    std::fs::write(&path, &bytes).unwrap();

    db.open().unwrap_err();
    db.recover().unwrap();
    let idx = db.get_index("idx").unwrap();
    idx.put("after", 2).unwrap();
    db.close().unwrap();

    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    assert_eq!(idx.get("before").unwrap(), Some(Value::Int(1)));
    assert_eq!(idx.get("after").unwrap(), Some(Value::Int(2)));
}

/// Start of the frame whose payload contains `needle`
fn frame_containing(bytes: &[u8], needle: &[u8]) -> usize {
    let mut start = 0;
    loop {
        let len = u32::from_be_bytes(bytes[start + 2..start + 6].try_into().unwrap()) as usize;
        let end = start + 8 + len;
        if bytes[start + 8..end].windows(needle.len()).any(|w| w == needle) {
            return start;
        }
        start = end;
    }
}

fn overrun_length_db() -> (TempDir, Database, Vec<QueueRef>, Vec<u8>) {
    let (dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    let refs = ["alpha", "bravo", "charlie"]
        .iter()
        .map(|s| q.push(*s).unwrap())
        .collect();
    db.close().unwrap();

    let path = log_path(&dir);
    let mut bytes = std::fs::read(&path).unwrap();
    let alpha = frame_containing(&bytes, b"alpha");
    // Still under the record size limit, but far past the end of the log
    bytes[alpha + 3] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();
    (dir, db, refs, bytes)
}

#[test]
fn overrunning_length_fails_strict_open_and_keeps_the_log() {
    let (dir, db, _, damaged) = overrun_length_db();
    let err = db.open().unwrap_err();
    assert!(err.is_corruption(), "unexpected error: {}", err);
    assert!(!db.is_open());
    assert_eq!(std::fs::read(log_path(&dir)).unwrap(), damaged);
}

#[test]
fn recover_keeps_records_after_an_overrunning_length() {
    let (_dir, db, refs, _) = overrun_length_db();
    let summary = db.recover().unwrap();
    assert_eq!(summary.damaged_frames, 1);
    assert!(!summary.torn_tail);

    let q = db.get_queue("q").unwrap();
    assert_eq!(q.get(refs[0]).unwrap(), None);
    assert_eq!(q.get(refs[1]).unwrap(), Some(Value::from("bravo")));
    assert_eq!(q.get(refs[2]).unwrap(), Some(Value::from("charlie")));
    db.close().unwrap();

    let summary = db.open().unwrap();
    assert!(!summary.has_issues());
    assert_eq!(
        queue_values(&db.get_queue("q").unwrap()),
        vec![Value::from("bravo"), Value::from("charlie")]
    );
}

// ============================================================================
// Torn Tails
// ============================================================================

#[test]
fn torn_tail_is_cut_on_open() {
    let (dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    let kept = q.push("kept").unwrap();
    let torn = q.push("torn").unwrap();
    db.close().unwrap();

    let path = log_path(&dir);
    let len = std::fs::metadata(&path).unwrap().len();
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 3)
        .unwrap();

    let summary = db.open().unwrap();
    assert!(summary.torn_tail);
    let q = db.get_queue("q").unwrap();
    assert_eq!(q.get(kept).unwrap(), Some(Value::from("kept")));
    assert_eq!(q.get(torn).unwrap(), None);
    let again = q.push("again").unwrap();
    db.close().unwrap();

    let summary = db.open().unwrap();
    assert!(!summary.torn_tail);
    let q = db.get_queue("q").unwrap();
    assert_eq!(q.get(again).unwrap(), Some(Value::from("again")));
    assert_eq!(again, torn);
}
