//! Index Tests
//!
//! Tests for index semantics and durability through the facade.

use crate::common::*;
use std::collections::HashMap;

// ============================================================================
// Basic Operations
// ============================================================================

#[test]
fn put_overwrite_remove_and_reopen_scenario() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    idx.put("k", "v1").unwrap();
    idx.put("k", "v2").unwrap();
    assert_eq!(idx.get("k").unwrap(), Some(Value::from("v2")));
    assert_eq!(idx.remove("k").unwrap(), Some(Value::from("v2")));
    assert_eq!(idx.get("k").unwrap(), None);
    db.close().unwrap();

    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    assert!(idx.is_empty().unwrap());
    assert_eq!(idx.get("k").unwrap(), None);
}

#[test]
fn structured_keys_and_values_survive_reopen() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    let key = Value::Array(vec![Value::from("tenant"), Value::Int(4)]);
    let value = Value::Object(HashMap::from([
        ("name".to_string(), Value::from("ada")),
        ("score".to_string(), Value::Float(1.5)),
    ]));
    idx.put(key.clone(), value.clone()).unwrap();
    db.close().unwrap();

    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    assert_eq!(idx.get(key).unwrap(), Some(value));
}

#[test]
fn clear_survives_reopen() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    for i in 0..5 {
        idx.put(i, i).unwrap();
    }
    idx.clear().unwrap();
    idx.put("after", true).unwrap();
    db.close().unwrap();

    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    assert_eq!(
        index_entries(&idx),
        vec![(Value::from("after"), Value::Bool(true))]
    );
}

#[test]
fn null_is_rejected_and_nothing_is_logged() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    db.flush().unwrap();
    let before = db.log_stats().unwrap().records_written;
    assert!(matches!(idx.put(Value::Null, 1), Err(Error::InvalidInput(_))));
    assert!(matches!(idx.put(1, Value::Null), Err(Error::InvalidInput(_))));
    assert_eq!(db.log_stats().unwrap().records_written, before);
}

// ============================================================================
// Fail-fast Iteration
// ============================================================================

#[test]
fn iterator_fails_fast_on_foreign_removal() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    for i in 0..4 {
        idx.put(i, i).unwrap();
    }
    let mut iter = idx.iter().unwrap();
    let (first, _) = iter.next().unwrap().unwrap();
    idx.remove(first.clone()).unwrap();
    assert!(matches!(iter.next(), Some(Err(Error::ConcurrentModification))));
    assert_eq!(idx.size().unwrap(), 3);
    assert!(!idx.contains_key(first).unwrap());
}

#[test]
fn iterator_removal_is_durable() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    for i in 0..8 {
        idx.put(i, i * i).unwrap();
    }
    let mut iter = idx.iter().unwrap();
    while let Some(entry) = iter.next() {
        let (key, _) = entry.unwrap();
        if key.as_int().is_some_and(|n| n >= 4) {
            assert!(iter.remove().unwrap().is_some());
        }
    }
    db.close().unwrap();

    db.open().unwrap();
    let idx = db.get_index("idx").unwrap();
    let keys: Vec<i64> = {
        let mut keys: Vec<i64> = idx
            .keys()
            .unwrap()
            .iter()
            .filter_map(Value::as_int)
            .collect();
        keys.sort();
        keys
    };
    assert_eq!(keys, vec![0, 1, 2, 3]);
    assert_eq!(idx.get(3).unwrap(), Some(Value::Int(9)));
}
