//! Concurrency Tests
//!
//! Collections are shared across threads; close waits for in-flight
//! operations and later operations fail with state errors.

use crate::common::*;
use std::collections::HashSet;
use std::thread;

#[test]
fn concurrent_pushes_get_distinct_references() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();

    let refs: Vec<QueueRef> = thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let q = &q;
                s.spawn(move || {
                    (0..50)
                        .map(|i| q.push(t * 100 + i).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    let unique: HashSet<QueueRef> = refs.iter().copied().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(q.size().unwrap(), 200);
    db.close().unwrap();

    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    assert_eq!(q.size().unwrap(), 200);
    for r in &refs {
        assert!(q.exists(*r).unwrap());
    }
}

#[test]
fn crossed_moves_do_not_deadlock() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let a = db.get_queue("a").unwrap();
    let b = db.get_queue("b").unwrap();
    let a_refs: Vec<QueueRef> = (0..100).map(|i| a.push(i).unwrap()).collect();
    let b_refs: Vec<QueueRef> = (100..200).map(|i| b.push(i).unwrap()).collect();

    thread::scope(|s| {
        s.spawn(|| {
            for r in &a_refs {
                assert!(a.move_to(*r, &b).unwrap().is_some());
            }
        });
        s.spawn(|| {
            for r in &b_refs {
                assert!(b.move_to(*r, &a).unwrap().is_some());
            }
        });
    });

    assert_eq!(a.size().unwrap(), 100);
    assert_eq!(b.size().unwrap(), 100);
    db.close().unwrap();

    db.open().unwrap();
    let mut all: Vec<i64> = queue_values(&db.get_queue("a").unwrap())
        .into_iter()
        .chain(queue_values(&db.get_queue("b").unwrap()))
        .filter_map(|v| v.as_int())
        .collect();
    all.sort();
    assert_eq!(all, (0..200).collect::<Vec<_>>());
}

#[test]
fn concurrent_index_puts_are_all_kept() {
    let medium = MemoryMedium::new("spool.log");
    let db = opened(memory_db(&medium));
    let idx = db.get_index("idx").unwrap();

    thread::scope(|s| {
        for t in 0..4i64 {
            let idx = &idx;
            s.spawn(move || {
                for i in 0..100 {
                    idx.put(t * 1000 + i, t).unwrap();
                }
            });
        }
    });
    assert_eq!(idx.size().unwrap(), 400);
    db.close().unwrap();

    db.open().unwrap();
    assert_eq!(db.get_index("idx").unwrap().size().unwrap(), 400);
}

#[test]
fn close_during_operations_yields_state_errors() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();

    let pushed: u64 = thread::scope(|s| {
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let q = &q;
                s.spawn(move || {
                    let mut pushed = 0u64;
                    loop {
                        match q.push(pushed as i64) {
                            Ok(_) => pushed += 1,
                            Err(e) => {
                                assert!(e.is_state_error(), "unexpected error: {}", e);
                                return pushed;
                            }
                        }
                    }
                })
            })
            .collect();
        thread::sleep(std::time::Duration::from_millis(20));
        db.close().unwrap();
        workers.into_iter().map(|w| w.join().unwrap()).sum()
    });

    // Every acknowledged push made it into the closed log.
    db.open().unwrap();
    assert_eq!(db.get_queue("q").unwrap().size().unwrap(), pushed as usize);
}
