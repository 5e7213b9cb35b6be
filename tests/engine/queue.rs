//! Queue Tests
//!
//! Tests for queue semantics through the facade: references, reclamation,
//! moves and iteration, on file-backed databases.

use crate::common::*;

// ============================================================================
// Basic Operations
// ============================================================================

#[test]
fn push_remove_and_reopen_scenario() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    let ref1 = q.push("a").unwrap();
    let ref2 = q.push("b").unwrap();
    assert_eq!(q.get(ref1).unwrap(), Some(Value::from("a")));
    q.remove(ref1).unwrap();
    assert!(!q.exists(ref1).unwrap());
    assert_eq!(q.size().unwrap(), 1);
    db.close().unwrap();

    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    assert_eq!(q.size().unwrap(), 1);
    assert_eq!(queue_values(&q), vec![Value::from("b")]);
    assert_eq!(q.get(ref2).unwrap(), Some(Value::from("b")));
}

#[test]
fn iteration_follows_push_order_across_extents() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    for i in 0..10 {
        q.push(i).unwrap();
    }
    let expected: Vec<Value> = (0..10).map(Value::from).collect();
    assert_eq!(queue_values(&q), expected);
    assert_eq!(q.extent_count().unwrap(), 3);
}

#[test]
fn references_carry_their_position() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    let refs: Vec<QueueRef> = (0..5).map(|i| q.push(i).unwrap()).collect();
    let offsets: Vec<u32> = refs.iter().map(|r| r.offset()).collect();
    assert_eq!(offsets, vec![0, 1, 2, 3, 0]);
    assert!(refs[..4].iter().all(|r| r.extent() == refs[0].extent()));
    assert_ne!(refs[4].extent(), refs[0].extent());
    assert!(refs[4].generation() > refs[0].generation());
}

// ============================================================================
// Stale References
// ============================================================================

#[test]
fn stale_reference_after_extent_reuse_resolves_to_nothing() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    let first: Vec<QueueRef> = (0..4).map(|i| q.push(i).unwrap()).collect();
    let keep = q.push("keep").unwrap();
    for r in &first {
        q.remove(*r).unwrap();
    }
    assert_eq!(q.extent_count().unwrap(), 1);

    // Fill the second extent so the next push reuses extent id 0.
    for i in 0..3 {
        q.push(i).unwrap();
    }
    let reused = q.push("reused").unwrap();
    assert_eq!(reused.extent(), first[0].extent());
    assert_ne!(reused.generation(), first[0].generation());

    for r in &first {
        assert_eq!(q.get(*r).unwrap(), None);
        assert!(!q.exists(*r).unwrap());
    }
    assert_eq!(q.get(reused).unwrap(), Some(Value::from("reused")));
    assert_eq!(q.get(keep).unwrap(), Some(Value::from("keep")));

    db.close().unwrap();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    assert_eq!(q.get(first[0]).unwrap(), None);
    assert_eq!(q.get(reused).unwrap(), Some(Value::from("reused")));
}

#[test]
fn generations_are_not_reissued_after_reopen() {
    let generations = Arc::new(GenerationSource::starting_at(1));
    let medium = MemoryMedium::new("gen");
    let build = |generations: &Arc<GenerationSource>| {
        Database::builder()
            .config(Config::in_memory().with_max_extent_items(1))
            .medium(Arc::new(medium.clone()))
            .generations(Arc::clone(generations))
            .build()
    };

    let db = opened(build(&generations));
    let q = db.get_queue("q").unwrap();
    let old = q.push("old").unwrap();
    q.remove(old).unwrap();
    db.defragment().unwrap();
    db.close().unwrap();

    // A process restart starts its counter from scratch.
    let db = opened(build(&Arc::new(GenerationSource::starting_at(1))));
    let q = db.get_queue("q").unwrap();
    let new = q.push("new").unwrap();
    assert_eq!(new.extent(), old.extent());
    assert!(new.generation() > old.generation());
    assert_eq!(q.get(old).unwrap(), None);
}

// ============================================================================
// Moves
// ============================================================================

#[test]
fn move_transfers_an_item_between_queues() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let pending = db.get_queue("pending").unwrap();
    let done = db.get_queue("done").unwrap();
    let r = pending.push("job").unwrap();
    let moved = pending.move_to(r, &done).unwrap().unwrap();
    assert_eq!(pending.size().unwrap(), 0);
    assert_eq!(done.get(moved).unwrap(), Some(Value::from("job")));
    db.close().unwrap();

    db.open().unwrap();
    let pending = db.get_queue("pending").unwrap();
    let done = db.get_queue("done").unwrap();
    assert!(pending.is_empty().unwrap());
    assert_eq!(queue_values(&done), vec![Value::from("job")]);
    assert_eq!(done.get(moved).unwrap(), Some(Value::from("job")));
}

#[test]
fn moving_a_stale_reference_does_nothing() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let a = db.get_queue("a").unwrap();
    let b = db.get_queue("b").unwrap();
    let r = a.push(1).unwrap();
    a.remove(r).unwrap();
    assert_eq!(a.move_to(r, &b).unwrap(), None);
    assert!(b.is_empty().unwrap());
}

// ============================================================================
// Clear
// ============================================================================

#[test]
fn clear_survives_reopen() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    let old = q.push("old").unwrap();
    q.clear().unwrap();
    let fresh = q.push("fresh").unwrap();
    db.close().unwrap();

    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    assert_eq!(queue_values(&q), vec![Value::from("fresh")]);
    assert_eq!(q.get(old).unwrap(), None);
    assert_eq!(q.get(fresh).unwrap(), Some(Value::from("fresh")));
}

#[test]
fn iterator_mutations_are_durable() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    for i in 0..6 {
        q.push(i).unwrap();
    }
    let mut iter = q.iter().unwrap();
    while let Some(entry) = iter.next() {
        let (_, value) = entry.unwrap();
        if value.as_int() == Some(0) || value.as_int() == Some(5) {
            iter.remove().unwrap();
        } else if value.as_int() == Some(3) {
            iter.set("three").unwrap();
        }
    }
    db.close().unwrap();

    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    assert_eq!(
        queue_values(&q),
        vec![Value::Int(1), Value::Int(2), Value::from("three"), Value::Int(4)]
    );
}
