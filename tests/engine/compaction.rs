//! Compaction Tests
//!
//! Defragmenting must preserve every live item, reference and entry, and
//! leave no dead records behind.

use crate::common::*;
use parking_lot::Mutex;
use proptest::prelude::*;

const QUEUES: [&str; 2] = ["left", "right"];

#[derive(Debug, Clone)]
enum Op {
    Push(usize, i64),
    Remove(usize, usize),
    Move(usize, usize, usize),
    Put(u8, i64),
    Delete(u8),
    ClearIndex,
    ClearQueue(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..2usize, any::<i64>()).prop_map(|(q, v)| Op::Push(q, v)),
        2 => (0..2usize, any::<usize>()).prop_map(|(q, i)| Op::Remove(q, i)),
        2 => (0..2usize, any::<usize>(), 0..2usize).prop_map(|(q, i, t)| Op::Move(q, i, t)),
        3 => (0..16u8, any::<i64>()).prop_map(|(k, v)| Op::Put(k, v)),
        1 => (0..16u8).prop_map(Op::Delete),
        1 => Just(Op::ClearIndex),
        1 => (0..2usize).prop_map(Op::ClearQueue),
    ]
}

type Snapshot = (Vec<Vec<(QueueRef, Value)>>, Vec<(Value, Value)>);

fn snapshot(db: &Database) -> Snapshot {
    let queues = QUEUES
        .iter()
        .map(|name| {
            db.get_queue(name)
                .unwrap()
                .iter()
                .unwrap()
                .map(|e| e.unwrap())
                .collect()
        })
        .collect();
    (queues, index_entries(&db.get_index("idx").unwrap()))
}

fn apply(db: &Database, op: &Op) {
    let queue = |i: usize| db.get_queue(QUEUES[i]).unwrap();
    let pick = |q: &Queue, i: usize| {
        let refs: Vec<QueueRef> = q.iter().unwrap().map(|e| e.unwrap().0).collect();
        (!refs.is_empty()).then(|| refs[i % refs.len()])
    };
    let idx = db.get_index("idx").unwrap();
    match op {
        Op::Push(q, v) => {
            queue(*q).push(*v).unwrap();
        }
        Op::Remove(q, i) => {
            let q = queue(*q);
            if let Some(r) = pick(&q, *i) {
                q.remove(r).unwrap();
            }
        }
        Op::Move(q, i, t) => {
            let (source, target) = (queue(*q), queue(*t));
            if let Some(r) = pick(&source, *i) {
                source.move_to(r, &target).unwrap();
            }
        }
        Op::Put(k, v) => {
            idx.put(i64::from(*k), *v).unwrap();
        }
        Op::Delete(k) => {
            idx.remove(i64::from(*k)).unwrap();
        }
        Op::ClearIndex => idx.clear().unwrap(),
        Op::ClearQueue(q) => queue(*q).clear().unwrap(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn compaction_preserves_live_state(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let medium = MemoryMedium::new("spool.log");
        let db = opened(memory_db(&medium));
        for op in &ops {
            apply(&db, op);
        }
        let before = snapshot(&db);

        let summary = db.defragment().unwrap();
        prop_assert_eq!(&snapshot(&db), &before);
        db.close().unwrap();

        let replay = db.open().unwrap();
        prop_assert_eq!(&snapshot(&db), &before);
        // Every record in the compacted log is still live.
        prop_assert_eq!(replay.records_applied, summary.records_written);
        prop_assert!(!replay.has_issues());
    }
}

// ============================================================================
// Concrete Cases
// ============================================================================

#[test]
fn references_stay_valid_across_compaction() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    let refs: Vec<QueueRef> = (0..9).map(|i| q.push(i).unwrap()).collect();
    for r in refs.iter().step_by(2) {
        q.remove(*r).unwrap();
    }
    db.defragment().unwrap();

    for (i, r) in refs.iter().enumerate() {
        let expected = (i % 2 == 1).then(|| Value::Int(i as i64));
        assert_eq!(q.get(*r).unwrap(), expected);
    }
    // Holes below each extent's end offset stay unusable.
    let next = q.push("next").unwrap();
    assert!(!refs.contains(&next));
    db.close().unwrap();

    db.open().unwrap();
    let q = db.get_queue("q").unwrap();
    assert_eq!(q.get(refs[1]).unwrap(), Some(Value::Int(1)));
    assert_eq!(q.get(next).unwrap(), Some(Value::from("next")));
}

#[test]
fn compaction_keeps_unused_bindings() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let empty = db.get_queue("empty").unwrap().id();
    db.get_index("also-empty").unwrap();
    db.defragment().unwrap();
    db.close().unwrap();

    db.open().unwrap();
    assert_eq!(db.queue_names().unwrap(), vec!["empty".to_string()]);
    assert_eq!(db.index_names().unwrap(), vec!["also-empty".to_string()]);
    assert_eq!(db.get_queue("empty").unwrap().id(), empty);
}

#[test]
fn compaction_does_not_leave_a_sibling_behind() {
    let (dir, db) = file_db();
    db.open().unwrap();
    db.get_queue("q").unwrap().push(1).unwrap();
    db.defragment().unwrap();
    assert!(!dir.path().join("spool.log.compact").exists());
    assert!(log_path(&dir).exists());
}

#[derive(Default)]
struct Recording {
    total: Mutex<Option<u64>>,
    progress: Mutex<Vec<u64>>,
}

impl ProgressMonitor for Recording {
    fn start(&self, _task: &str, total: Option<u64>) -> MonitorResult {
        *self.total.lock() = total;
        Ok(())
    }

    fn progress(&self, done: u64) -> MonitorResult {
        self.progress.lock().push(done);
        Err("monitor refuses".into())
    }

    fn end(&self) -> MonitorResult {
        panic!("monitor crashed");
    }
}

#[test]
fn failing_monitor_does_not_abort_compaction() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    db.get_queue("a").unwrap().push(1).unwrap();
    db.get_queue("b").unwrap();
    db.get_index("c").unwrap().put(1, 1).unwrap();

    let monitor = Recording::default();
    let summary = db.defragment_with(&monitor).unwrap();
    assert_eq!(*monitor.total.lock(), Some(3));
    assert_eq!(*monitor.progress.lock(), vec![1, 2, 3]);
    assert!(summary.records_written > 3);
}
