//! Database Lifecycle Tests
//!
//! Tests for opening, closing, reopening and state errors.

use crate::common::*;

// ============================================================================
// Open / Close
// ============================================================================

#[test]
fn fresh_file_database_opens_empty() {
    let (dir, db) = file_db();
    let summary = db.open().unwrap();
    assert_eq!(summary.records_applied, 0);
    assert!(!summary.has_issues());
    assert!(db.queue_names().unwrap().is_empty());
    db.close().unwrap();
    assert!(log_path(&dir).exists());
}

#[test]
fn close_is_idempotent() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    db.close().unwrap();
    db.close().unwrap();
    assert!(!db.is_open());
}

#[test]
fn lookups_on_closed_database_are_state_errors() {
    let (_dir, db) = file_db();
    assert!(db.get_queue("q").unwrap_err().is_state_error());
    assert!(db.get_index("i").unwrap_err().is_state_error());
    assert!(db.queue_names().unwrap_err().is_state_error());
    assert!(db.flush().unwrap_err().is_state_error());
}

#[test]
fn reopening_an_open_database_is_a_state_error() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    assert!(db.open().unwrap_err().is_state_error());
    assert!(db.is_open());
}

#[test]
fn handles_fail_after_close() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let queue = db.get_queue("jobs").unwrap();
    let index = db.get_index("owners").unwrap();
    db.close().unwrap();

    assert!(queue.push("late").unwrap_err().is_state_error());
    assert!(index.put("k", "v").unwrap_err().is_state_error());
    assert!(queue.size().unwrap_err().is_state_error());
}

#[test]
fn invalid_configuration_is_rejected_before_open() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(file_config(&dir).with_flush_interval_ms(0));
    assert!(matches!(db.open(), Err(Error::Config(_))));
    assert!(!db.is_open());
    assert!(!log_path(&dir).exists());
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn state_survives_reopen() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let queue = db.get_queue("jobs").unwrap();
    let a = queue.push("a").unwrap();
    let b = queue.push(Value::Array(vec![Value::Int(1), Value::Bool(true)])).unwrap();
    let c = queue.push(Value::Bytes(vec![0, 255])).unwrap();
    queue.remove(a).unwrap();
    let index = db.get_index("owners").unwrap();
    index.put("build", "ci").unwrap();
    index.put(7, 3.5).unwrap();
    db.close().unwrap();

    let summary = db.open().unwrap();
    assert_eq!(summary.queues, 1);
    assert_eq!(summary.indices, 1);
    let queue = db.get_queue("jobs").unwrap();
    assert_eq!(queue.get(a).unwrap(), None);
    assert_eq!(
        queue.get(b).unwrap(),
        Some(Value::Array(vec![Value::Int(1), Value::Bool(true)]))
    );
    assert_eq!(queue.get(c).unwrap(), Some(Value::Bytes(vec![0, 255])));
    let index = db.get_index("owners").unwrap();
    assert_eq!(index.get("build").unwrap(), Some(Value::from("ci")));
    assert_eq!(index.get(7).unwrap(), Some(Value::Float(3.5)));
}

#[test]
fn names_are_namespaced_by_kind() {
    let (_dir, db) = file_db();
    db.open().unwrap();
    let queue = db.get_queue("shared").unwrap();
    let index = db.get_index("shared").unwrap();
    assert_ne!(queue.id(), index.id());
    db.close().unwrap();

    db.open().unwrap();
    assert_eq!(db.queue_names().unwrap(), vec!["shared".to_string()]);
    assert_eq!(db.index_names().unwrap(), vec!["shared".to_string()]);
    assert_eq!(db.get_queue("shared").unwrap().id(), queue.id());
    assert_eq!(db.get_index("shared").unwrap().id(), index.id());
}

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct Job {
    id: u64,
    command: String,
}

impl TypedValue for Job {
    const TYPE_NAME: &'static str = "tests.Job";
}

#[test]
fn typed_values_round_trip_through_the_catalog() {
    let (dir, db) = file_db();
    db.open().unwrap();
    let job = Job {
        id: 9,
        command: "make".to_string(),
    };
    let r = db
        .get_queue("jobs")
        .unwrap()
        .push(Value::typed(&job).unwrap())
        .unwrap();
    db.close().unwrap();
    assert!(dir.path().join("spool.log.types").exists());

    db.open().unwrap();
    let stored = db.get_queue("jobs").unwrap().get(r).unwrap().unwrap();
    assert_eq!(stored.decode_typed::<Job>().unwrap(), job);
}

#[test]
fn config_loads_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("spool.toml");
    std::fs::write(
        &config_path,
        format!(
            "path = {:?}\nmax-extent-items = 2\nflush-thread-name = \"it-flush\"\n",
            log_path(&dir)
        ),
    )
    .unwrap();
    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.max_extent_items, 2);

    let db = opened(Database::new(config));
    let queue = db.get_queue("q").unwrap();
    for i in 0..5 {
        queue.push(i).unwrap();
    }
    assert_eq!(queue.extent_count().unwrap(), 3);
    db.close().unwrap();
}

#[test]
fn operations_agree_across_storage() {
    test_across_storage("queue_ops", |db| {
        let queue = db.get_queue("q").unwrap();
        let refs: Vec<QueueRef> = (0..6).map(|i| queue.push(i).unwrap()).collect();
        queue.remove(refs[1]).unwrap();
        queue.set(refs[2], "two").unwrap();
        (queue.size().unwrap(), queue_values(&queue))
    });

    test_across_storage("index_ops", |db| {
        let index = db.get_index("i").unwrap();
        index.put("a", 1).unwrap();
        index.put("b", 2).unwrap();
        index.remove("a").unwrap();
        index_entries(&index)
    });
}
