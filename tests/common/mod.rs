//! Shared helpers for the integration test suites

#![allow(dead_code)]

pub use spooldb::prelude::*;
pub use spooldb::{GenerationSource, LogMedium, MemoryMedium};
pub use std::sync::Arc;
pub use tempfile::TempDir;

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Route engine logs through the test harness writer
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    });
}

/// File-backed database in a fresh temporary directory
///
/// Keep the returned `TempDir` alive for as long as the database is used.
pub fn file_db() -> (TempDir, Database) {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");
    let db = Database::new(file_config(&dir));
    (dir, db)
}

/// Configuration for `spool.log` inside `dir`, with small extents
pub fn file_config(dir: &TempDir) -> Config {
    Config::at(log_path(dir)).with_max_extent_items(4)
}

/// Log path used by [`file_db`]
pub fn log_path(dir: &TempDir) -> PathBuf {
    dir.path().join("spool.log")
}

/// Database on a shared in-memory medium, with small extents
pub fn memory_db(medium: &MemoryMedium) -> Database {
    init_tracing();
    Database::builder()
        .config(Config::in_memory().with_max_extent_items(4))
        .medium(Arc::new(medium.clone()))
        .build()
}

/// Open `db`, panicking with context on failure
pub fn opened(db: Database) -> Database {
    db.open().expect("open");
    db
}

/// Values of a queue in iteration order
pub fn queue_values(queue: &Queue) -> Vec<Value> {
    queue
        .iter()
        .expect("iterator")
        .map(|entry| entry.expect("entry").1)
        .collect()
}

/// Entries of an index, sorted by their debug rendering
pub fn index_entries(index: &Index) -> Vec<(Value, Value)> {
    let mut entries: Vec<(Value, Value)> = index
        .iter()
        .expect("iterator")
        .map(|entry| entry.expect("entry"))
        .collect();
    entries.sort_by_key(|(k, _)| format!("{:?}", k));
    entries
}

/// Run `scenario` against file and memory storage and require equal results
pub fn test_across_storage<T, F>(name: &str, scenario: F)
where
    T: PartialEq + Debug,
    F: Fn(&Database) -> T,
{
    let (_dir, file) = file_db();
    file.open().expect("open file database");
    let on_file = scenario(&file);
    file.close().expect("close file database");

    let memory = memory_db(&MemoryMedium::new(name));
    memory.open().expect("open memory database");
    let in_memory = scenario(&memory);
    memory.close().expect("close memory database");

    assert_eq!(on_file, in_memory, "{} differs between storages", name);
}
