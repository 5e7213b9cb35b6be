//! Engine Integration Tests
//!
//! Tests for spool-engine through the public facade: lifecycle, queues,
//! indices, recovery, compaction and concurrent access.

#[path = "../common/mod.rs"]
mod common;

mod compaction;
mod concurrency;
mod index;
mod lifecycle;
mod queue;
mod recovery;
