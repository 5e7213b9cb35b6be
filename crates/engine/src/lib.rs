//! Engine layer for SpoolDB
//!
//! This crate ties the lower layers into a database:
//! - [`Database`]: open / recover / defragment / close lifecycle
//! - [`Queue`] and [`Index`]: the two collection kinds
//! - [`NameCatalog`]: durable name ↔ id bindings
//! - [`Config`]: validated configuration, loadable from TOML
//! - [`ReplaySummary`] / [`CompactionSummary`]: lifecycle outcomes
//!
//! # Locking
//!
//! | Level | Lock | Taken by |
//! |-------|------|----------|
//! | 1 | database gate, shared | every collection operation |
//! | 1 | database gate, exclusive | open, recover, defragment, close |
//! | 2 | collection lock, read | `get`, `exists`, `size`, iterator steps |
//! | 2 | collection lock, write | `push`, `set`, `remove`, `clear`, `put` |
//! | 2+2 | two collection locks, address order | `move_to` |
//!
//! Log records are appended while the collection lock is held, so each
//! collection's records appear in the log in the order its operations
//! took effect.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compaction;
pub mod config;
pub mod database;
pub mod index;
pub mod names;
pub mod queue;
pub mod replay;

mod monitor;

pub use compaction::CompactionSummary;
pub use config::{Config, StorageKind, MAX_EXTENT_ITEMS};
pub use database::{Database, DatabaseBuilder};
pub use index::{Index, IndexIter};
pub use names::NameCatalog;
pub use queue::{Queue, QueueIter};
pub use replay::ReplaySummary;
