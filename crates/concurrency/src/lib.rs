//! Concurrency layer for SpoolDB
//!
//! This crate implements the two-level lock hierarchy:
//! 1. [`LifecycleGate`]: database-wide shared/exclusive gate over the open state
//! 2. [`CollectionLock`]: per-collection writer-preferring reader/writer lock,
//!    with [`write_pair`] for deadlock-free two-collection operations
//!
//! Locks must be taken in that order: gate first, then collection locks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gate;
pub mod lock;

pub use gate::{ExclusiveGuard, LifecycleGate, SharedGuard};
pub use lock::{write_pair, CollectionLock, PairWriteGuard};
