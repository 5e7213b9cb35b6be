//! Durability layer for SpoolDB
//!
//! This crate implements the write-ahead log:
//! - LogRecord types: NameBinding, QueuePut, QueueMove, IndexPut, etc.
//! - Frame format: magic, length, signed-magnitude checksum
//! - Log media: file-backed and in-memory
//! - Type catalog: compact ids for application type names
//! - Log store: strict and best-effort replay, buffered writes with a
//!   background flusher, compaction swap

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod codec;
pub mod flusher;
pub mod format;
pub mod medium;
pub mod record;
pub mod store;

pub use catalog::{TypeCatalog, TypeRegistry, CATALOG_SUFFIX};
pub use codec::{RecordCodec, WireValue};
pub use format::{ReadMode, ScanStats};
pub use medium::{DurableWrite, FileMedium, LogMedium, MemoryMedium};
pub use record::LogRecord;
pub use store::{CompactionState, CompactionTarget, LogOptions, LogStats, LogStore, COMPACTION_SUFFIX};
