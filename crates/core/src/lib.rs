//! Core types for SpoolDB
//!
//! This crate defines the fundamental types shared by every layer:
//! - [`Error`] / [`Result`]: the single error taxonomy of the engine
//! - [`CollectionId`], [`ExtentId`], [`Generation`], [`QueueRef`]: addressing
//! - [`Value`]: the payload model for queue items and index entries
//! - [`ProgressMonitor`]: progress callbacks for replay and compaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod progress;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use progress::{MonitorResult, NoopMonitor, ProgressMonitor};
pub use types::{CollectionId, CollectionKind, ExtentId, Generation, QueueRef, MAX_COLLECTIONS};
pub use value::{TypedValue, Value};
