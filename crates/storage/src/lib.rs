//! In-memory queue storage for SpoolDB
//!
//! This crate implements the arena that backs every queue:
//! - [`Extent`]: fixed-capacity slot array with an append-only end offset
//! - [`ExtentList`]: dense id-indexed table plus allocation-ordered live list
//! - [`GenerationSource`]: monotonic allocation tags for extents
//!
//! Nothing here logs or locks; the engine wraps these structures in its
//! collection locks and writes the matching log records.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod extent;
pub mod extent_list;
pub mod generation;

pub use extent::Extent;
pub use extent_list::{ExtentCursor, ExtentList};
pub use generation::GenerationSource;
