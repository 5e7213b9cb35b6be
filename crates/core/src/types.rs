//! Addressing types for collections and queue items
//!
//! This module defines the identifiers used throughout the engine:
//! - [`CollectionId`]: durable id of a named queue or index
//! - [`ExtentId`] / [`Generation`]: arena index and allocation tag of a queue extent
//! - [`QueueRef`]: the opaque handle clients use to address a queue item

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of the collection id space (queues and indices combined)
pub const MAX_COLLECTIONS: usize = 1 << 16;

/// Durable identifier of a named collection
///
/// Queues and indices share one id space. An id is assigned once per name,
/// recorded in the log, and never reused for a different name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Get the raw id
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Index into dense tables
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a named collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Append-ordered queue with stable item references
    Queue,
    /// Key-value index
    Index,
}

impl CollectionKind {
    /// Human-readable name, used in log messages
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Queue => "queue",
            CollectionKind::Index => "index",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of an extent within its queue
///
/// Extent ids are dense and are reused once an extent is reclaimed; only the
/// accompanying [`Generation`] tells two allocations of one id apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtentId(pub u32);

impl ExtentId {
    /// Index into the extent table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExtentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocation tag of an extent
///
/// Drawn from a database-wide monotonically increasing counter, so no two
/// extents ever share a generation, even when they share an [`ExtentId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    /// Get the raw counter value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Reference to a single queue item
///
/// Returned by `push` and accepted by `get`, `remove`, `exists` and
/// `move_to`. A reference resolves only while the extent it names still
/// carries the same generation; after the extent is reclaimed and its id
/// reused, the reference resolves to nothing rather than to the new occupant.
///
/// # Examples
///
/// ```
/// use spool_core::{ExtentId, Generation, QueueRef};
///
/// let r = QueueRef::new(ExtentId(0), Generation(7), 3);
/// assert_eq!(r.offset(), 3);
/// assert_eq!(r.to_string(), "0:g7:3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueRef {
    extent: ExtentId,
    generation: Generation,
    offset: u32,
}

impl QueueRef {
    /// Create a reference
    pub fn new(extent: ExtentId, generation: Generation, offset: u32) -> Self {
        Self {
            extent,
            generation,
            offset,
        }
    }

    /// Extent id part
    pub fn extent(&self) -> ExtentId {
        self.extent
    }

    /// Generation part
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Slot offset within the extent
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl fmt::Display for QueueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.extent, self.generation, self.offset)
    }
}
