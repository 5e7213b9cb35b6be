//! Log record model
//!
//! This module defines every record the log store persists:
//! - NameBinding: a collection name bound to its durable id
//! - QueuePut / QueueRemove: item slot written or cleared
//! - QueueAddExtent / QueueRemoveExtent: extent allocated or reclaimed
//! - QueueMove: item moved between two slots, possibly across queues
//! - QueueClear: every extent of a queue dropped
//! - IndexPut / IndexRemove / IndexClear: index entry mutations
//! - GenerationFloor: lower bound for extent generations after restart
//!
//! Records are generic over their payload type so the codec can swap
//! `Value` for its wire form without a second enum.

use serde::{Deserialize, Serialize};
use spool_core::{CollectionId, CollectionKind, ExtentId, Generation, Result, Value};

/// Log record
///
/// Every collection-scoped variant names its collection id; replay matches
/// this enum exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRecord<V = Value> {
    /// Durable name binding
    NameBinding {
        /// Assigned id
        id: CollectionId,
        /// Queue or index namespace
        kind: CollectionKind,
        /// Collection name
        name: String,
    },

    /// Item written at a slot
    QueuePut {
        /// Queue id
        queue: CollectionId,
        /// Extent holding the slot
        extent: ExtentId,
        /// Slot offset
        offset: u32,
        /// Stored item
        value: V,
    },

    /// Item slot cleared
    QueueRemove {
        /// Queue id
        queue: CollectionId,
        /// Extent holding the slot
        extent: ExtentId,
        /// Slot offset
        offset: u32,
    },

    /// Extent allocated
    QueueAddExtent {
        /// Queue id
        queue: CollectionId,
        /// Extent id
        extent: ExtentId,
        /// Allocation tag
        generation: Generation,
        /// Slot count
        capacity: u32,
        /// End offset to restore; zero for a fresh extent
        end: u32,
    },

    /// Extent reclaimed
    QueueRemoveExtent {
        /// Queue id
        queue: CollectionId,
        /// Extent id
        extent: ExtentId,
        /// Generation being reclaimed
        generation: Generation,
    },

    /// Item moved from one slot to another
    QueueMove {
        /// Source queue id
        source: CollectionId,
        /// Source extent
        extent: ExtentId,
        /// Source slot offset
        offset: u32,
        /// Target queue id
        target: CollectionId,
        /// Target extent
        target_extent: ExtentId,
        /// Target slot offset
        target_offset: u32,
    },

    /// All extents of a queue dropped
    QueueClear {
        /// Queue id
        queue: CollectionId,
    },

    /// Index entry written
    IndexPut {
        /// Index id
        index: CollectionId,
        /// Entry key
        key: V,
        /// Entry value
        value: V,
    },

    /// Index entry removed
    IndexRemove {
        /// Index id
        index: CollectionId,
        /// Entry key
        key: V,
    },

    /// All entries of an index removed
    IndexClear {
        /// Index id
        index: CollectionId,
    },

    /// Generations below this value were handed out before
    GenerationFloor {
        /// First generation that may still be allocated
        generation: Generation,
    },
}

impl<V> LogRecord<V> {
    /// Borrow every payload
    pub fn as_ref(&self) -> LogRecord<&V> {
        match self {
            LogRecord::NameBinding { id, kind, name } => LogRecord::NameBinding {
                id: *id,
                kind: *kind,
                name: name.clone(),
            },
            LogRecord::QueuePut {
                queue,
                extent,
                offset,
                value,
            } => LogRecord::QueuePut {
                queue: *queue,
                extent: *extent,
                offset: *offset,
                value,
            },
            LogRecord::QueueRemove {
                queue,
                extent,
                offset,
            } => LogRecord::QueueRemove {
                queue: *queue,
                extent: *extent,
                offset: *offset,
            },
            LogRecord::QueueAddExtent {
                queue,
                extent,
                generation,
                capacity,
                end,
            } => LogRecord::QueueAddExtent {
                queue: *queue,
                extent: *extent,
                generation: *generation,
                capacity: *capacity,
                end: *end,
            },
            LogRecord::QueueRemoveExtent {
                queue,
                extent,
                generation,
            } => LogRecord::QueueRemoveExtent {
                queue: *queue,
                extent: *extent,
                generation: *generation,
            },
            LogRecord::QueueMove {
                source,
                extent,
                offset,
                target,
                target_extent,
                target_offset,
            } => LogRecord::QueueMove {
                source: *source,
                extent: *extent,
                offset: *offset,
                target: *target,
                target_extent: *target_extent,
                target_offset: *target_offset,
            },
            LogRecord::QueueClear { queue } => LogRecord::QueueClear { queue: *queue },
            LogRecord::IndexPut { index, key, value } => LogRecord::IndexPut {
                index: *index,
                key,
                value,
            },
            LogRecord::IndexRemove { index, key } => LogRecord::IndexRemove { index: *index, key },
            LogRecord::IndexClear { index } => LogRecord::IndexClear { index: *index },
            LogRecord::GenerationFloor { generation } => LogRecord::GenerationFloor {
                generation: *generation,
            },
        }
    }

    /// Collection the record mutates (source queue for moves)
    pub fn collection(&self) -> Option<CollectionId> {
        match self {
            LogRecord::NameBinding { id, .. } => Some(*id),
            LogRecord::QueuePut { queue, .. }
            | LogRecord::QueueRemove { queue, .. }
            | LogRecord::QueueAddExtent { queue, .. }
            | LogRecord::QueueRemoveExtent { queue, .. }
            | LogRecord::QueueClear { queue } => Some(*queue),
            LogRecord::QueueMove { source, .. } => Some(*source),
            LogRecord::IndexPut { index, .. }
            | LogRecord::IndexRemove { index, .. }
            | LogRecord::IndexClear { index } => Some(*index),
            LogRecord::GenerationFloor { .. } => None,
        }
    }

    /// Variant name, for log messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            LogRecord::NameBinding { .. } => "NameBinding",
            LogRecord::QueuePut { .. } => "QueuePut",
            LogRecord::QueueRemove { .. } => "QueueRemove",
            LogRecord::QueueAddExtent { .. } => "QueueAddExtent",
            LogRecord::QueueRemoveExtent { .. } => "QueueRemoveExtent",
            LogRecord::QueueMove { .. } => "QueueMove",
            LogRecord::QueueClear { .. } => "QueueClear",
            LogRecord::IndexPut { .. } => "IndexPut",
            LogRecord::IndexRemove { .. } => "IndexRemove",
            LogRecord::IndexClear { .. } => "IndexClear",
            LogRecord::GenerationFloor { .. } => "GenerationFloor",
        }
    }

    /// Convert every payload, stopping at the first failure
    pub fn try_map_values<U, F>(self, mut f: F) -> Result<LogRecord<U>>
    where
        F: FnMut(V) -> Result<U>,
    {
        Ok(match self {
            LogRecord::NameBinding { id, kind, name } => LogRecord::NameBinding { id, kind, name },
            LogRecord::QueuePut {
                queue,
                extent,
                offset,
                value,
            } => LogRecord::QueuePut {
                queue,
                extent,
                offset,
                value: f(value)?,
            },
            LogRecord::QueueRemove {
                queue,
                extent,
                offset,
            } => LogRecord::QueueRemove {
                queue,
                extent,
                offset,
            },
            LogRecord::QueueAddExtent {
                queue,
                extent,
                generation,
                capacity,
                end,
            } => LogRecord::QueueAddExtent {
                queue,
                extent,
                generation,
                capacity,
                end,
            },
            LogRecord::QueueRemoveExtent {
                queue,
                extent,
                generation,
            } => LogRecord::QueueRemoveExtent {
                queue,
                extent,
                generation,
            },
            LogRecord::QueueMove {
                source,
                extent,
                offset,
                target,
                target_extent,
                target_offset,
            } => LogRecord::QueueMove {
                source,
                extent,
                offset,
                target,
                target_extent,
                target_offset,
            },
            LogRecord::QueueClear { queue } => LogRecord::QueueClear { queue },
            LogRecord::IndexPut { index, key, value } => LogRecord::IndexPut {
                index,
                key: f(key)?,
                value: f(value)?,
            },
            LogRecord::IndexRemove { index, key } => LogRecord::IndexRemove { index, key: f(key)? },
            LogRecord::IndexClear { index } => LogRecord::IndexClear { index },
            LogRecord::GenerationFloor { generation } => LogRecord::GenerationFloor { generation },
        })
    }
}
