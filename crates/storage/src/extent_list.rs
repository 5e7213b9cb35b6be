//! Extent arena of a queue
//!
//! # Design
//!
//! - Dense table indexed by [`ExtentId`]: O(1) lookup for every reference
//! - Compact `live` list in allocation order: sequential iteration without
//!   scanning holes in the table
//! - Table grows by doubling up to a fixed limit; past it the queue is
//!   exhausted and allocation fails with `Error::Capacity`
//! - Freed ids are reused (lowest first); generations tell reuses apart

use spool_core::{Error, ExtentId, Generation, QueueRef, Result};

use crate::extent::Extent;

const INITIAL_TABLE_SIZE: usize = 4;

/// Position snapshot of one live extent
///
/// Iterators copy these at creation so later allocations, or appends past
/// the recorded end, do not leak into an in-flight iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentCursor {
    /// Extent id
    pub id: ExtentId,
    /// Generation at snapshot time
    pub generation: Generation,
    /// End offset at snapshot time
    pub end: u32,
}

/// All extents of one queue
#[derive(Debug)]
pub struct ExtentList<T> {
    table: Vec<Option<Extent<T>>>,
    live: Vec<ExtentId>,
    limit: usize,
}

impl<T> ExtentList<T> {
    /// Create an empty list holding at most `limit` extents
    pub fn new(limit: usize) -> Self {
        Self {
            table: Vec::new(),
            live: Vec::new(),
            limit,
        }
    }

    /// Total occupied slots across all extents
    pub fn len(&self) -> usize {
        self.iter().map(Extent::len).sum()
    }

    /// No occupied slots
    pub fn is_empty(&self) -> bool {
        self.iter().all(Extent::is_empty)
    }

    /// Number of live extents
    pub fn extent_count(&self) -> usize {
        self.live.len()
    }

    /// Extent by id, whatever its generation
    #[inline]
    pub fn get(&self, id: ExtentId) -> Option<&Extent<T>> {
        self.table.get(id.index()).and_then(Option::as_ref)
    }

    /// Mutable extent by id, whatever its generation
    #[inline]
    pub fn get_mut(&mut self, id: ExtentId) -> Option<&mut Extent<T>> {
        self.table.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Extent addressed by a reference, if it is still the same allocation
    #[inline]
    pub fn resolve(&self, reference: &QueueRef) -> Option<&Extent<T>> {
        self.get(reference.extent())
            .filter(|extent| extent.generation() == reference.generation())
    }

    /// Mutable variant of [`resolve`](Self::resolve)
    #[inline]
    pub fn resolve_mut(&mut self, reference: &QueueRef) -> Option<&mut Extent<T>> {
        self.get_mut(reference.extent())
            .filter(|extent| extent.generation() == reference.generation())
    }

    /// Most recently allocated live extent
    pub fn tail(&self) -> Option<&Extent<T>> {
        self.live.last().and_then(|id| self.get(*id))
    }

    /// Mutable variant of [`tail`](Self::tail)
    pub fn tail_mut(&mut self) -> Option<&mut Extent<T>> {
        let id = *self.live.last()?;
        self.get_mut(id)
    }

    /// Lowest id with no live extent
    pub fn next_free_id(&self) -> Result<ExtentId> {
        let id = self
            .table
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.table.len());
        if id >= self.limit {
            return Err(Error::Capacity {
                resource: "queue extent",
                limit: self.limit,
            });
        }
        Ok(ExtentId(id as u32))
    }

    /// Add an extent at its id, appending it to the live order
    ///
    /// Fails with `Corruption` when the id is already live and with
    /// `Capacity` when the id is beyond the limit.
    pub fn insert(&mut self, extent: Extent<T>) -> Result<()> {
        let index = extent.id().index();
        if index >= self.limit {
            return Err(Error::Capacity {
                resource: "queue extent",
                limit: self.limit,
            });
        }
        if index >= self.table.len() {
            self.grow(index + 1);
        }
        if self.table[index].is_some() {
            return Err(Error::Corruption(format!(
                "extent {} is already allocated",
                extent.id()
            )));
        }
        self.live.push(extent.id());
        self.table[index] = Some(extent);
        Ok(())
    }

    /// Remove an extent from the table and the live order
    pub fn discard(&mut self, id: ExtentId) -> Option<Extent<T>> {
        let extent = self.table.get_mut(id.index()).and_then(Option::take)?;
        self.live.retain(|live| *live != id);
        Some(extent)
    }

    /// Drop every extent
    pub fn clear(&mut self) {
        self.table.clear();
        self.live.clear();
    }

    /// Live extents in allocation order
    pub fn iter(&self) -> impl Iterator<Item = &Extent<T>> {
        self.live.iter().filter_map(|id| self.get(*id))
    }

    /// Cursor snapshot of the live extents
    pub fn snapshot(&self) -> Vec<ExtentCursor> {
        self.iter()
            .map(|extent| ExtentCursor {
                id: extent.id(),
                generation: extent.generation(),
                end: extent.end_offset(),
            })
            .collect()
    }

    fn grow(&mut self, min_len: usize) {
        let mut len = self.table.len().max(INITIAL_TABLE_SIZE);
        while len < min_len {
            len *= 2;
        }
        let len = len.min(self.limit);
        tracing::trace!(from = self.table.len(), to = len, "growing extent table");
        self.table.resize_with(len, || None);
    }
}
