//! Fixed-capacity queue segment
//!
//! An [`Extent`] owns a fixed array of item slots. Pushes append at the end
//! offset (one past the highest slot ever occupied) and never refill holes, so
//! within one generation each offset names at most one item over the extent's
//! whole life. That is what lets a [`QueueRef`](spool_core::QueueRef) detect
//! staleness with nothing more than a generation comparison.
//!
//! ```text
//!   offset:   0     1     2     3     4     5     6     7
//!           ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//!           │  a  │  -  │  c  │  d  │  -  │     │     │     │
//!           └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//!                                         ▲ end = 5
//!   count = 3, appendable = true (end < capacity)
//! ```

use spool_core::{Error, ExtentId, Generation, Result};

/// One segment of a queue
#[derive(Debug, Clone)]
pub struct Extent<T> {
    id: ExtentId,
    generation: Generation,
    slots: Box<[Option<T>]>,
    /// Occupied slots
    count: usize,
    /// One past the highest slot ever occupied
    end: u32,
}

impl<T> Extent<T> {
    /// Create an empty extent
    pub fn new(id: ExtentId, generation: Generation, capacity: u32) -> Self {
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>();
        Self {
            id,
            generation,
            slots: slots.into_boxed_slice(),
            count: 0,
            end: 0,
        }
    }

    /// Create an empty extent whose first `end` offsets are already spent
    ///
    /// Used when rebuilding an extent from a compacted log, where slots
    /// below the end offset that were vacated must stay unusable.
    pub fn with_end(id: ExtentId, generation: Generation, capacity: u32, end: u32) -> Result<Self> {
        if end > capacity {
            return Err(Error::Corruption(format!(
                "extent {id} end offset {end} exceeds capacity {capacity}"
            )));
        }
        let mut extent = Self::new(id, generation, capacity);
        extent.end = end;
        Ok(extent)
    }

    /// Extent id
    pub fn id(&self) -> ExtentId {
        self.id
    }

    /// Allocation generation
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Slot count
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Occupied slot count
    pub fn len(&self) -> usize {
        self.count
    }

    /// No occupied slots
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// One past the highest slot ever occupied
    pub fn end_offset(&self) -> u32 {
        self.end
    }

    /// Whether a push can still append at the tail
    pub fn is_appendable(&self) -> bool {
        self.end < self.capacity()
    }

    /// Offset the next push would use, if any
    pub fn next_offset(&self) -> Option<u32> {
        self.is_appendable().then_some(self.end)
    }

    /// Append an item, returning its offset, or `None` when full
    pub fn push(&mut self, item: T) -> Option<u32> {
        let offset = self.next_offset()?;
        self.slots[offset as usize] = Some(item);
        self.end += 1;
        self.count += 1;
        Some(offset)
    }

    /// Store an item at an explicit offset (replay)
    ///
    /// Returns the item previously in that slot.
    pub fn put_at(&mut self, offset: u32, item: T) -> Result<Option<T>> {
        let (id, capacity) = (self.id, self.slots.len());
        let slot = self.slots.get_mut(offset as usize).ok_or_else(|| {
            Error::Corruption(format!(
                "offset {offset} out of range for extent {id} (capacity {capacity})"
            ))
        })?;
        let previous = slot.replace(item);
        if previous.is_none() {
            self.count += 1;
        }
        self.end = self.end.max(offset + 1);
        Ok(previous)
    }

    /// Whether `offset` is in range and holds no item
    pub fn is_vacant(&self, offset: u32) -> bool {
        matches!(self.slots.get(offset as usize), Some(None))
    }

    /// Item at an offset
    #[inline]
    pub fn get(&self, offset: u32) -> Option<&T> {
        self.slots.get(offset as usize).and_then(Option::as_ref)
    }

    /// Replace the item in an occupied slot
    ///
    /// Returns the previous item, or `None` (dropping `item`) when the slot
    /// is empty; callers check [`exists`](Self::exists) first.
    pub fn set(&mut self, offset: u32, item: T) -> Option<T> {
        match self.slots.get_mut(offset as usize) {
            Some(slot) if slot.is_some() => slot.replace(item),
            _ => None,
        }
    }

    /// Vacate a slot
    #[inline]
    pub fn remove(&mut self, offset: u32) -> Option<T> {
        let removed = self.slots.get_mut(offset as usize).and_then(Option::take);
        if removed.is_some() {
            self.count -= 1;
        }
        removed
    }

    /// Whether a slot is occupied
    #[inline]
    pub fn exists(&self, offset: u32) -> bool {
        self.get(offset).is_some()
    }

    /// Whether the extent may be reclaimed
    ///
    /// True only once every slot has been used and vacated. An emptied
    /// extent that can still append is kept, so the next push does not
    /// waste a fresh extent.
    pub fn try_to_discard(&self) -> bool {
        self.is_empty() && !self.is_appendable()
    }

    /// First occupied slot at or after `from` and before `limit`
    pub fn next_occupied(&self, from: u32, limit: u32) -> Option<(u32, &T)> {
        let limit = limit.min(self.end);
        (from..limit).find_map(|offset| self.get(offset).map(|item| (offset, item)))
    }

    /// Occupied slots in offset order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots[..self.end as usize]
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| slot.as_ref().map(|item| (offset as u32, item)))
    }
}
