//! Queue collection
//!
//! A queue stores items in fixed-capacity extents and hands out a
//! [`QueueRef`] per item. Every mutation runs under the queue's write lock
//! and appends its log record before touching memory, so a failed write
//! leaves the queue unchanged.
//!
//! | Operation | Records |
//! |-----------|---------|
//! | `push` | `QueueRemoveExtent` (discardable tail), `QueueAddExtent` (new tail), `QueuePut` |
//! | `set` | `QueuePut` |
//! | `remove` | `QueueRemove`, then `QueueRemoveExtent` if the extent is spent |
//! | `move_to` | target extent records as for `push`, `QueueMove`, then source reclamation |
//! | `clear` | `QueueClear` |

use spool_concurrency::{write_pair, CollectionLock, PairWriteGuard};
use spool_core::{CollectionId, Error, ExtentId, Generation, QueueRef, Result, Value};
use spool_durability::{CompactionTarget, LogRecord};
use spool_storage::{Extent, ExtentCursor, ExtentList};
use std::fmt;

use crate::config::MAX_EXTENT_ITEMS;
use crate::database::{OpenState, Session};

/// Named queue with stable item references
pub struct Queue {
    id: CollectionId,
    name: String,
    extent_items: u32,
    state: CollectionLock<ExtentList<Value>>,
    session: Session,
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Write guards of a move: the source list and, for a cross-queue move, the
/// target list
struct MoveLists<'g> {
    source: &'g mut ExtentList<Value>,
    target: Option<&'g mut ExtentList<Value>>,
}

impl MoveLists<'_> {
    fn target(&mut self) -> &mut ExtentList<Value> {
        match self.target.as_mut() {
            Some(target) => &mut **target,
            None => &mut *self.source,
        }
    }
}

impl Queue {
    pub(crate) fn new(
        id: CollectionId,
        name: String,
        extent_items: u32,
        extent_limit: usize,
        session: Session,
    ) -> Self {
        Self {
            id,
            name,
            extent_items,
            state: CollectionLock::new(ExtentList::new(extent_limit)),
            session,
        }
    }

    /// Durable id
    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an item
    pub fn push(&self, item: impl Into<Value>) -> Result<QueueRef> {
        let item = item.into();
        self.session.run(|open| {
            let mut list = self.state.write();
            let (extent, generation, offset) = self.reserve(&mut list, open)?;
            open.log.write(&LogRecord::QueuePut {
                queue: self.id,
                extent,
                offset,
                value: item.clone(),
            })?;
            place(&mut list, extent, offset, item)?;
            Ok(QueueRef::new(extent, generation, offset))
        })
    }

    /// Item at `reference`, or `None` when the reference is stale or vacated
    pub fn get(&self, reference: QueueRef) -> Result<Option<Value>> {
        self.session.run(|_| {
            let list = self.state.read();
            Ok(list
                .resolve(&reference)
                .and_then(|extent| extent.get(reference.offset()))
                .cloned())
        })
    }

    /// Whether `reference` names a live item
    pub fn exists(&self, reference: QueueRef) -> Result<bool> {
        self.session.run(|_| {
            let list = self.state.read();
            Ok(list
                .resolve(&reference)
                .is_some_and(|extent| extent.exists(reference.offset())))
        })
    }

    /// Replace a live item, returning the previous one
    ///
    /// Nothing is written when the reference does not name a live item.
    pub fn set(&self, reference: QueueRef, item: impl Into<Value>) -> Result<Option<Value>> {
        let item = item.into();
        self.session.run(|open| {
            let mut list = self.state.write();
            if !is_live(&list, &reference) {
                return Ok(None);
            }
            open.log.write(&LogRecord::QueuePut {
                queue: self.id,
                extent: reference.extent(),
                offset: reference.offset(),
                value: item.clone(),
            })?;
            Ok(list
                .resolve_mut(&reference)
                .and_then(|extent| extent.set(reference.offset(), item)))
        })
    }

    /// Remove an item, reclaiming its extent once every slot is spent
    pub fn remove(&self, reference: QueueRef) -> Result<Option<Value>> {
        self.session.run(|open| {
            let mut list = self.state.write();
            if !is_live(&list, &reference) {
                return Ok(None);
            }
            open.log.write(&LogRecord::QueueRemove {
                queue: self.id,
                extent: reference.extent(),
                offset: reference.offset(),
            })?;
            let removed = list
                .resolve_mut(&reference)
                .and_then(|extent| extent.remove(reference.offset()));
            self.reclaim(&mut list, open, reference.extent())?;
            Ok(removed)
        })
    }

    /// Move an item to the tail of `target`, returning its new reference
    ///
    /// Atomic across both queues: one `QueueMove` record covers the removal
    /// and the insertion. Returns `None` when `reference` is not live.
    pub fn move_to(&self, reference: QueueRef, target: &Queue) -> Result<Option<QueueRef>> {
        if !self.session.same_open(&target.session) {
            return Err(Error::InvalidInput(format!(
                "queues {:?} and {:?} belong to different sessions",
                self.name, target.name
            )));
        }
        self.session.run(|open| {
            let mut guards = write_pair(&self.state, &target.state);
            let mut lists = match &mut guards {
                PairWriteGuard::Single(list) => MoveLists {
                    source: &mut **list,
                    target: None,
                },
                PairWriteGuard::Pair(source, dest) => MoveLists {
                    source: &mut **source,
                    target: Some(&mut **dest),
                },
            };
            if !is_live(lists.source, &reference) {
                return Ok(None);
            }

            let (extent, generation, offset) = target.reserve(lists.target(), open)?;
            open.log.write(&LogRecord::QueueMove {
                source: self.id,
                extent: reference.extent(),
                offset: reference.offset(),
                target: target.id,
                target_extent: extent,
                target_offset: offset,
            })?;
            let item = lists
                .source
                .resolve_mut(&reference)
                .and_then(|e| e.remove(reference.offset()))
                .ok_or_else(|| Error::Internal(format!("moved item {} vanished", reference)))?;
            place(lists.target(), extent, offset, item)?;
            self.reclaim(lists.source, open, reference.extent())?;
            tracing::trace!(
                from = %self.name,
                to = %target.name,
                %reference,
                "moved queue item"
            );
            Ok(Some(QueueRef::new(extent, generation, offset)))
        })
    }

    /// Drop every item and extent
    pub fn clear(&self) -> Result<()> {
        self.session.run(|open| {
            let mut list = self.state.write();
            open.log.write(&LogRecord::QueueClear { queue: self.id })?;
            list.clear();
            Ok(())
        })
    }

    /// Live item count
    pub fn size(&self) -> Result<usize> {
        self.session.run(|_| Ok(self.state.read().len()))
    }

    /// No live items
    pub fn is_empty(&self) -> Result<bool> {
        self.session.run(|_| Ok(self.state.read().is_empty()))
    }

    /// Live extent count
    pub fn extent_count(&self) -> Result<usize> {
        self.session.run(|_| Ok(self.state.read().extent_count()))
    }

    /// Iterate live items in queue order
    ///
    /// The iterator sees the extents and end offsets present now; items
    /// pushed afterwards are not visited.
    pub fn iter(&self) -> Result<QueueIter<'_>> {
        self.session.run(|_| {
            Ok(QueueIter {
                queue: self,
                cursors: self.state.read().snapshot(),
                position: 0,
                next_offset: 0,
                last: None,
                done: false,
            })
        })
    }

    /// Tail slot for the next item, allocating an extent when needed
    fn reserve(
        &self,
        list: &mut ExtentList<Value>,
        open: &OpenState,
    ) -> Result<(ExtentId, Generation, u32)> {
        if let Some(tail) = list.tail() {
            if let Some(offset) = tail.next_offset() {
                return Ok((tail.id(), tail.generation(), offset));
            }
            if tail.try_to_discard() {
                let (id, generation) = (tail.id(), tail.generation());
                open.log.write(&LogRecord::QueueRemoveExtent {
                    queue: self.id,
                    extent: id,
                    generation,
                })?;
                list.discard(id);
            }
        }
        let id = list.next_free_id()?;
        let generation = open.generations.next();
        open.log.write(&LogRecord::QueueAddExtent {
            queue: self.id,
            extent: id,
            generation,
            capacity: self.extent_items,
            end: 0,
        })?;
        list.insert(Extent::new(id, generation, self.extent_items))?;
        tracing::trace!(queue = %self.name, extent = %id, %generation, "allocated extent");
        Ok((id, generation, 0))
    }

    /// Drop an extent whose slots are all spent
    fn reclaim(&self, list: &mut ExtentList<Value>, open: &OpenState, id: ExtentId) -> Result<()> {
        let Some(extent) = list.get(id).filter(|e| e.try_to_discard()) else {
            return Ok(());
        };
        open.log.write(&LogRecord::QueueRemoveExtent {
            queue: self.id,
            extent: id,
            generation: extent.generation(),
        })?;
        list.discard(id);
        tracing::trace!(queue = %self.name, extent = %id, "reclaimed extent");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Replay and compaction
    // ------------------------------------------------------------------------

    pub(crate) fn apply_put(&self, extent: ExtentId, offset: u32, value: Value) -> Result<()> {
        let mut list = self.state.write();
        let target = list
            .get_mut(extent)
            .ok_or_else(|| self.missing_extent(extent))?;
        target.put_at(offset, value)?;
        Ok(())
    }

    pub(crate) fn apply_remove(&self, extent: ExtentId, offset: u32) -> Result<()> {
        let mut list = self.state.write();
        let target = list
            .get_mut(extent)
            .ok_or_else(|| self.missing_extent(extent))?;
        target.remove(offset);
        Ok(())
    }

    pub(crate) fn apply_add_extent(
        &self,
        extent: ExtentId,
        generation: Generation,
        capacity: u32,
        end: u32,
    ) -> Result<()> {
        if capacity == 0 || capacity > MAX_EXTENT_ITEMS {
            return Err(Error::Corruption(format!(
                "queue {:?} extent {} has capacity {}",
                self.name, extent, capacity
            )));
        }
        let mut list = self.state.write();
        list.insert(Extent::with_end(extent, generation, capacity, end)?)
    }

    pub(crate) fn apply_remove_extent(&self, extent: ExtentId, generation: Generation) -> Result<()> {
        let mut list = self.state.write();
        match list.get(extent) {
            Some(live) if live.generation() == generation => {
                list.discard(extent);
                Ok(())
            }
            Some(live) => Err(Error::Corruption(format!(
                "queue {:?} extent {} is {}, not {}",
                self.name,
                extent,
                live.generation(),
                generation
            ))),
            None => Err(self.missing_extent(extent)),
        }
    }

    pub(crate) fn apply_clear(&self) {
        self.state.write().clear();
    }

    /// Replay a move between `source` and `target` (possibly the same queue)
    pub(crate) fn apply_move(
        source: &Queue,
        extent: ExtentId,
        offset: u32,
        target: &Queue,
        target_extent: ExtentId,
        target_offset: u32,
    ) -> Result<()> {
        let mut guards = write_pair(&source.state, &target.state);
        let mut lists = match &mut guards {
            PairWriteGuard::Single(list) => MoveLists {
                source: &mut **list,
                target: None,
            },
            PairWriteGuard::Pair(from, to) => MoveLists {
                source: &mut **from,
                target: Some(&mut **to),
            },
        };
        // A rejected move leaves both queues untouched.
        let vacant = lists
            .target()
            .get(target_extent)
            .ok_or_else(|| target.missing_extent(target_extent))?
            .is_vacant(target_offset);
        if !vacant {
            return Err(Error::Corruption(format!(
                "queue {:?} move target {}:{} is not a free slot",
                target.name, target_extent, target_offset
            )));
        }
        let item = lists
            .source
            .get_mut(extent)
            .ok_or_else(|| source.missing_extent(extent))?
            .remove(offset)
            .ok_or_else(|| {
                Error::Corruption(format!(
                    "queue {:?} moves empty slot {}:{}",
                    source.name, extent, offset
                ))
            })?;
        lists
            .target()
            .get_mut(target_extent)
            .ok_or_else(|| target.missing_extent(target_extent))?
            .put_at(target_offset, item)?;
        Ok(())
    }

    /// Write this queue's live extents and items, returning the record count
    pub(crate) fn write_compacted(&self, target: &CompactionTarget) -> Result<u64> {
        let list = self.state.read();
        let mut records = 0;
        for extent in list.iter() {
            target.write(&LogRecord::QueueAddExtent {
                queue: self.id,
                extent: extent.id(),
                generation: extent.generation(),
                capacity: extent.capacity(),
                end: extent.end_offset(),
            })?;
            records += 1;
            for (offset, item) in extent.iter() {
                target.write(&LogRecord::QueuePut {
                    queue: self.id,
                    extent: extent.id(),
                    offset,
                    value: item.clone(),
                })?;
                records += 1;
            }
        }
        Ok(records)
    }

    fn missing_extent(&self, extent: ExtentId) -> Error {
        Error::Corruption(format!("queue {:?} has no extent {}", self.name, extent))
    }
}

fn is_live(list: &ExtentList<Value>, reference: &QueueRef) -> bool {
    list.resolve(reference)
        .is_some_and(|extent| extent.exists(reference.offset()))
}

/// Store `item` in the slot [`Queue::reserve`] handed out
fn place(list: &mut ExtentList<Value>, extent: ExtentId, offset: u32, item: Value) -> Result<()> {
    let placed = list.get_mut(extent).and_then(|e| e.push(item));
    if placed != Some(offset) {
        return Err(Error::Internal(format!(
            "reserved slot {}:{} was not the tail slot ({:?})",
            extent, offset, placed
        )));
    }
    Ok(())
}

// ============================================================================
// Iterator
// ============================================================================

/// Iterator over the live items of a [`Queue`]
///
/// Each step takes the queue's read lock on its own, so other threads keep
/// making progress while an iteration is paused. Items removed after the
/// snapshot are skipped; items replaced are seen with their new value.
pub struct QueueIter<'a> {
    queue: &'a Queue,
    cursors: Vec<ExtentCursor>,
    position: usize,
    next_offset: u32,
    last: Option<QueueRef>,
    done: bool,
}

impl QueueIter<'_> {
    /// Replace the item last returned by `next`
    pub fn set(&mut self, item: impl Into<Value>) -> Result<Option<Value>> {
        let reference = self.current()?;
        self.queue.set(reference, item)
    }

    /// Remove the item last returned by `next`
    pub fn remove(&mut self) -> Result<Option<Value>> {
        let reference = self.current()?;
        self.last = None;
        self.queue.remove(reference)
    }

    fn current(&self) -> Result<QueueRef> {
        self.last
            .ok_or_else(|| Error::InvalidState("iterator has no current item".to_string()))
    }

    fn step(&mut self) -> Result<Option<(QueueRef, Value)>> {
        let queue = self.queue;
        queue.session.run(|_| {
            let list = queue.state.read();
            while let Some(cursor) = self.cursors.get(self.position).copied() {
                let found = list
                    .get(cursor.id)
                    .filter(|extent| extent.generation() == cursor.generation)
                    .and_then(|extent| extent.next_occupied(self.next_offset, cursor.end));
                match found {
                    Some((offset, item)) => {
                        self.next_offset = offset + 1;
                        let reference = QueueRef::new(cursor.id, cursor.generation, offset);
                        self.last = Some(reference);
                        return Ok(Some((reference, item.clone())));
                    }
                    None => {
                        self.position += 1;
                        self.next_offset = 0;
                    }
                }
            }
            Ok(None)
        })
    }
}

impl Iterator for QueueIter<'_> {
    type Item = Result<(QueueRef, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
