//! Index collection
//!
//! A key-value map of non-null [`Value`]s. Mutations log `IndexPut`,
//! `IndexRemove` or `IndexClear` under the index's write lock.
//!
//! Iteration is fail-fast: inserting a new key, removing a key or clearing
//! the index bumps a modification counter, and an iterator that sees the
//! counter move returns [`Error::ConcurrentModification`]. Overwriting the
//! value of an existing key is not structural.

use rustc_hash::FxHashMap;
use spool_concurrency::CollectionLock;
use spool_core::{CollectionId, Error, Result, Value};
use spool_durability::{CompactionTarget, LogRecord};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::database::{OpenState, Session};

/// Named key-value index
pub struct Index {
    id: CollectionId,
    name: String,
    state: CollectionLock<FxHashMap<Value, Value>>,
    /// Structural modifications; changed only under the write lock
    mod_count: AtomicU64,
    session: Session,
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

fn non_null(what: &str, value: Value) -> Result<Value> {
    if value.is_null() {
        return Err(Error::InvalidInput(format!("index {} must not be null", what)));
    }
    Ok(value)
}

impl Index {
    pub(crate) fn new(id: CollectionId, name: String, session: Session) -> Self {
        Self {
            id,
            name,
            state: CollectionLock::new(FxHashMap::default()),
            mod_count: AtomicU64::new(0),
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

    /// Value stored under `key`
    pub fn get(&self, key: impl Into<Value>) -> Result<Option<Value>> {
        let key = non_null("key", key.into())?;
        self.session
            .run(|_| Ok(self.state.read().get(&key).cloned()))
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: impl Into<Value>) -> Result<bool> {
        let key = non_null("key", key.into())?;
        self.session
            .run(|_| Ok(self.state.read().contains_key(&key)))
    }

    /// Store `value` under `key`, returning the previous value
    pub fn put(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = non_null("key", key.into())?;
        let value = non_null("value", value.into())?;
        self.session.run(|open| {
            let mut map = self.state.write();
            open.log.write(&LogRecord::IndexPut {
                index: self.id,
                key: key.clone(),
                value: value.clone(),
            })?;
            let previous = map.insert(key, value);
            if previous.is_none() {
                self.mod_count.fetch_add(1, Ordering::SeqCst);
            }
            Ok(previous)
        })
    }

    /// Remove `key`, returning its value
    ///
    /// Nothing is written when the key is absent.
    pub fn remove(&self, key: impl Into<Value>) -> Result<Option<Value>> {
        let key = non_null("key", key.into())?;
        self.session
            .run(|open| self.remove_entry(open, &mut self.state.write(), &key))
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        self.session.run(|open| {
            let mut map = self.state.write();
            open.log.write(&LogRecord::IndexClear { index: self.id })?;
            map.clear();
            self.mod_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Entry count
    pub fn size(&self) -> Result<usize> {
        self.session.run(|_| Ok(self.state.read().len()))
    }

    /// No entries
    pub fn is_empty(&self) -> Result<bool> {
        self.session.run(|_| Ok(self.state.read().is_empty()))
    }

    /// Snapshot of every key, in no particular order
    pub fn keys(&self) -> Result<Vec<Value>> {
        self.session
            .run(|_| Ok(self.state.read().keys().cloned().collect()))
    }

    /// Fail-fast iterator over the entries
    pub fn iter(&self) -> Result<IndexIter<'_>> {
        self.session.run(|_| {
            let map = self.state.read();
            Ok(IndexIter {
                index: self,
                keys: map.keys().cloned().collect(),
                position: 0,
                expected: self.mod_count.load(Ordering::SeqCst),
                last: None,
                done: false,
            })
        })
    }

    fn remove_entry(
        &self,
        open: &OpenState,
        map: &mut FxHashMap<Value, Value>,
        key: &Value,
    ) -> Result<Option<Value>> {
        if !map.contains_key(key) {
            return Ok(None);
        }
        open.log.write(&LogRecord::IndexRemove {
            index: self.id,
            key: key.clone(),
        })?;
        self.mod_count.fetch_add(1, Ordering::SeqCst);
        Ok(map.remove(key))
    }

    // ------------------------------------------------------------------------
    // Replay and compaction
    // ------------------------------------------------------------------------

    pub(crate) fn apply_put(&self, key: Value, value: Value) -> Result<()> {
        if key.is_null() || value.is_null() {
            return Err(Error::Corruption(format!(
                "index {:?} holds a null key or value",
                self.name
            )));
        }
        self.state.write().insert(key, value);
        Ok(())
    }

    pub(crate) fn apply_remove(&self, key: &Value) {
        self.state.write().remove(key);
    }

    pub(crate) fn apply_clear(&self) {
        self.state.write().clear();
    }

    pub(crate) fn write_compacted(&self, target: &CompactionTarget) -> Result<u64> {
        let map = self.state.read();
        for (key, value) in map.iter() {
            target.write(&LogRecord::IndexPut {
                index: self.id,
                key: key.clone(),
                value: value.clone(),
            })?;
        }
        Ok(map.len() as u64)
    }
}

// ============================================================================
// Iterator
// ============================================================================

/// Fail-fast iterator over the entries of an [`Index`]
pub struct IndexIter<'a> {
    index: &'a Index,
    keys: Vec<Value>,
    position: usize,
    expected: u64,
    last: Option<Value>,
    done: bool,
}

impl IndexIter<'_> {
    /// Remove the entry last returned by `next`
    ///
    /// The iterator stays valid.
    pub fn remove(&mut self) -> Result<Option<Value>> {
        let key = self
            .last
            .take()
            .ok_or_else(|| Error::InvalidState("iterator has no current entry".to_string()))?;
        let index = self.index;
        index.session.run(|open| {
            let mut map = index.state.write();
            if index.mod_count.load(Ordering::SeqCst) != self.expected {
                return Err(Error::ConcurrentModification);
            }
            let removed = index.remove_entry(open, &mut map, &key)?;
            self.expected = index.mod_count.load(Ordering::SeqCst);
            Ok(removed)
        })
    }

    fn step(&mut self) -> Result<Option<(Value, Value)>> {
        let index = self.index;
        index.session.run(|_| {
            let map = index.state.read();
            if index.mod_count.load(Ordering::SeqCst) != self.expected {
                return Err(Error::ConcurrentModification);
            }
            while let Some(key) = self.keys.get(self.position) {
                self.position += 1;
                if let Some(value) = map.get(key) {
                    self.last = Some(key.clone());
                    return Ok(Some((key.clone(), value.clone())));
                }
            }
            Ok(None)
        })
    }
}

impl Iterator for IndexIter<'_> {
    type Item = Result<(Value, Value)>;

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
