//! Name catalog
//!
//! Binds collection names to durable [`CollectionId`]s. Queues and indices
//! live in separate namespaces but draw ids from one shared space, bounded
//! by [`MAX_COLLECTIONS`]. A binding is logged before the id is published,
//! so no record can reference an id the log does not bind.

use dashmap::DashMap;
use parking_lot::Mutex;
use spool_core::{CollectionId, CollectionKind, Error, Result, MAX_COLLECTIONS};
use spool_durability::{LogRecord, LogStore};

/// Name ↔ id bindings of one open database
#[derive(Debug)]
pub struct NameCatalog {
    queues: DashMap<String, CollectionId>,
    indices: DashMap<String, CollectionId>,
    by_id: DashMap<CollectionId, (CollectionKind, String)>,
    next_id: Mutex<u32>,
    limit: usize,
}

impl NameCatalog {
    /// Empty catalog over the full id space
    pub fn new() -> Self {
        Self::with_limit(MAX_COLLECTIONS)
    }

    /// Empty catalog handing out at most `limit` ids
    pub fn with_limit(limit: usize) -> Self {
        Self {
            queues: DashMap::new(),
            indices: DashMap::new(),
            by_id: DashMap::new(),
            next_id: Mutex::new(0),
            limit,
        }
    }

    fn namespace(&self, kind: CollectionKind) -> &DashMap<String, CollectionId> {
        match kind {
            CollectionKind::Queue => &self.queues,
            CollectionKind::Index => &self.indices,
        }
    }

    /// Id bound to `name`, binding the next free id on first use
    pub fn get_id(&self, log: &LogStore, kind: CollectionKind, name: &str) -> Result<CollectionId> {
        if let Some(id) = self.namespace(kind).get(name) {
            return Ok(*id);
        }
        let mut next = self.next_id.lock();
        if let Some(id) = self.namespace(kind).get(name) {
            return Ok(*id);
        }
        if *next as usize >= self.limit {
            return Err(Error::Capacity {
                resource: "collection id",
                limit: self.limit,
            });
        }
        let id = CollectionId(*next);
        log.write(&LogRecord::NameBinding {
            id,
            kind,
            name: name.to_string(),
        })?;
        *next += 1;
        self.by_id.insert(id, (kind, name.to_string()));
        self.namespace(kind).insert(name.to_string(), id);
        tracing::debug!(%id, %kind, name, "bound collection name");
        Ok(id)
    }

    /// Name bound to `id`
    pub fn get_name(&self, id: CollectionId) -> Result<String> {
        self.by_id
            .get(&id)
            .map(|entry| entry.1.clone())
            .ok_or_else(|| Error::Corruption(format!("no name bound to collection {}", id)))
    }

    /// Kind bound to `id`
    pub fn kind_of(&self, id: CollectionId) -> Option<CollectionKind> {
        self.by_id.get(&id).map(|entry| entry.0)
    }

    /// Names of one kind, sorted
    pub fn names(&self, kind: CollectionKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespace(kind)
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Every binding, in id order
    pub fn bindings(&self) -> Vec<(CollectionId, CollectionKind, String)> {
        let mut all: Vec<_> = self
            .by_id
            .iter()
            .map(|entry| (*entry.key(), entry.0, entry.1.clone()))
            .collect();
        all.sort_by_key(|(id, _, _)| *id);
        all
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// No bindings
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Restore a binding read from the log
    ///
    /// Rebinding the same name to the same id is accepted; any conflict is
    /// corruption.
    pub fn replay(&self, id: CollectionId, kind: CollectionKind, name: &str) -> Result<()> {
        if id.index() >= self.limit {
            return Err(Error::Corruption(format!(
                "collection id {} outside the id space",
                id
            )));
        }
        let mut next = self.next_id.lock();
        if let Some(existing) = self.by_id.get(&id) {
            if existing.0 == kind && existing.1 == name {
                return Ok(());
            }
            return Err(Error::Corruption(format!(
                "collection {} bound to {} {:?} and {} {:?}",
                id, existing.0, existing.1, kind, name
            )));
        }
        if let Some(other) = self.namespace(kind).get(name) {
            return Err(Error::Corruption(format!(
                "{} {:?} bound to {} and {}",
                kind,
                name,
                *other,
                id
            )));
        }
        self.by_id.insert(id, (kind, name.to_string()));
        self.namespace(kind).insert(name.to_string(), id);
        *next = (*next).max(id.as_u32() + 1);
        Ok(())
    }
}

impl Default for NameCatalog {
    fn default() -> Self {
        Self::new()
    }
}
