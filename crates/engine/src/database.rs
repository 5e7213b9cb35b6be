//! Database lifecycle
//!
//! A [`Database`] is Closed or Open. Opening installs an `OpenState` in the
//! lifecycle gate: the log store, the name catalog and every collection
//! materialized so far. Collection operations enter the gate in shared mode;
//! open, recover, defragment and close take it exclusively.
//!
//! ```text
//!            open / recover
//!   Closed ───────────────────▶ Open ──┐ defragment
//!      ▲                         │  ◀──┘
//!      └──────── close ──────────┘
//! ```
//!
//! Queue and index handles keep a `Session`: a weak link to the database
//! plus the epoch of the open that produced them. A handle outliving its
//! open fails with `InvalidState`, even after the database is reopened.

use dashmap::DashMap;
use spool_concurrency::LifecycleGate;
use spool_core::{
    CollectionId, CollectionKind, Error, NoopMonitor, ProgressMonitor, Result,
};
use spool_durability::{
    FileMedium, LogMedium, LogStats, LogStore, MemoryMedium, ReadMode, TypeCatalog,
    TypeRegistry, CATALOG_SUFFIX,
};
use spool_storage::GenerationSource;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::compaction::{self, CompactionSummary};
use crate::config::{Config, StorageKind};
use crate::index::Index;
use crate::monitor::GuardedMonitor;
use crate::names::NameCatalog;
use crate::queue::Queue;
use crate::replay::{self, ReplaySummary};

// ============================================================================
// Open state
// ============================================================================

/// Everything that exists only while the database is open
pub(crate) struct OpenState {
    pub(crate) epoch: u64,
    pub(crate) log: LogStore,
    pub(crate) names: NameCatalog,
    pub(crate) generations: Arc<GenerationSource>,
    queues: DashMap<CollectionId, Arc<Queue>>,
    indices: DashMap<CollectionId, Arc<Index>>,
    session: Session,
    extent_items: u32,
    extent_limit: usize,
}

impl OpenState {
    /// Queue bound to `id`, created on first reference
    pub(crate) fn queue(&self, id: CollectionId, name: &str) -> Arc<Queue> {
        self.queues
            .entry(id)
            .or_insert_with(|| {
                Arc::new(Queue::new(
                    id,
                    name.to_string(),
                    self.extent_items,
                    self.extent_limit,
                    self.session.clone(),
                ))
            })
            .clone()
    }

    /// Index bound to `id`, created on first reference
    pub(crate) fn index(&self, id: CollectionId, name: &str) -> Arc<Index> {
        self.indices
            .entry(id)
            .or_insert_with(|| Arc::new(Index::new(id, name.to_string(), self.session.clone())))
            .clone()
    }

    fn queue_named(&self, name: &str) -> Result<Arc<Queue>> {
        let id = self.names.get_id(&self.log, CollectionKind::Queue, name)?;
        Ok(self.queue(id, name))
    }

    fn index_named(&self, name: &str) -> Result<Arc<Index>> {
        let id = self.names.get_id(&self.log, CollectionKind::Index, name)?;
        Ok(self.index(id, name))
    }

    pub(crate) fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub(crate) fn index_count(&self) -> usize {
        self.indices.len()
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Link from a collection handle back to the open it belongs to
#[derive(Clone)]
pub(crate) struct Session {
    db: Weak<Shared>,
    epoch: u64,
}

impl Session {
    /// Run `f` against the open state, holding the gate in shared mode
    pub(crate) fn run<R>(&self, f: impl FnOnce(&OpenState) -> Result<R>) -> Result<R> {
        let shared = self.db.upgrade().ok_or_else(Error::closed)?;
        let open = shared.gate.enter()?;
        if open.epoch != self.epoch {
            return Err(Error::InvalidState(
                "collection handle belongs to a closed session".to_string(),
            ));
        }
        f(&open)
    }

    /// Whether both handles come from the same open of the same database
    pub(crate) fn same_open(&self, other: &Session) -> bool {
        self.epoch == other.epoch && Weak::ptr_eq(&self.db, &other.db)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("epoch", &self.epoch).finish()
    }
}

// ============================================================================
// Database
// ============================================================================

struct Shared {
    config: Config,
    gate: LifecycleGate<OpenState>,
    generations: Arc<GenerationSource>,
    medium: Arc<dyn LogMedium>,
    epochs: AtomicU64,
}

/// Embedded store of named queues and indices
///
/// Cloning yields another handle to the same database.
///
/// # Example
///
/// ```no_run
/// use spool_engine::{Config, Database};
///
/// let db = Database::new(Config::at("/tmp/spool.log"));
/// db.open()?;
/// let jobs = db.get_queue("jobs")?;
/// let r = jobs.push("compile")?;
/// assert_eq!(jobs.get(r)?, Some("compile".into()));
/// db.close()?;
/// # Ok::<(), spool_core::Error>(())
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<Shared>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("log", &self.inner.medium.describe())
            .field("open", &self.is_open())
            .finish()
    }
}

impl Database {
    /// Closed database over the storage named by `config`
    pub fn new(config: Config) -> Self {
        DatabaseBuilder::new().config(config).build()
    }

    /// Builder for databases with injected collaborators
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Configuration this database was built with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether the database is open
    pub fn is_open(&self) -> bool {
        self.inner.gate.is_open()
    }

    /// Open and replay the log strictly
    pub fn open(&self) -> Result<ReplaySummary> {
        self.open_with(&NoopMonitor)
    }

    /// [`open`](Self::open), reporting replay progress to `monitor`
    ///
    /// Any error leaves the database closed.
    pub fn open_with(&self, monitor: &dyn ProgressMonitor) -> Result<ReplaySummary> {
        let mut slot = self.inner.gate.exclusive();
        if slot.is_some() {
            return Err(Error::InvalidState("database is already open".to_string()));
        }
        self.inner.config.validate()?;
        let (state, summary) = self.load(ReadMode::Strict, monitor)?;
        *slot = Some(state);
        tracing::info!(
            log = %self.inner.medium.describe(),
            records = summary.records_applied,
            queues = summary.queues,
            indices = summary.indices,
            "database opened"
        );
        Ok(summary)
    }

    /// Replay the log best-effort, then compact it
    ///
    /// Recognized corruption is skipped and counted; the compacted log
    /// contains only what survived.
    pub fn recover(&self) -> Result<ReplaySummary> {
        self.recover_with(&NoopMonitor)
    }

    /// [`recover`](Self::recover), reporting progress to `monitor`
    pub fn recover_with(&self, monitor: &dyn ProgressMonitor) -> Result<ReplaySummary> {
        let mut slot = self.inner.gate.exclusive();
        if slot.is_some() {
            return Err(Error::InvalidState(
                "recover requires a closed database".to_string(),
            ));
        }
        self.inner.config.validate()?;
        let (state, summary) = self.load(ReadMode::BestEffort, monitor)?;
        if summary.has_issues() {
            tracing::warn!(log = %self.inner.medium.describe(), "{}", summary.summary());
        }
        let compacted = compaction::compact(&state, &GuardedMonitor::new(monitor, "compaction"));
        if let Err(e) = compacted {
            release(state);
            return Err(e);
        }
        *slot = Some(state);
        tracing::info!(log = %self.inner.medium.describe(), "database recovered");
        Ok(summary)
    }

    /// Rewrite the log to hold only live state
    pub fn defragment(&self) -> Result<CompactionSummary> {
        self.defragment_with(&NoopMonitor)
    }

    /// [`defragment`](Self::defragment), reporting progress to `monitor`
    pub fn defragment_with(&self, monitor: &dyn ProgressMonitor) -> Result<CompactionSummary> {
        let slot = self.inner.gate.exclusive();
        let state = slot.as_ref().ok_or_else(Error::closed)?;
        compaction::compact(state, &GuardedMonitor::new(monitor, "compaction"))
    }

    /// Flush the log and drop every in-memory collection
    ///
    /// Closing a closed database does nothing.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.inner.gate.exclusive();
        let Some(state) = slot.take() else {
            return Ok(());
        };
        let closed = state.log.close();
        tracing::info!(log = %self.inner.medium.describe(), "database closed");
        closed
    }

    /// Queue named `name`, created on first use
    pub fn get_queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.inner.gate.enter()?.queue_named(name)
    }

    /// Index named `name`, created on first use
    pub fn get_index(&self, name: &str) -> Result<Arc<Index>> {
        self.inner.gate.enter()?.index_named(name)
    }

    /// Names of every bound queue, sorted
    pub fn queue_names(&self) -> Result<Vec<String>> {
        Ok(self.inner.gate.enter()?.names.names(CollectionKind::Queue))
    }

    /// Names of every bound index, sorted
    pub fn index_names(&self) -> Result<Vec<String>> {
        Ok(self.inner.gate.enter()?.names.names(CollectionKind::Index))
    }

    /// Write and sync every buffered log record
    pub fn flush(&self) -> Result<()> {
        self.inner.gate.enter()?.log.flush()
    }

    /// Counters of the open log store
    pub fn log_stats(&self) -> Result<LogStats> {
        Ok(self.inner.gate.enter()?.log.stats())
    }

    fn load(
        &self,
        mode: ReadMode,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(OpenState, ReplaySummary)> {
        let started = Instant::now();
        let config = &self.inner.config;
        let medium = &self.inner.medium;
        let registry: Arc<dyn TypeRegistry> =
            Arc::new(TypeCatalog::open(medium.sibling(CATALOG_SUFFIX))?);
        let log = LogStore::open(Arc::clone(medium), registry, config.log_options())?;
        let epoch = self.inner.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        let state = OpenState {
            epoch,
            log,
            names: NameCatalog::new(),
            generations: Arc::clone(&self.inner.generations),
            queues: DashMap::new(),
            indices: DashMap::new(),
            session: Session {
                db: Arc::downgrade(&self.inner),
                epoch,
            },
            extent_items: config.max_extent_items,
            extent_limit: config.max_extents_per_queue,
        };
        tracing::debug!(
            log = %medium.describe(),
            ?mode,
            flush_thread = %config.flush_thread_name,
            priority = config.flush_thread_priority,
            "replaying log"
        );

        let replayed = replay::replay(&state, mode, &GuardedMonitor::new(monitor, "replay"))
            .and_then(|summary| state.log.end_replay().map(|()| summary));
        match replayed {
            Ok(mut summary) => {
                summary.duration_micros = started.elapsed().as_micros() as u64;
                Ok((state, summary))
            }
            Err(e) => {
                tracing::error!(log = %medium.describe(), error = %e, "replay failed");
                release(state);
                Err(e)
            }
        }
    }
}

fn release(state: OpenState) {
    if let Err(e) = state.log.close() {
        tracing::warn!(error = %e, "closing log after failed load");
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Database`]
///
/// The generation source and log medium are normally derived from the
/// configuration; tests inject their own to control allocation tags or to
/// inspect the bytes written.
#[derive(Default)]
pub struct DatabaseBuilder {
    config: Config,
    generations: Option<Arc<GenerationSource>>,
    medium: Option<Arc<dyn LogMedium>>,
}

impl DatabaseBuilder {
    /// Builder with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config`
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Draw extent generations from `generations`
    pub fn generations(mut self, generations: Arc<GenerationSource>) -> Self {
        self.generations = Some(generations);
        self
    }

    /// Write the log to `medium` instead of the configured storage
    pub fn medium(mut self, medium: Arc<dyn LogMedium>) -> Self {
        self.medium = Some(medium);
        self
    }

    /// Closed database
    pub fn build(self) -> Database {
        let medium: Arc<dyn LogMedium> = match self.medium {
            Some(medium) => medium,
            None => match self.config.storage {
                StorageKind::File => Arc::new(FileMedium::new(&self.config.path)),
                StorageKind::Memory => Arc::new(MemoryMedium::new(
                    self.config.path.to_string_lossy().into_owned(),
                )),
            },
        };
        Database {
            inner: Arc::new(Shared {
                config: self.config,
                gate: LifecycleGate::new(),
                generations: self.generations.unwrap_or_default(),
                medium,
                epochs: AtomicU64::new(0),
            }),
        }
    }
}
