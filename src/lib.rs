//! # SpoolDB
//!
//! Embedded, crash-consistent storage for named queues and indices.
//!
//! Every mutation is applied in memory and appended to a checksummed
//! write-ahead log inside the same critical section. Opening a database
//! replays the log; defragmenting rewrites it to live state only.
//!
//! ## Quick Start
//!
//! ```no_run
//! use spooldb::prelude::*;
//!
//! let db = Database::new(Config::at("./spool.log"));
//! db.open()?;
//!
//! // Queues hand out stable references
//! let jobs = db.get_queue("jobs")?;
//! let job = jobs.push("build")?;
//! let done = db.get_queue("done")?;
//! let finished = jobs.move_to(job, &done)?;
//!
//! // Indices map keys to values
//! let owners = db.get_index("owners")?;
//! owners.put("build", "ci")?;
//!
//! db.close()?;
//! # let _ = finished;
//! # Ok::<(), spooldb::Error>(())
//! ```
//!
//! ## Recovery
//!
//! [`Database::open`] replays strictly and refuses a damaged log.
//! [`Database::recover`] skips damaged records, then compacts the log so the
//! damage is gone on the next open.
//!
//! ## Crates
//!
//! - [`spool_core`]: errors, ids, references, values
//! - [`spool_storage`]: queue extents
//! - [`spool_concurrency`]: lifecycle gate and collection locks
//! - [`spool_durability`]: log format, media, log store
//! - [`spool_engine`]: database, queues, indices

#![warn(missing_docs)]

pub mod prelude;

pub use spool_core::{
    CollectionId, CollectionKind, Error, ExtentId, Generation, MonitorResult, NoopMonitor,
    ProgressMonitor, QueueRef, Result, TypedValue, Value,
};
pub use spool_durability::{FileMedium, LogMedium, LogStats, MemoryMedium};
pub use spool_engine::{
    CompactionSummary, Config, Database, DatabaseBuilder, Index, IndexIter, Queue, QueueIter,
    ReplaySummary, StorageKind,
};
pub use spool_storage::GenerationSource;

pub use spool_concurrency;
pub use spool_core;
pub use spool_durability;
pub use spool_engine;
pub use spool_storage;
