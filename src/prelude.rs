//! Convenient imports for SpoolDB.
//!
//! ```no_run
//! use spooldb::prelude::*;
//!
//! let db = Database::new(Config::in_memory());
//! db.open()?;
//! db.get_index("settings")?.put("mode", "fast")?;
//! # Ok::<(), spooldb::Error>(())
//! ```

// Main entry point
pub use crate::{Config, Database, DatabaseBuilder, StorageKind};

// Error handling
pub use crate::{Error, Result};

// Collections
pub use crate::{Index, IndexIter, Queue, QueueIter};

// Core types
pub use crate::{QueueRef, TypedValue, Value};

// Lifecycle reporting
pub use crate::{CompactionSummary, MonitorResult, NoopMonitor, ProgressMonitor, ReplaySummary};
