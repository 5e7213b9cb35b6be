//! Database-wide shared/exclusive gate
//!
//! The gate wraps the open-state of a database in a single
//! `parking_lot::RwLock<Option<S>>`:
//!
//! | Mode | Taken by | Sees |
//! |------|----------|------|
//! | shared (`enter`) | every collection operation | `&S`, or a state error when closed |
//! | exclusive (`exclusive`) | open, recover, close, defragment | `&mut Option<S>` |
//!
//! Shared entry uses `read_recursive`, so an operation that re-enters the
//! gate (a queue move reading both queues, an iterator step inside a loop
//! holding another guard) cannot deadlock behind a queued exclusive request.
//! The exclusive mode waits for every in-flight shared holder to finish and
//! then blocks new operations until it is released.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use spool_core::{Error, Result};

/// Shared access to the open state
pub type SharedGuard<'a, S> = MappedRwLockReadGuard<'a, S>;

/// Exclusive access to the lifecycle slot
pub type ExclusiveGuard<'a, S> = RwLockWriteGuard<'a, Option<S>>;

/// Lifecycle gate over an optional open state
#[derive(Debug)]
pub struct LifecycleGate<S> {
    state: RwLock<Option<S>>,
}

impl<S> LifecycleGate<S> {
    /// Create a closed gate
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    /// Enter in shared mode
    ///
    /// Fails with `InvalidState` when no open state is installed.
    pub fn enter(&self) -> Result<SharedGuard<'_, S>> {
        let guard = self.state.read_recursive();
        RwLockReadGuard::try_map(guard, Option::as_ref).map_err(|_| Error::closed())
    }

    /// Enter in exclusive mode
    pub fn exclusive(&self) -> ExclusiveGuard<'_, S> {
        self.state.write()
    }

    /// Whether an open state is installed
    pub fn is_open(&self) -> bool {
        self.state.read_recursive().is_some()
    }
}

impl<S> Default for LifecycleGate<S> {
    fn default() -> Self {
        Self::new()
    }
}
