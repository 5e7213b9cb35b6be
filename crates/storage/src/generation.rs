//! Generation counter for extent allocation
//!
//! Every extent gets a fresh [`Generation`] when it is created. The source is
//! owned by the database (not a process-wide static) so tests can start it at
//! a known value, and replay can push it past every generation already
//! recorded in the log.

use spool_core::Generation;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic generation counter
#[derive(Debug)]
pub struct GenerationSource {
    /// Next generation to hand out
    next: AtomicU64,
}

impl GenerationSource {
    /// Create a source whose first generation is `first`
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next generation
    #[inline]
    pub fn next(&self) -> Generation {
        Generation(self.next.fetch_add(1, Ordering::AcqRel))
    }

    /// Ensure future generations are strictly greater than `seen`
    ///
    /// Called during replay for every generation found in the log.
    pub fn observe(&self, seen: Generation) {
        self.next.fetch_max(seen.0.saturating_add(1), Ordering::AcqRel);
    }

    /// Ensure future generations are at least `floor`
    pub fn raise_floor(&self, floor: Generation) {
        self.next.fetch_max(floor.0, Ordering::AcqRel);
    }

    /// Peek at the value the next call to [`next`](Self::next) returns
    pub fn peek(&self) -> Generation {
        Generation(self.next.load(Ordering::Acquire))
    }
}

impl Default for GenerationSource {
    fn default() -> Self {
        Self::starting_at(1)
    }
}
