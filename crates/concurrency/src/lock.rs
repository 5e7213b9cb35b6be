//! Per-collection reader/writer lock
//!
//! Wraps `parking_lot::RwLock`, whose task-fair policy parks newly arriving
//! readers behind a waiting writer, so a steady stream of `get` calls cannot
//! starve `push`/`remove`.
//!
//! Cross-collection operations lock two collections at once. [`write_pair`]
//! acquires them in the order of their lock identity (the lock's address), a
//! total order independent of call direction, so `a.move_to(b)` racing
//! `b.move_to(a)` cannot deadlock.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Reader/writer lock guarding one collection's state
#[derive(Debug, Default)]
pub struct CollectionLock<T> {
    inner: RwLock<T>,
}

/// Write guards over one or two collections, in argument order
pub enum PairWriteGuard<'a, T> {
    /// Both arguments were the same lock
    Single(RwLockWriteGuard<'a, T>),
    /// Distinct locks: guard of the first argument, then of the second
    Pair(RwLockWriteGuard<'a, T>, RwLockWriteGuard<'a, T>),
}

impl<T> CollectionLock<T> {
    /// Create a lock around a collection state
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Acquire in read mode
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Acquire in write mode
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Stable identity used for lock ordering
    #[inline]
    pub fn identity(&self) -> usize {
        self as *const Self as usize
    }
}

/// Write-lock two collections in a deadlock-free order
pub fn write_pair<'a, T>(
    first: &'a CollectionLock<T>,
    second: &'a CollectionLock<T>,
) -> PairWriteGuard<'a, T> {
    if first.identity() == second.identity() {
        return PairWriteGuard::Single(first.write());
    }
    if first.identity() < second.identity() {
        let a = first.write();
        let b = second.write();
        PairWriteGuard::Pair(a, b)
    } else {
        let b = second.write();
        let a = first.write();
        PairWriteGuard::Pair(a, b)
    }
}
