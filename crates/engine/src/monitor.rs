//! Progress monitor guard
//!
//! Long-running lifecycle tasks (replay, compaction) report to a
//! caller-supplied [`ProgressMonitor`]. The monitor is foreign code: an error
//! it returns or a panic it raises is logged and swallowed so it can never
//! abort the task it observes.

use spool_core::{MonitorResult, ProgressMonitor};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Wrapper that isolates the engine from monitor failures
pub(crate) struct GuardedMonitor<'a> {
    inner: &'a dyn ProgressMonitor,
    task: &'static str,
}

impl<'a> GuardedMonitor<'a> {
    pub(crate) fn new(inner: &'a dyn ProgressMonitor, task: &'static str) -> Self {
        Self { inner, task }
    }

    pub(crate) fn start(&self, total: Option<u64>) {
        let task = self.task;
        self.call("start", || self.inner.start(task, total));
    }

    pub(crate) fn progress(&self, done: u64) {
        self.call("progress", || self.inner.progress(done));
    }

    pub(crate) fn end(&self) {
        self.call("end", || self.inner.end());
    }

    fn call<F: FnOnce() -> MonitorResult>(&self, method: &'static str, f: F) {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(task = self.task, method, error = %e, "progress monitor failed");
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".to_string());
                tracing::warn!(task = self.task, method, panic = %message, "progress monitor panicked");
            }
        }
    }
}
