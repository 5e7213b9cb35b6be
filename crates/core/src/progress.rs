//! Progress reporting for long-running lifecycle operations
//!
//! Replay and compaction report through a caller-supplied
//! [`ProgressMonitor`]. Monitors are observers only: the engine catches and
//! logs any error they return (or panic they raise) and carries on.

/// Result returned by monitor callbacks
pub type MonitorResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives start/progress/end callbacks
///
/// `total` and `done` are in task-specific units: bytes of log for replay,
/// collections written for compaction.
pub trait ProgressMonitor: Send + Sync {
    /// A task begins
    fn start(&self, task: &str, total: Option<u64>) -> MonitorResult;

    /// Units completed so far
    fn progress(&self, done: u64) -> MonitorResult;

    /// The task finished (successfully or not)
    fn end(&self) -> MonitorResult;
}

/// Monitor that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ProgressMonitor for NoopMonitor {
    fn start(&self, _task: &str, _total: Option<u64>) -> MonitorResult {
        Ok(())
    }

    fn progress(&self, _done: u64) -> MonitorResult {
        Ok(())
    }

    fn end(&self) -> MonitorResult {
        Ok(())
    }
}
