//! Log compaction
//!
//! Writes the live state of an open database into a fresh log and swaps it
//! in. The compacted log holds, in order:
//!
//! 1. a `GenerationFloor` record with the next unallocated generation
//! 2. every name binding, in id order
//! 3. per queue: each live extent (`QueueAddExtent` with its end offset)
//!    followed by its live items at their original offsets
//! 4. per index: one `IndexPut` per entry
//!
//! Extents keep their ids, generations and end offsets, so every
//! outstanding [`QueueRef`](spool_core::QueueRef) stays valid. The caller
//! holds the lifecycle gate exclusively for the whole run.

use spool_core::{CollectionKind, Result};
use spool_durability::{CompactionTarget, LogRecord};
use std::time::Instant;

use crate::database::OpenState;
use crate::monitor::GuardedMonitor;

/// Outcome of a compaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionSummary {
    /// Records in the compacted log
    pub records_written: u64,
    /// Log size before compaction
    pub bytes_before: u64,
    /// Log size after compaction
    pub bytes_after: u64,
    /// Wall time, in microseconds
    pub duration_micros: u64,
}

/// Rewrite the log of `open` to its live state
pub(crate) fn compact(open: &OpenState, monitor: &GuardedMonitor<'_>) -> Result<CompactionSummary> {
    let started = Instant::now();
    open.log.flush()?;
    let bytes_before = open.log.position();
    let bindings = open.names.bindings();
    monitor.start(Some(bindings.len() as u64));

    let target = match open.log.start_compaction() {
        Ok(target) => target,
        Err(e) => {
            monitor.end();
            return Err(e);
        }
    };
    let written = write_live_state(open, &target, monitor);
    monitor.end();
    let records_written = match written {
        Ok(records) => records,
        Err(e) => {
            if let Err(abort) = open.log.finish_compaction(target, false) {
                tracing::warn!(error = %abort, "discarding compaction target");
            }
            return Err(e);
        }
    };
    open.log.finish_compaction(target, true)?;

    let summary = CompactionSummary {
        records_written,
        bytes_before,
        bytes_after: open.log.position(),
        duration_micros: started.elapsed().as_micros() as u64,
    };
    tracing::info!(
        records = summary.records_written,
        bytes_before = summary.bytes_before,
        bytes_after = summary.bytes_after,
        "log compacted"
    );
    Ok(summary)
}

fn write_live_state(
    open: &OpenState,
    target: &CompactionTarget,
    monitor: &GuardedMonitor<'_>,
) -> Result<u64> {
    let bindings = open.names.bindings();
    target.write(&LogRecord::GenerationFloor {
        generation: open.generations.peek(),
    })?;
    for (id, kind, name) in &bindings {
        target.write(&LogRecord::NameBinding {
            id: *id,
            kind: *kind,
            name: name.clone(),
        })?;
    }
    let mut records = 1 + bindings.len() as u64;
    for (done, (id, kind, name)) in bindings.iter().enumerate() {
        records += match kind {
            CollectionKind::Queue => open.queue(*id, name).write_compacted(target)?,
            CollectionKind::Index => open.index(*id, name).write_compacted(target)?,
        };
        monitor.progress(done as u64 + 1);
    }
    Ok(records)
}
