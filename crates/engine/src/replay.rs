//! Log replay
//!
//! Rebuilds the open state from the log, record by record. Every record is
//! checked against the name catalog before it is applied: a record naming an
//! unbound id, or an id bound to the other kind, is corruption.
//!
//! In strict mode the first error aborts the open. In best-effort mode
//! recognized corruption ([`Error::is_corruption`]) is counted and skipped,
//! whether it comes from the frame layer or from applying a record; any
//! other error still aborts.

use spool_core::{CollectionId, CollectionKind, Error, Result};
use spool_durability::{LogRecord, ReadMode};
use std::sync::Arc;

use crate::database::OpenState;
use crate::index::Index;
use crate::monitor::GuardedMonitor;
use crate::queue::Queue;

/// Records between progress reports
const PROGRESS_EVERY: u64 = 1024;

/// Outcome of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records applied to memory
    pub records_applied: u64,
    /// Decoded records rejected as inconsistent (best-effort only)
    pub records_skipped: u64,
    /// Damaged frame regions skipped (best-effort only)
    pub damaged_frames: u64,
    /// Frames whose payload did not decode (best-effort only)
    pub undecodable_records: u64,
    /// Bytes skipped while resynchronizing
    pub skipped_bytes: u64,
    /// The log ended in a partially written frame
    pub torn_tail: bool,
    /// Queues materialized
    pub queues: usize,
    /// Indices materialized
    pub indices: usize,
    /// Wall time of the open, in microseconds
    pub duration_micros: u64,
}

impl ReplaySummary {
    /// One-line description for logs
    pub fn summary(&self) -> String {
        format!(
            "Replay complete: {} records applied, {} skipped, {} damaged frames ({} bytes), {} undecodable, {} queues, {} indices, {:.2}ms{}",
            self.records_applied,
            self.records_skipped,
            self.damaged_frames,
            self.skipped_bytes,
            self.undecodable_records,
            self.queues,
            self.indices,
            self.duration_micros as f64 / 1000.0,
            if self.torn_tail { ", torn tail cut" } else { "" }
        )
    }

    /// Whether anything in the log had to be skipped or cut
    pub fn has_issues(&self) -> bool {
        self.records_skipped > 0
            || self.damaged_frames > 0
            || self.undecodable_records > 0
            || self.torn_tail
    }
}

/// Replay the whole log into `open`
pub(crate) fn replay(
    open: &OpenState,
    mode: ReadMode,
    monitor: &GuardedMonitor<'_>,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    monitor.start(open.log.medium().len().ok());

    let result = run(open, mode, monitor, &mut summary);
    monitor.end();
    result?;

    let stats = open.log.stats();
    summary.damaged_frames = stats.damaged_frames;
    summary.undecodable_records = stats.undecodable_records;
    summary.skipped_bytes = stats.skipped_bytes;
    summary.torn_tail = stats.torn_tail;
    summary.queues = open.queue_count();
    summary.indices = open.index_count();
    Ok(summary)
}

fn run(
    open: &OpenState,
    mode: ReadMode,
    monitor: &GuardedMonitor<'_>,
    summary: &mut ReplaySummary,
) -> Result<()> {
    while let Some(record) = open.log.read(mode)? {
        let kind = record.kind_name();
        match apply(open, record) {
            Ok(()) => summary.records_applied += 1,
            Err(e) if mode == ReadMode::BestEffort && e.is_corruption() => {
                summary.records_skipped += 1;
                tracing::debug!(record = kind, error = %e, "skipping inconsistent record");
            }
            Err(e) => {
                tracing::debug!(record = kind, error = %e, "replay stopped");
                return Err(e);
            }
        }
        let seen = summary.records_applied + summary.records_skipped;
        if seen % PROGRESS_EVERY == 0 {
            monitor.progress(open.log.replay_offset());
        }
    }
    monitor.progress(open.log.replay_offset());
    Ok(())
}

fn queue(open: &OpenState, id: CollectionId) -> Result<Arc<Queue>> {
    let name = bound(open, id, CollectionKind::Queue)?;
    Ok(open.queue(id, &name))
}

fn index(open: &OpenState, id: CollectionId) -> Result<Arc<Index>> {
    let name = bound(open, id, CollectionKind::Index)?;
    Ok(open.index(id, &name))
}

fn bound(open: &OpenState, id: CollectionId, kind: CollectionKind) -> Result<String> {
    match open.names.kind_of(id) {
        Some(found) if found == kind => open.names.get_name(id),
        Some(found) => Err(Error::Corruption(format!(
            "{} record names {} {}",
            kind, found, id
        ))),
        None => Err(Error::Corruption(format!(
            "{} record names unbound collection {}",
            kind, id
        ))),
    }
}

fn apply(open: &OpenState, record: LogRecord) -> Result<()> {
    match record {
        LogRecord::NameBinding { id, kind, name } => open.names.replay(id, kind, &name),
        LogRecord::QueuePut {
            queue: id,
            extent,
            offset,
            value,
        } => queue(open, id)?.apply_put(extent, offset, value),
        LogRecord::QueueRemove {
            queue: id,
            extent,
            offset,
        } => queue(open, id)?.apply_remove(extent, offset),
        LogRecord::QueueAddExtent {
            queue: id,
            extent,
            generation,
            capacity,
            end,
        } => {
            queue(open, id)?.apply_add_extent(extent, generation, capacity, end)?;
            open.generations.observe(generation);
            Ok(())
        }
        LogRecord::QueueRemoveExtent {
            queue: id,
            extent,
            generation,
        } => {
            queue(open, id)?.apply_remove_extent(extent, generation)?;
            open.generations.observe(generation);
            Ok(())
        }
        LogRecord::QueueMove {
            source,
            extent,
            offset,
            target,
            target_extent,
            target_offset,
        } => {
            let source = queue(open, source)?;
            let target = queue(open, target)?;
            Queue::apply_move(&source, extent, offset, &target, target_extent, target_offset)
        }
        LogRecord::QueueClear { queue: id } => {
            queue(open, id)?.apply_clear();
            Ok(())
        }
        LogRecord::IndexPut {
            index: id,
            key,
            value,
        } => index(open, id)?.apply_put(key, value),
        LogRecord::IndexRemove { index: id, key } => {
            index(open, id)?.apply_remove(&key);
            Ok(())
        }
        LogRecord::IndexClear { index: id } => {
            index(open, id)?.apply_clear();
            Ok(())
        }
        LogRecord::GenerationFloor { generation } => {
            open.generations.raise_floor(generation);
            Ok(())
        }
    }
}
