//! Log store
//!
//! The [`LogStore`] owns one log medium and everything needed to use it:
//! frame scanning for replay, the record codec, the write buffer and its
//! background flusher, and the compaction swap.
//!
//! ## Lifecycle
//!
//! ```text
//! open ──► read … read ──► end_replay ──► write/flush … ──► close
//!                                          │
//!                          start_compaction ──► finish_compaction
//! ```
//!
//! ## Compaction states
//!
//! | State | Entered by | Left by |
//! |-------|------------|---------|
//! | `Idle` | open, successful swap, abort | `start_compaction` |
//! | `Compacting` | `start_compaction` | `finish_compaction` |
//! | `Swapping` | `finish_compaction(.., true)` | swap done (`Idle`) or I/O error (`Failed`) |
//! | `Failed` | swap error | `start_compaction` |

use parking_lot::Mutex;
use spool_core::{Error, Result};
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::TypeRegistry;
use crate::codec::RecordCodec;
use crate::flusher::{Flusher, FlusherOptions, WriteBuffer};
use crate::format::{encode_frame, FrameReader, ReadMode};
use crate::medium::LogMedium;
use crate::record::LogRecord;

/// Sibling suffix of a compaction target
pub const COMPACTION_SUFFIX: &str = ".compact";

// ============================================================================
// Options
// ============================================================================

/// Log store options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Largest accepted payload in bytes
    pub max_record_size: usize,
    /// Buffered records before a flush is forced
    pub buffer_size: usize,
    /// Maximum time a record stays buffered
    pub flush_interval: Duration,
    /// Run a background flusher thread
    pub background_flush: bool,
    /// Name of the flusher thread
    pub thread_name: String,
    /// Advisory flusher priority, 1 to 10
    pub thread_priority: u8,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            max_record_size: 16 * 1024 * 1024,
            buffer_size: 4096,
            flush_interval: Duration::from_millis(200),
            background_flush: true,
            thread_name: "spool-log-flush".to_string(),
            thread_priority: 5,
        }
    }
}

impl LogOptions {
    /// Options without a background thread; only full buffers and explicit
    /// flushes reach the medium
    pub fn foreground() -> Self {
        LogOptions {
            background_flush: false,
            ..Default::default()
        }
    }

    fn flusher(&self) -> FlusherOptions {
        FlusherOptions {
            thread_name: self.thread_name.clone(),
            priority: self.thread_priority,
            interval: self.flush_interval,
        }
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Compaction state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionState {
    /// No compaction in progress
    Idle,
    /// A target is being written
    Compacting,
    /// The target is replacing the log
    Swapping,
    /// The last swap failed; the previous log is still in use
    Failed,
}

/// Log store counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogStats {
    /// Records decoded during replay
    pub records_read: u64,
    /// Damaged frame regions skipped during replay
    pub damaged_frames: u64,
    /// Bytes skipped while resynchronizing
    pub skipped_bytes: u64,
    /// Frames with a valid checksum whose payload did not decode
    pub undecodable_records: u64,
    /// Replay ended at a torn frame
    pub torn_tail: bool,
    /// Records accepted by `write`
    pub records_written: u64,
    /// Completed flushes
    pub flushes: u64,
    /// Bytes written to the medium
    pub bytes_flushed: u64,
}

/// Fresh log being filled by a compaction
///
/// Obtained from [`LogStore::start_compaction`] and handed back to
/// [`LogStore::finish_compaction`].
pub struct CompactionTarget {
    store: LogStore,
}

impl CompactionTarget {
    /// Append a record to the compacted log
    pub fn write(&self, record: &LogRecord) -> Result<()> {
        self.store.write(record)
    }

    /// Records written so far
    pub fn records_written(&self) -> u64 {
        self.store.records_written.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for CompactionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactionTarget")
            .field("medium", &self.store.medium.describe())
            .field("records", &self.records_written())
            .finish()
    }
}

// ============================================================================
// Log store
// ============================================================================

type Reader = FrameReader<Box<dyn Read + Send>>;

/// Durable, checksummed, buffered record log
pub struct LogStore {
    medium: Arc<dyn LogMedium>,
    codec: RecordCodec,
    options: LogOptions,
    buffer: Arc<WriteBuffer>,
    flusher: Mutex<Option<Flusher>>,
    reader: Mutex<Option<Reader>>,
    read_stats: Mutex<LogStats>,
    state: Mutex<CompactionState>,
    closed: AtomicBool,
    position: AtomicU64,
    records_written: AtomicU64,
}

impl fmt::Debug for LogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStore")
            .field("medium", &self.medium.describe())
            .field("position", &self.position())
            .field("state", &self.compaction_state())
            .finish()
    }
}

impl LogStore {
    /// Open the log on `medium`, ready for replay
    pub fn open(
        medium: Arc<dyn LogMedium>,
        registry: Arc<dyn TypeRegistry>,
        options: LogOptions,
    ) -> Result<Self> {
        if options.max_record_size < 1 || options.buffer_size < 1 {
            return Err(Error::Config(
                "log record size and buffer size must be positive".to_string(),
            ));
        }
        let reader = FrameReader::new(medium.open_reader()?, options.max_record_size);
        let writer = medium.open_appender()?;
        let buffer = Arc::new(WriteBuffer::new(writer, options.buffer_size));
        let flusher = if options.background_flush {
            Some(Flusher::spawn(Arc::clone(&buffer), &options.flusher())?)
        } else {
            None
        };
        let position = medium.len()?;
        tracing::debug!(log = %medium.describe(), bytes = position, "opened log store");
        Ok(Self {
            medium,
            codec: RecordCodec::new(registry),
            options,
            buffer,
            flusher: Mutex::new(flusher),
            reader: Mutex::new(Some(reader)),
            read_stats: Mutex::new(LogStats::default()),
            state: Mutex::new(CompactionState::Idle),
            closed: AtomicBool::new(false),
            position: AtomicU64::new(position),
            records_written: AtomicU64::new(0),
        })
    }

    /// Next record of the replay, or `None` once the log is exhausted
    ///
    /// In best-effort mode damaged frames and undecodable payloads are
    /// skipped and counted; in strict mode they are errors.
    pub fn read(&self, mode: ReadMode) -> Result<Option<LogRecord>> {
        let mut guard = self.reader.lock();
        let reader = guard
            .as_mut()
            .ok_or_else(|| Error::InvalidState("log replay has ended".to_string()))?;
        loop {
            let frame = reader.next_frame(mode);
            self.sync_scan_stats(reader);
            let Some(payload) = frame? else {
                return Ok(None);
            };
            match self.codec.decode(&payload) {
                Ok(record) => {
                    self.read_stats.lock().records_read += 1;
                    return Ok(Some(record));
                }
                Err(e) if mode == ReadMode::BestEffort && e.is_corruption() => {
                    self.read_stats.lock().undecodable_records += 1;
                    tracing::warn!(
                        offset = reader.valid_end(),
                        error = %e,
                        "skipping undecodable log record"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Finish replay, cutting off a torn tail left by a crash
    pub fn end_replay(&self) -> Result<()> {
        let Some(reader) = self.reader.lock().take() else {
            return Ok(());
        };
        if !reader.is_finished() {
            return Ok(());
        }
        let valid_end = reader.valid_end();
        let len = self.medium.len()?;
        if valid_end < len && reader.stats().torn_tail {
            tracing::warn!(
                log = %self.medium.describe(),
                valid_end,
                len,
                "truncating torn tail"
            );
            self.medium.truncate(valid_end)?;
            self.position.store(valid_end, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Encode and buffer a record
    ///
    /// The record is durable only after the next flush.
    pub fn write(&self, record: &LogRecord) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::InvalidState("log store is closed".to_string()));
        }
        let payload = self.codec.encode(record)?;
        if payload.len() > self.options.max_record_size {
            return Err(Error::InvalidInput(format!(
                "{} record of {} bytes exceeds the {} byte limit",
                record.kind_name(),
                payload.len(),
                self.options.max_record_size
            )));
        }
        let frame = encode_frame(&payload)?;
        let len = frame.len() as u64;
        self.buffer.push(frame)?;
        self.position.fetch_add(len, Ordering::SeqCst);
        self.records_written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(kind = record.kind_name(), bytes = len, "buffered log record");
        Ok(())
    }

    /// Write and sync every buffered record
    pub fn flush(&self) -> Result<()> {
        self.buffer.flush()
    }

    /// Flush, stop the flusher and release the medium
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let stopped = match self.flusher.lock().take() {
            Some(flusher) => flusher.stop(),
            None => Ok(()),
        };
        let flushed = self.buffer.detach().map(drop);
        self.reader.lock().take();
        tracing::debug!(log = %self.medium.describe(), "closed log store");
        flushed.and(stopped)
    }

    /// Open a fresh log on the compaction sibling
    pub fn start_compaction(&self) -> Result<CompactionTarget> {
        let mut state = self.state.lock();
        if !matches!(*state, CompactionState::Idle | CompactionState::Failed) {
            return Err(Error::InvalidState(format!(
                "compaction already {:?}",
                *state
            )));
        }
        let sibling = self.medium.sibling(COMPACTION_SUFFIX);
        sibling.remove()?;
        let options = LogOptions {
            background_flush: false,
            ..self.options.clone()
        };
        let store = LogStore::open(sibling, Arc::clone(self.codec.registry()), options)?;
        store.end_replay()?;
        *state = CompactionState::Compacting;
        tracing::debug!(log = %self.medium.describe(), "compaction started");
        Ok(CompactionTarget { store })
    }

    /// Swap in the compacted log (`commit`) or throw it away
    ///
    /// Buffered records of this store are flushed to the old log first.
    pub fn finish_compaction(&self, target: CompactionTarget, commit: bool) -> Result<()> {
        let mut state = self.state.lock();
        if *state != CompactionState::Compacting {
            return Err(Error::InvalidState(format!(
                "no compaction in progress ({:?})",
                *state
            )));
        }
        if !commit {
            let closed = target.store.close();
            let removed = self.medium.sibling(COMPACTION_SUFFIX).remove();
            *state = CompactionState::Idle;
            tracing::debug!(log = %self.medium.describe(), "compaction abandoned");
            return closed.and(removed);
        }

        *state = CompactionState::Swapping;
        let records = target.records_written();
        match self.swap(target) {
            Ok(bytes) => {
                *state = CompactionState::Idle;
                tracing::info!(
                    log = %self.medium.describe(),
                    records,
                    bytes,
                    "compacted log swapped in"
                );
                Ok(())
            }
            Err(e) => {
                *state = CompactionState::Failed;
                tracing::error!(log = %self.medium.describe(), error = %e, "compaction swap failed");
                Err(e)
            }
        }
    }

    fn swap(&self, target: CompactionTarget) -> Result<u64> {
        target.store.close()?;
        drop(target);
        let old_writer = self.buffer.detach()?;
        drop(old_writer);
        let replaced = self.medium.replace_from_sibling(COMPACTION_SUFFIX);
        // Reattach to whichever log is in place now so the store stays usable.
        self.buffer.attach(self.medium.open_appender()?);
        replaced?;
        let len = self.medium.len()?;
        self.position.store(len, Ordering::SeqCst);
        Ok(len)
    }

    /// Current compaction state
    pub fn compaction_state(&self) -> CompactionState {
        *self.state.lock()
    }

    /// Byte offset the next record will be written at
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    /// End of the last frame replay accepted; the write position once
    /// replay has ended
    pub fn replay_offset(&self) -> u64 {
        match self.reader.lock().as_ref() {
            Some(reader) => reader.valid_end(),
            None => self.position(),
        }
    }

    /// Counters
    pub fn stats(&self) -> LogStats {
        LogStats {
            records_written: self.records_written.load(Ordering::Relaxed),
            flushes: self.buffer.flush_count(),
            bytes_flushed: self.buffer.bytes_flushed(),
            ..*self.read_stats.lock()
        }
    }

    /// Medium this store writes to
    pub fn medium(&self) -> &Arc<dyn LogMedium> {
        &self.medium
    }

    /// Options the store was opened with
    pub fn options(&self) -> &LogOptions {
        &self.options
    }

    fn sync_scan_stats(&self, reader: &Reader) {
        let scan = reader.stats();
        let mut stats = self.read_stats.lock();
        stats.damaged_frames = scan.damaged;
        stats.skipped_bytes = scan.skipped_bytes;
        stats.torn_tail = scan.torn_tail;
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            if let Err(e) = self.close() {
                tracing::warn!(log = %self.medium.describe(), error = %e, "log store dropped with flush error");
            }
        }
    }
}
