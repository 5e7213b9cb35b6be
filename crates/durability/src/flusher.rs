//! Write buffering and background flushing
//!
//! Encoded frames queue up in a [`WriteBuffer`] until one of:
//!
//! | Trigger | Who flushes |
//! |---------|-------------|
//! | flush interval elapsed | the background [`Flusher`] thread |
//! | buffer reached its record limit | the flusher, woken by the producer |
//! | buffer still full on the next write | the producer itself (backpressure) |
//! | explicit `flush()` | the caller |
//!
//! A flush holds the writer lock while it drains the queue, so frames reach
//! the medium in the order they were buffered. Failures on the flusher
//! thread are logged and become sticky: every later write or flush on the
//! store reports them.

use parking_lot::{Condvar, Mutex};
use spool_core::{Error, Result};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::medium::DurableWrite;

/// Frames waiting for the medium
pub struct WriteBuffer {
    pending: Mutex<VecDeque<Vec<u8>>>,
    writer: Mutex<Option<Box<dyn DurableWrite>>>,
    wake: Condvar,
    shutdown: AtomicBool,
    failure: Mutex<Option<(io::ErrorKind, String)>>,
    capacity: usize,
    flushes: AtomicU64,
    bytes_flushed: AtomicU64,
}

impl WriteBuffer {
    /// Buffer holding up to `capacity` frames in front of `writer`
    pub fn new(writer: Box<dyn DurableWrite>, capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            writer: Mutex::new(Some(writer)),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            failure: Mutex::new(None),
            capacity: capacity.max(1),
            flushes: AtomicU64::new(0),
            bytes_flushed: AtomicU64::new(0),
        }
    }

    /// Queue one frame
    pub fn push(&self, frame: Vec<u8>) -> Result<()> {
        self.check_failure()?;
        if self.pending.lock().len() >= self.capacity {
            self.flush()?;
        }
        let mut pending = self.pending.lock();
        pending.push_back(frame);
        if pending.len() >= self.capacity {
            self.wake.notify_one();
        }
        Ok(())
    }

    /// Write and sync every queued frame
    pub fn flush(&self) -> Result<()> {
        self.check_failure()?;
        self.flush_pending()
    }

    /// Frames not yet written
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Completed flushes
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Bytes written by completed flushes
    pub fn bytes_flushed(&self) -> u64 {
        self.bytes_flushed.load(Ordering::Relaxed)
    }

    /// Detach the writer after flushing; later writes fail until one is attached
    pub fn detach(&self) -> Result<Option<Box<dyn DurableWrite>>> {
        self.flush_pending()?;
        Ok(self.writer.lock().take())
    }

    /// Attach a fresh writer and clear any sticky failure
    pub fn attach(&self, writer: Box<dyn DurableWrite>) {
        *self.writer.lock() = Some(writer);
        *self.failure.lock() = None;
    }

    /// Discard queued frames without writing them
    pub fn discard(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    fn flush_pending(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(());
        }
        let out = writer
            .as_mut()
            .ok_or_else(|| Error::InvalidState("log writer is detached".to_string()))?;
        let mut bytes = 0u64;
        for frame in &batch {
            out.write_all(frame)?;
            bytes += frame.len() as u64;
        }
        out.sync()?;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(bytes, Ordering::Relaxed);
        tracing::debug!(records = batch.len(), bytes, "flushed log buffer");
        Ok(())
    }

    fn check_failure(&self) -> Result<()> {
        match &*self.failure.lock() {
            Some((kind, message)) => Err(Error::Io(io::Error::new(
                *kind,
                format!("background flush failed: {}", message),
            ))),
            None => Ok(()),
        }
    }

    fn record_failure(&self, error: &Error) {
        let kind = match error {
            Error::Io(e) => e.kind(),
            _ => io::ErrorKind::Other,
        };
        *self.failure.lock() = Some((kind, error.to_string()));
    }
}

/// Options of the background flusher thread
#[derive(Debug, Clone)]
pub struct FlusherOptions {
    /// Thread name
    pub thread_name: String,
    /// Advisory scheduling priority, 1 (lowest) to 10 (highest)
    pub priority: u8,
    /// Maximum time a record waits in the buffer
    pub interval: Duration,
}

/// Handle of the background flusher thread
pub struct Flusher {
    buffer: Arc<WriteBuffer>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Start flushing `buffer` in the background
    pub fn spawn(buffer: Arc<WriteBuffer>, options: &FlusherOptions) -> Result<Self> {
        tracing::debug!(
            thread = %options.thread_name,
            priority = options.priority,
            interval_ms = options.interval.as_millis() as u64,
            "starting log flusher"
        );
        let worker = Arc::clone(&buffer);
        let interval = options.interval;
        let handle = thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || run(&worker, interval))?;
        Ok(Self {
            buffer,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) -> Result<()> {
        self.signal_and_join()
    }

    fn signal_and_join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        {
            let _pending = self.buffer.pending.lock();
            self.buffer.shutdown.store(true, Ordering::SeqCst);
            self.buffer.wake.notify_all();
        }
        handle
            .join()
            .map_err(|_| Error::Internal("log flusher thread panicked".to_string()))
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        if let Err(e) = self.signal_and_join() {
            tracing::error!(error = %e, "log flusher did not stop cleanly");
        }
    }
}

fn run(buffer: &WriteBuffer, interval: Duration) {
    let mut pending = buffer.pending.lock();
    loop {
        if buffer.shutdown.load(Ordering::SeqCst) {
            break;
        }
        if pending.len() < buffer.capacity || buffer.failure.lock().is_some() {
            buffer.wake.wait_for(&mut pending, interval);
        }
        if buffer.shutdown.load(Ordering::SeqCst) {
            break;
        }
        if pending.is_empty() {
            continue;
        }
        drop(pending);
        if buffer.failure.lock().is_none() {
            if let Err(e) = buffer.flush_pending() {
                tracing::error!(error = %e, "background log flush failed");
                buffer.record_failure(&e);
            }
        }
        pending = buffer.pending.lock();
    }
    tracing::debug!("log flusher stopped");
}
