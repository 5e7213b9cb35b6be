//! Database configuration
//!
//! Configuration is a plain struct with serde support, so it can be built in
//! code or loaded from TOML:
//!
//! ```toml
//! path = "/var/lib/app/spool.log"
//! storage = "file"
//! max-extent-items = 512
//! flush-interval-ms = 200
//! ```
//!
//! | Key | Default | Bounds |
//! |-----|---------|--------|
//! | `path` | `./spool.log` | non-empty for `file` storage |
//! | `storage` | `file` | `file` or `memory` |
//! | `max-extent-items` | 512 | 1 ..= 65 536 |
//! | `max-extents-per-queue` | 1 048 576 | 1 ..= 16 777 216 |
//! | `flush-interval-ms` | 200 | 1 ..= 3 600 000 |
//! | `log-buffer-size` | 4096 | ≥ 1 |
//! | `max-record-size` | 16 MiB | 64 ..= 1 GiB |
//! | `flush-thread-name` | `spool-log-flush` | non-empty |
//! | `flush-thread-priority` | 5 | 1 ..= 10, advisory |
//!
//! Unknown keys are rejected. Bounds are checked by [`Config::validate`],
//! which `open` and `recover` call before touching any state.

use serde::{Deserialize, Serialize};
use spool_core::{Error, Result};
use spool_durability::LogOptions;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest extent capacity a configuration or a log record may name
pub const MAX_EXTENT_ITEMS: u32 = 65_536;

const EXTENT_ITEMS: RangeInclusive<u32> = 1..=MAX_EXTENT_ITEMS;
const EXTENTS_PER_QUEUE: RangeInclusive<usize> = 1..=(1 << 24);
const FLUSH_INTERVAL_MS: RangeInclusive<u64> = 1..=3_600_000;
const RECORD_SIZE: RangeInclusive<usize> = 64..=(1 << 30);
const THREAD_PRIORITY: RangeInclusive<u8> = 1..=10;

/// Log storage implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// Log file at `path`
    #[default]
    File,
    /// Process memory; survives close/open of one `Database` value only
    Memory,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Config {
    /// Log file location; siblings get `.types` and `.compact` suffixes
    pub path: PathBuf,
    /// Log storage implementation
    pub storage: StorageKind,
    /// Slots per queue extent
    pub max_extent_items: u32,
    /// Extents per queue
    pub max_extents_per_queue: usize,
    /// Maximum time a record stays buffered, in milliseconds
    pub flush_interval_ms: u64,
    /// Buffered records before a flush is forced
    pub log_buffer_size: usize,
    /// Largest record payload in bytes
    pub max_record_size: usize,
    /// Name of the background flusher thread
    pub flush_thread_name: String,
    /// Advisory priority of the flusher thread
    pub flush_thread_priority: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: PathBuf::from("./spool.log"),
            storage: StorageKind::File,
            max_extent_items: 512,
            max_extents_per_queue: 1 << 20,
            flush_interval_ms: 200,
            log_buffer_size: 4096,
            max_record_size: 16 * 1024 * 1024,
            flush_thread_name: "spool-log-flush".to_string(),
            flush_thread_priority: 5,
        }
    }
}

impl Config {
    /// Configuration for a log file at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Config {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Configuration for an in-memory log
    pub fn in_memory() -> Self {
        Config {
            storage: StorageKind::Memory,
            path: PathBuf::from("memory"),
            ..Default::default()
        }
    }

    /// Parse TOML; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Set the log path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the storage implementation
    pub fn with_storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Set the extent size
    pub fn with_max_extent_items(mut self, items: u32) -> Self {
        self.max_extent_items = items;
        self
    }

    /// Set the extent limit per queue
    pub fn with_max_extents_per_queue(mut self, extents: usize) -> Self {
        self.max_extents_per_queue = extents;
        self
    }

    /// Set the flush interval
    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Set the write buffer size
    pub fn with_log_buffer_size(mut self, records: usize) -> Self {
        self.log_buffer_size = records;
        self
    }

    /// Set the record size limit
    pub fn with_max_record_size(mut self, bytes: usize) -> Self {
        self.max_record_size = bytes;
        self
    }

    /// Set the flusher thread name
    pub fn with_flush_thread_name(mut self, name: impl Into<String>) -> Self {
        self.flush_thread_name = name.into();
        self
    }

    /// Set the flusher thread priority
    pub fn with_flush_thread_priority(mut self, priority: u8) -> Self {
        self.flush_thread_priority = priority;
        self
    }

    /// Check every bound
    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageKind::File && self.path.as_os_str().is_empty() {
            return Err(Error::Config("path must not be empty".to_string()));
        }
        check("max-extent-items", self.max_extent_items, &EXTENT_ITEMS)?;
        check(
            "max-extents-per-queue",
            self.max_extents_per_queue,
            &EXTENTS_PER_QUEUE,
        )?;
        check("flush-interval-ms", self.flush_interval_ms, &FLUSH_INTERVAL_MS)?;
        if self.log_buffer_size == 0 {
            return Err(Error::Config(
                "log-buffer-size must be at least 1".to_string(),
            ));
        }
        check("max-record-size", self.max_record_size, &RECORD_SIZE)?;
        if self.flush_thread_name.trim().is_empty() {
            return Err(Error::Config(
                "flush-thread-name must not be empty".to_string(),
            ));
        }
        check(
            "flush-thread-priority",
            self.flush_thread_priority,
            &THREAD_PRIORITY,
        )?;
        Ok(())
    }

    /// Log store options derived from this configuration
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            max_record_size: self.max_record_size,
            buffer_size: self.log_buffer_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            background_flush: true,
            thread_name: self.flush_thread_name.clone(),
            thread_priority: self.flush_thread_priority,
        }
    }
}

fn check<T>(key: &str, value: T, range: &RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} = {} is outside {}..={}",
            key,
            value,
            range.start(),
            range.end()
        )))
    }
}
