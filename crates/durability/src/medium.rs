//! Durable byte media
//!
//! The log store never touches the filesystem directly; it talks to a
//! [`LogMedium`]. Two implementations ship with the crate:
//!
//! | Medium | Backing | Used for |
//! |--------|---------|----------|
//! | [`FileMedium`] | a file path, siblings are `<path><suffix>` | production |
//! | [`MemoryMedium`] | a shared in-process byte map | tests, `storage = "memory"` |
//!
//! A medium can name siblings (the type catalog, the compaction target) and
//! atomically replace itself with one of them.

use parking_lot::Mutex;
use spool_core::Result;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Append handle that can be made durable
pub trait DurableWrite: Write + Send {
    /// Flush buffers and persist everything written so far
    fn sync(&mut self) -> io::Result<()>;
}

/// Byte-oriented durable storage for one log
pub trait LogMedium: Send + Sync + fmt::Debug {
    /// Human-readable location, for log messages
    fn describe(&self) -> String;

    /// Read the current contents from the start; empty when missing
    fn open_reader(&self) -> Result<Box<dyn Read + Send>>;

    /// Open for appending, creating the medium if missing
    fn open_appender(&self) -> Result<Box<dyn DurableWrite>>;

    /// Current length in bytes; zero when missing
    fn len(&self) -> Result<u64>;

    /// Cut the contents down to `len` bytes
    fn truncate(&self, len: u64) -> Result<()>;

    /// Medium named by appending `suffix` to this one
    fn sibling(&self, suffix: &str) -> Arc<dyn LogMedium>;

    /// Atomically replace this medium with the sibling named by `suffix`
    fn replace_from_sibling(&self, suffix: &str) -> Result<()>;

    /// Delete the medium; a missing medium is not an error
    fn remove(&self) -> Result<()>;
}

// ============================================================================
// File medium
// ============================================================================

/// Medium backed by a file
#[derive(Debug, Clone)]
pub struct FileMedium {
    path: PathBuf,
}

struct FileAppender {
    writer: BufWriter<File>,
}

impl Write for FileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl DurableWrite for FileAppender {
    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

impl FileMedium {
    /// Medium for the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn sync_parent(&self) -> io::Result<()> {
        #[cfg(unix)]
        {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                File::open(parent)?.sync_all()?;
            }
        }
        Ok(())
    }
}

impl LogMedium for FileMedium {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open_reader(&self) -> Result<Box<dyn Read + Send>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Box::new(io::BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Box::new(io::empty())),
            Err(e) => Err(e.into()),
        }
    }

    fn open_appender(&self) -> Result<Box<dyn DurableWrite>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(Box::new(FileAppender {
            writer: BufWriter::new(file),
        }))
    }

    fn len(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn truncate(&self, len: u64) -> Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> Arc<dyn LogMedium> {
        Arc::new(FileMedium::new(self.sibling_path(suffix)))
    }

    fn replace_from_sibling(&self, suffix: &str) -> Result<()> {
        fs::rename(self.sibling_path(suffix), &self.path)?;
        self.sync_parent()?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Memory medium
// ============================================================================

type MemoryFiles = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Medium backed by process memory
///
/// Clones and siblings share one byte map, so a database reopened on the
/// same medium sees everything flushed before.
#[derive(Debug, Clone)]
pub struct MemoryMedium {
    files: MemoryFiles,
    name: String,
}

struct MemoryAppender {
    files: MemoryFiles,
    name: String,
    pending: Vec<u8>,
}

impl Write for MemoryAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let mut files = self.files.lock();
            files
                .entry(self.name.clone())
                .or_default()
                .append(&mut self.pending);
        }
        Ok(())
    }
}

impl DurableWrite for MemoryAppender {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl MemoryMedium {
    /// Empty medium
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            name: name.into(),
        }
    }

    /// Medium holding a copy of `bytes`, sharing nothing with any other
    pub fn with_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let medium = Self::new(name);
        medium.files.lock().insert(medium.name.clone(), bytes);
        medium
    }

    /// Copy of the persisted bytes
    pub fn bytes(&self) -> Vec<u8> {
        self.files.lock().get(&self.name).cloned().unwrap_or_default()
    }

    /// Independent copy of this medium and all of its siblings
    ///
    /// Stands in for the state a crash would leave behind.
    pub fn snapshot(&self) -> Self {
        Self {
            files: Arc::new(Mutex::new(self.files.lock().clone())),
            name: self.name.clone(),
        }
    }

    /// Edit the persisted bytes in place
    pub fn modify<F: FnOnce(&mut Vec<u8>)>(&self, f: F) {
        let mut files = self.files.lock();
        f(files.entry(self.name.clone()).or_default());
    }
}

impl LogMedium for MemoryMedium {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn open_reader(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.bytes())))
    }

    fn open_appender(&self) -> Result<Box<dyn DurableWrite>> {
        self.files.lock().entry(self.name.clone()).or_default();
        Ok(Box::new(MemoryAppender {
            files: Arc::clone(&self.files),
            name: self.name.clone(),
            pending: Vec::new(),
        }))
    }

    fn len(&self) -> Result<u64> {
        Ok(self
            .files
            .lock()
            .get(&self.name)
            .map_or(0, |bytes| bytes.len() as u64))
    }

    fn truncate(&self, len: u64) -> Result<()> {
        if let Some(bytes) = self.files.lock().get_mut(&self.name) {
            bytes.truncate(len as usize);
        }
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> Arc<dyn LogMedium> {
        Arc::new(MemoryMedium {
            files: Arc::clone(&self.files),
            name: format!("{}{}", self.name, suffix),
        })
    }

    fn replace_from_sibling(&self, suffix: &str) -> Result<()> {
        let mut files = self.files.lock();
        let sibling = format!("{}{}", self.name, suffix);
        let bytes = files.remove(&sibling).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("memory:{}", sibling))
        })?;
        files.insert(self.name.clone(), bytes);
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        self.files.lock().remove(&self.name);
        Ok(())
    }
}
