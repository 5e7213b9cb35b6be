//! Type catalog
//!
//! Log records do not repeat the type name of every [`Value::Typed`]
//! payload; they carry a small integer id instead. The mapping lives in a
//! side file next to the log (`<log>.types`), one entry per type:
//!
//! ```text
//! [id: u32 BE][name length: u16 BE][name: UTF-8]
//! ```
//!
//! The file is append-only and loaded in full at open. A new entry is synced
//! before the id is handed out, so no record can reference an id the catalog
//! could lose.
//!
//! [`Value::Typed`]: spool_core::Value::Typed

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use spool_core::{Error, Result};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::medium::{DurableWrite, LogMedium};

/// Sibling suffix of the type catalog
pub const CATALOG_SUFFIX: &str = ".types";

/// Bidirectional type name ↔ id mapping used by the codec
pub trait TypeRegistry: Send + Sync + fmt::Debug {
    /// Id of a type name, registering it if new
    fn id_for(&self, name: &str) -> Result<u32>;

    /// Name of a registered id; unknown ids are corruption
    fn name_for(&self, id: u32) -> Result<String>;
}

#[derive(Debug, Default)]
struct Entries {
    by_name: FxHashMap<String, u32>,
    by_id: FxHashMap<u32, String>,
    next_id: u32,
}

impl Entries {
    fn insert(&mut self, id: u32, name: String) -> Result<()> {
        if self.by_id.contains_key(&id) || self.by_name.contains_key(&name) {
            return Err(Error::Corruption(format!(
                "type catalog binds {} or {:?} twice",
                id, name
            )));
        }
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(id, name);
        Ok(())
    }
}

/// Durable [`TypeRegistry`] stored in a catalog medium
pub struct TypeCatalog {
    medium: Arc<dyn LogMedium>,
    entries: RwLock<Entries>,
    writer: Mutex<Option<Box<dyn DurableWrite>>>,
}

impl fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCatalog")
            .field("medium", &self.medium.describe())
            .field("types", &self.len())
            .finish()
    }
}

impl TypeCatalog {
    /// Load every entry of the catalog medium
    ///
    /// A trailing partial entry, left by a crash during registration, is
    /// truncated away; its id was never handed out.
    pub fn open(medium: Arc<dyn LogMedium>) -> Result<Self> {
        let mut reader = medium.open_reader()?;
        let mut entries = Entries::default();
        let mut valid_len = 0u64;
        loop {
            match read_entry(&mut reader)? {
                EntryRead::Entry(id, name) => {
                    valid_len += 6 + name.len() as u64;
                    entries.insert(id, name)?;
                }
                EntryRead::End => break,
                EntryRead::Torn => {
                    tracing::warn!(
                        catalog = %medium.describe(),
                        valid_len,
                        "type catalog ends in a partial entry; truncating"
                    );
                    medium.truncate(valid_len)?;
                    break;
                }
            }
        }
        tracing::debug!(catalog = %medium.describe(), types = entries.by_id.len(), "type catalog loaded");
        Ok(Self {
            medium,
            entries: RwLock::new(entries),
            writer: Mutex::new(None),
        })
    }

    fn append(&self, writer: &mut Option<Box<dyn DurableWrite>>, entry: &[u8]) -> Result<()> {
        if writer.is_none() {
            *writer = Some(self.medium.open_appender()?);
        }
        if let Some(w) = writer.as_mut() {
            w.write_all(entry)?;
            w.sync()?;
        }
        Ok(())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.read().by_id.len()
    }

    /// No registered types
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TypeRegistry for TypeCatalog {
    fn id_for(&self, name: &str) -> Result<u32> {
        if let Some(id) = self.entries.read().by_name.get(name) {
            return Ok(*id);
        }
        let name_len = u16::try_from(name.len())
            .map_err(|_| Error::InvalidInput(format!("type name of {} bytes", name.len())))?;

        let mut writer = self.writer.lock();
        // Re-check: another thread may have registered it while we waited.
        if let Some(id) = self.entries.read().by_name.get(name) {
            return Ok(*id);
        }
        let id = self.entries.read().next_id;
        let mut entry = Vec::with_capacity(6 + name.len());
        entry.write_u32::<BigEndian>(id)?;
        entry.write_u16::<BigEndian>(name_len)?;
        entry.extend_from_slice(name.as_bytes());

        let good_len = self.medium.len()?;
        if let Err(e) = self.append(&mut writer, &entry) {
            // Drop any partial entry so the next one starts on a boundary.
            *writer = None;
            if let Err(cut) = self.medium.truncate(good_len) {
                tracing::warn!(
                    catalog = %self.medium.describe(),
                    error = %cut,
                    "cannot drop partial type entry"
                );
            }
            return Err(e);
        }
        self.entries.write().insert(id, name.to_string())?;
        tracing::debug!(id, name, "registered type");
        Ok(id)
    }

    fn name_for(&self, id: u32) -> Result<String> {
        self.entries
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Corruption(format!("unknown type id {}", id)))
    }
}

enum EntryRead {
    Entry(u32, String),
    End,
    Torn,
}

fn read_entry(reader: &mut dyn Read) -> Result<EntryRead> {
    let mut first = [0u8; 1];
    if reader.read(&mut first)? == 0 {
        return Ok(EntryRead::End);
    }
    let mut rest = [0u8; 5];
    if let Err(e) = reader.read_exact(&mut rest) {
        return torn_or(e);
    }
    let mut header = io::Cursor::new([first[0], rest[0], rest[1], rest[2], rest[3], rest[4]]);
    let id = header.read_u32::<BigEndian>()?;
    let len = header.read_u16::<BigEndian>()?;
    let mut name = vec![0u8; usize::from(len)];
    if let Err(e) = reader.read_exact(&mut name) {
        return torn_or(e);
    }
    let name = String::from_utf8(name)
        .map_err(|_| Error::Corruption(format!("type catalog entry {} is not UTF-8", id)))?;
    Ok(EntryRead::Entry(id, name))
}

fn torn_or(e: io::Error) -> Result<EntryRead> {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Ok(EntryRead::Torn)
    } else {
        Err(e.into())
    }
}
