//! Record payload codec
//!
//! Records are bincode-encoded after every [`Value`] is converted into its
//! wire form, [`WireValue`], which replaces typed-value names with catalog
//! ids. Decoding runs the conversion backwards; an id the catalog does not
//! know is corruption.

use serde::{Deserialize, Serialize};
use spool_core::{Result, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::TypeRegistry;
use crate::record::LogRecord;

/// On-log form of a [`Value`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    /// See [`Value::Null`]
    Null,
    /// See [`Value::Bool`]
    Bool(bool),
    /// See [`Value::Int`]
    Int(i64),
    /// See [`Value::Float`]
    Float(f64),
    /// See [`Value::String`]
    String(String),
    /// See [`Value::Bytes`]
    Bytes(Vec<u8>),
    /// See [`Value::Array`]
    Array(Vec<WireValue>),
    /// See [`Value::Object`]
    Object(HashMap<String, WireValue>),
    /// [`Value::Typed`] with its name replaced by a catalog id
    Typed {
        /// Catalog id of the type name
        type_id: u32,
        /// Encoded body
        data: Vec<u8>,
    },
}

/// Encoder/decoder of record payloads
#[derive(Debug, Clone)]
pub struct RecordCodec {
    registry: Arc<dyn TypeRegistry>,
}

impl RecordCodec {
    /// Codec resolving type names through `registry`
    pub fn new(registry: Arc<dyn TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Registry shared with compaction targets
    pub fn registry(&self) -> &Arc<dyn TypeRegistry> {
        &self.registry
    }

    /// Encode a record payload
    pub fn encode(&self, record: &LogRecord) -> Result<Vec<u8>> {
        let wire = record.as_ref().try_map_values(|v| self.encode_value(v))?;
        Ok(bincode::serialize(&wire)?)
    }

    /// Decode a record payload
    pub fn decode(&self, payload: &[u8]) -> Result<LogRecord> {
        let wire: LogRecord<WireValue> = bincode::deserialize(payload)?;
        wire.try_map_values(|v| self.decode_value(v))
    }

    fn encode_value(&self, value: &Value) -> Result<WireValue> {
        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Int(i) => WireValue::Int(*i),
            Value::Float(f) => WireValue::Float(*f),
            Value::String(s) => WireValue::String(s.clone()),
            Value::Bytes(b) => WireValue::Bytes(b.clone()),
            Value::Array(items) => WireValue::Array(
                items
                    .iter()
                    .map(|v| self.encode_value(v))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => WireValue::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.encode_value(v)?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Typed { type_name, data } => WireValue::Typed {
                type_id: self.registry.id_for(type_name)?,
                data: data.clone(),
            },
        })
    }

    fn decode_value(&self, value: WireValue) -> Result<Value> {
        Ok(match value {
            WireValue::Null => Value::Null,
            WireValue::Bool(b) => Value::Bool(b),
            WireValue::Int(i) => Value::Int(i),
            WireValue::Float(f) => Value::Float(f),
            WireValue::String(s) => Value::String(s),
            WireValue::Bytes(b) => Value::Bytes(b),
            WireValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| self.decode_value(v))
                    .collect::<Result<_>>()?,
            ),
            WireValue::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, self.decode_value(v)?)))
                    .collect::<Result<_>>()?,
            ),
            WireValue::Typed { type_id, data } => Value::Typed {
                type_name: self.registry.name_for(type_id)?,
                data,
            },
        })
    }
}
