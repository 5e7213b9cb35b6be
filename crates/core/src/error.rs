//! Error types for SpoolDB
//!
//! Every crate in the workspace returns [`Result`]. The variants map onto the
//! error categories the engine distinguishes:
//!
//! | Variant | Category | Raised by |
//! |---------|----------|-----------|
//! | `Config` | configuration | `open`/`recover` before any state change |
//! | `InvalidState` | lifecycle | operations on a closed database, double open |
//! | `Corruption` | recovery | checksum mismatch, bad binding, dangling id |
//! | `Serialization` | recovery | undecodable payload |
//! | `Capacity` | exhaustion | id space, extent ids, extent table |
//! | `ConcurrentModification` | iteration | fail-fast index iterators |
//! | `InvalidInput` | caller | null keys, oversize records |
//! | `Io` | environment | the durable medium |
//! | `Internal` | bug | invariant violations |

use std::io;
use thiserror::Error;

/// All SpoolDB errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation invoked in the wrong lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Log content is inconsistent or damaged
    #[error("corruption: {0}")]
    Corruption(String),

    /// Payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A bounded id space or table is exhausted
    #[error("{resource} capacity exceeded (limit {limit})")]
    Capacity {
        /// What ran out
        resource: &'static str,
        /// The configured bound
        limit: usize,
    },

    /// The collection was structurally modified during iteration
    #[error("collection modified during iteration")]
    ConcurrentModification,

    /// Argument rejected by the API
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O error from the durable medium
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for SpoolDB operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is recognized log corruption.
    ///
    /// Best-effort replay skips records failing with these errors and keeps
    /// going; everything else aborts recovery.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::Serialization(_))
    }

    /// Check if this is a lifecycle state error.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }

    /// Check if this is a capacity error.
    pub fn is_capacity_error(&self) -> bool {
        matches!(self, Error::Capacity { .. })
    }

    /// Shorthand for a state error on a closed database.
    pub fn closed() -> Self {
        Error::InvalidState("database is closed".to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
