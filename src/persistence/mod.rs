//! Persistence module for the location cache
//!
//! The cache lives in memory; this module stores snapshots of it so
//! learned places survive restarts.

pub mod sqlite_store;

pub use sqlite_store::SqliteCacheStore;

use crate::cache::CacheRecord;
use crate::fingerprint::Signature;
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

/// Storage backend for cache rows
///
/// Calls may block on I/O, so the service only makes them from
/// blocking tasks, never from the decision loop.
pub trait CacheStore: Send + Sync {
    /// Load every stored row
    fn load_all(&self) -> Result<Vec<(Signature, CacheRecord)>, PersistenceError>;

    /// Replace the stored rows with `rows`
    fn sync_all(&self, rows: &[(Signature, CacheRecord)]) -> Result<(), PersistenceError>;

    /// Number of stored rows
    fn count(&self) -> Result<usize, PersistenceError> {
        Ok(self.load_all()?.len())
    }
}
