//! SQLite implementation of the CacheStore trait

use super::{CacheStore, PersistenceError};
use crate::cache::CacheRecord;
use crate::fingerprint::Signature;
use crate::models::{Location, LocationSource};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-based cache storage
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

/// A row as read from the table, before validation
struct RawRow {
    signature: Vec<u8>,
    count: i64,
    time: i64,
    resolved: bool,
    has_location: bool,
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    location_time: Option<i64>,
    provider: Option<String>,
    speed: Option<f64>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawRow {
            signature: row.get(0)?,
            count: row.get(1)?,
            time: row.get(2)?,
            resolved: row.get(3)?,
            has_location: row.get(4)?,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            accuracy: row.get(7)?,
            location_time: row.get(8)?,
            provider: row.get(9)?,
            speed: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<(Signature, CacheRecord), PersistenceError> {
        let sig = Signature::from_slice(&self.signature).ok_or_else(|| {
            PersistenceError::InvalidData(format!(
                "signature of {} bytes",
                self.signature.len()
            ))
        })?;
        let count = u32::try_from(self.count)
            .map_err(|_| PersistenceError::InvalidData(format!("count {}", self.count)))?;

        let location = if self.has_location {
            let source = match self.provider.as_deref() {
                Some(provider) => provider
                    .parse::<LocationSource>()
                    .map_err(PersistenceError::InvalidData)?,
                None => LocationSource::Cached,
            };
            Some(Location {
                latitude: self.latitude.unwrap_or(f64::NAN),
                longitude: self.longitude.unwrap_or(f64::NAN),
                accuracy: self.accuracy.unwrap_or(f64::NAN),
                time_ms: self.location_time.unwrap_or(self.time),
                speed: self.speed,
                source,
            })
        } else {
            None
        };

        Ok((
            sig,
            CacheRecord {
                count,
                last_seen_ms: self.time,
                location,
                resolved: self.resolved,
            },
        ))
    }
}

impl SqliteCacheStore {
    /// Open (or create) the cache database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteCacheStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteCacheStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }
}

impl CacheStore for SqliteCacheStore {
    fn load_all(&self) -> Result<Vec<(Signature, CacheRecord)>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT signature, count, time, resolved, has_location, latitude, longitude,
                    accuracy, location_time, provider, speed
             FROM location_cache",
        )?;

        // A bad row costs only that row, not every learned place
        let mut records = Vec::new();
        for raw in stmt.query_map([], RawRow::from_row)? {
            match raw.map_err(PersistenceError::from).and_then(RawRow::into_record) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping unreadable cache row: {}", e),
            }
        }
        Ok(records)
    }

    fn sync_all(&self, rows: &[(Signature, CacheRecord)]) -> Result<(), PersistenceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM location_cache", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO location_cache
                 (signature, count, time, resolved, has_location, latitude, longitude,
                  accuracy, location_time, provider, speed)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for (sig, record) in rows {
                let location = record.location.as_ref();
                stmt.execute(params![
                    &sig.as_bytes()[..],
                    record.count,
                    record.last_seen_ms,
                    record.resolved,
                    location.is_some(),
                    location.map(|l| l.latitude),
                    location.map(|l| l.longitude),
                    location.map(|l| l.accuracy),
                    location.map(|l| l.time_ms),
                    location.map(|l| l.source.as_str()),
                    location.and_then(|l| l.speed),
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("Synced {} cache rows", rows.len());
        Ok(())
    }

    fn count(&self) -> Result<usize, PersistenceError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM location_cache", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}
