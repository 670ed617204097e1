//! Fingerprint-to-location cache
//!
//! Maps each WiFi signature to how often it has been seen and, once the
//! engine has captured a good enough fix there, the location itself.
//! Everything here is in-memory and synchronous; persistence happens
//! through an explicit snapshot handed to a `CacheStore`.

pub mod janitor;

pub use janitor::{CacheJanitor, EvictionPolicy};

use crate::fingerprint::Signature;
use crate::models::Location;
use std::collections::HashMap;

/// What the cache knows about one signature
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    /// Number of sightings while the record was unresolved
    pub count: u32,
    /// Last time the record was touched (epoch ms)
    pub last_seen_ms: i64,
    pub location: Option<Location>,
    /// True once the record is concluded, with or without a fix
    pub resolved: bool,
}

impl CacheRecord {
    fn new(now_ms: i64) -> Self {
        CacheRecord {
            count: 1,
            last_seen_ms: now_ms,
            location: None,
            resolved: false,
        }
    }
}

/// In-memory signature -> record map
#[derive(Debug, Default)]
pub struct LocationCache {
    records: HashMap<Signature, CacheRecord>,
}

impl LocationCache {
    pub fn new() -> Self {
        LocationCache {
            records: HashMap::new(),
        }
    }

    pub fn lookup(&self, sig: &Signature) -> Option<&CacheRecord> {
        self.records.get(sig)
    }

    pub fn contains(&self, sig: &Signature) -> bool {
        self.records.contains_key(sig)
    }

    /// Record a sighting of `sig`.
    ///
    /// New signatures start with a count of one. Existing records only
    /// count the sighting and refresh their timestamp while unresolved.
    pub fn upsert_on_sighting(&mut self, sig: Signature, now_ms: i64) -> &CacheRecord {
        let record = self
            .records
            .entry(sig)
            .and_modify(|r| {
                if !r.resolved {
                    r.count = r.count.saturating_add(1);
                    r.last_seen_ms = now_ms;
                }
            })
            .or_insert_with(|| CacheRecord::new(now_ms));

        log::debug!(
            "Sighting {}: count={}, resolved={}, has_location={}",
            sig,
            record.count,
            record.resolved,
            record.location.is_some()
        );
        record
    }

    /// Store a location for `sig` and mark it resolved.
    ///
    /// Returns false if the signature is not in the cache.
    pub fn attach_location(&mut self, sig: &Signature, location: Location, now_ms: i64) -> bool {
        match self.records.get_mut(sig) {
            Some(record) => {
                record.location = Some(location);
                record.resolved = true;
                record.last_seen_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// Conclude `sig` without a fix. Returns true if the record changed.
    pub fn mark_resolved(&mut self, sig: &Signature) -> bool {
        match self.records.get_mut(sig) {
            Some(record) if !record.resolved => {
                record.resolved = true;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, sig: &Signature) -> Option<CacheRecord> {
        self.records.remove(sig)
    }

    /// Copy of every record, for persistence
    pub fn snapshot(&self) -> Vec<(Signature, CacheRecord)> {
        self.records
            .iter()
            .map(|(sig, record)| (*sig, record.clone()))
            .collect()
    }

    /// Seed the cache from stored rows, replacing any existing entries
    /// with the same signature.
    pub fn load_all(&mut self, rows: Vec<(Signature, CacheRecord)>) {
        for (sig, mut record) in rows {
            if record.location.is_some() {
                record.resolved = true;
            }
            self.records.insert(sig, record);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Signature, &CacheRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
