//! Periodic cache cleanup
//!
//! Two tiers: records that never became significant are dropped after an
//! hour without sightings, and significant-but-not-critical records are
//! dropped once they outlive the cache timeout (each sighting buys an
//! extra extension period). Critical records are never dropped here.

use super::{CacheRecord, LocationCache};
use crate::config::CacheConfig;
use crate::fingerprint::Signature;

/// Thresholds that decide when a record is evicted
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    pub significance_threshold: u32,
    pub critical_threshold: u32,
    /// Age after which an insignificant record is transient
    pub transient_age_ms: i64,
    pub cache_timeout_ms: i64,
    /// Extra lifetime granted per sighting
    pub extension_ms: i64,
}

impl EvictionPolicy {
    pub fn new(significance_threshold: u32, critical_threshold: u32, config: &CacheConfig) -> Self {
        EvictionPolicy {
            significance_threshold,
            critical_threshold,
            transient_age_ms: config.transient_age_ms,
            cache_timeout_ms: config.cache_timeout_ms,
            extension_ms: config.extension_ms,
        }
    }

    /// Whether `record` should be evicted at `now_ms`
    pub fn is_expired(&self, record: &CacheRecord, now_ms: i64) -> bool {
        let age = now_ms - record.last_seen_ms;

        if record.count < self.significance_threshold {
            return age > self.transient_age_ms;
        }

        if record.count < self.critical_threshold {
            let timeout = age - record.count as i64 * self.extension_ms;
            return timeout > self.cache_timeout_ms;
        }

        false
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::new(3, 15, &CacheConfig::default())
    }
}

/// Applies an `EvictionPolicy` to a cache
pub struct CacheJanitor {
    policy: EvictionPolicy,
}

impl CacheJanitor {
    pub fn new(policy: EvictionPolicy) -> Self {
        CacheJanitor { policy }
    }

    /// Evict expired records, returning the evicted signatures
    pub fn sweep(&self, cache: &mut LocationCache, now_ms: i64) -> Vec<Signature> {
        log::debug!("Cleaning up the cache ({} entries)", cache.len());

        let to_delete: Vec<Signature> = cache
            .iter()
            .filter(|(_, record)| self.policy.is_expired(record, now_ms))
            .map(|(sig, _)| *sig)
            .collect();

        for sig in &to_delete {
            if let Some(record) = cache.remove(sig) {
                log::debug!(
                    "Evicted {} (count={}, last_seen={})",
                    sig,
                    record.count,
                    record.last_seen_ms
                );
            }
        }

        if !to_delete.is_empty() {
            log::info!(
                "Cache cleanup evicted {} entries, {} remain",
                to_delete.len(),
                cache.len()
            );
        }

        to_delete
    }
}
