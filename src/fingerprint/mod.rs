//! WiFi fingerprint hashing
//!
//! Reduces a scan to a fixed-size signature of the access points whose
//! signal is at or above the scan's mean strength. Two scans that keep the
//! same set of strong access points map to the same signature, which is
//! what the cache uses as a stand-in for "still in the same place".

use crate::models::ScanEntry;
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest of the filtered, sorted access-point list
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature([u8; 32]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Signature(bytes)
    }

    /// Rebuild a signature from a stored blob; `None` if the length is wrong
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Signature(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..12])
    }
}

/// Result of fingerprinting one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fingerprint {
    /// The scan saw no access points at all
    NoWifi,
    Signature(Signature),
}

impl Fingerprint {
    pub fn signature(&self) -> Option<Signature> {
        match self {
            Fingerprint::NoWifi => None,
            Fingerprint::Signature(sig) => Some(*sig),
        }
    }
}

/// Keep identifiers whose strength is at or above the scan mean, sorted.
pub fn strong_access_points(entries: &[ScanEntry]) -> Vec<&str> {
    if entries.is_empty() {
        return Vec::new();
    }

    let level_sum: f64 = entries.iter().map(|e| e.strength as f64).sum();
    let threshold = level_sum / entries.len() as f64;
    log::trace!("Using {:.1} dBm as signal strength threshold", threshold);

    let mut kept: Vec<&str> = entries
        .iter()
        .filter(|e| e.strength as f64 >= threshold)
        .map(|e| e.id.as_str())
        .collect();
    kept.sort_unstable();

    log::trace!("Filtered {} APs", entries.len() - kept.len());
    kept
}

/// Compute the fingerprint for a scan.
pub fn fingerprint(entries: &[ScanEntry]) -> Fingerprint {
    if entries.is_empty() {
        return Fingerprint::NoWifi;
    }

    let kept = strong_access_points(entries);
    let canonical = format!("[{}]", kept.join(", "));

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Fingerprint::Signature(Signature(hasher.finalize().into()))
}
