//! Providers that log and record requests without touching hardware.
//!
//! Used by the daemon when scans and fixes come from a replayed trace,
//! and by tests to check which requests the service issued.

use super::{GpsProvider, NetworkProvider, ProviderError, ScanProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A request issued to a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCall {
    AcquireLock,
    ReleaseLock,
    TriggerScan,
    RequestGps(u64),
    CancelGps,
    RequestNetwork,
    CancelNetwork,
}

#[derive(Default)]
pub struct RecordingProviders {
    calls: Mutex<Vec<ProviderCall>>,
    network_unavailable: AtomicBool,
}

impl RecordingProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make network requests fail from now on
    pub fn set_network_unavailable(&self, unavailable: bool) {
        self.network_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every call recorded so far
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().clone()
    }

    /// Number of calls matching `call`
    pub fn count(&self, call: ProviderCall) -> usize {
        self.lock().iter().filter(|c| **c == call).count()
    }

    /// The most recent GPS request or cancel, if any
    pub fn last_gps_call(&self) -> Option<ProviderCall> {
        self.lock()
            .iter()
            .rev()
            .find(|c| matches!(c, ProviderCall::RequestGps(_) | ProviderCall::CancelGps))
            .copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProviderCall>> {
        // A poisoned log is still a usable log
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: ProviderCall) {
        log::debug!("Provider request: {:?}", call);
        self.lock().push(call);
    }
}

impl ScanProvider for RecordingProviders {
    fn acquire_lock(&self) -> Result<(), ProviderError> {
        self.record(ProviderCall::AcquireLock);
        Ok(())
    }

    fn release_lock(&self) {
        self.record(ProviderCall::ReleaseLock);
    }

    fn trigger_scan(&self) -> Result<(), ProviderError> {
        self.record(ProviderCall::TriggerScan);
        Ok(())
    }
}

impl GpsProvider for RecordingProviders {
    fn request_updates(&self, interval_ms: u64) -> Result<(), ProviderError> {
        self.record(ProviderCall::RequestGps(interval_ms));
        Ok(())
    }

    fn cancel_updates(&self) {
        self.record(ProviderCall::CancelGps);
    }
}

impl NetworkProvider for RecordingProviders {
    fn request_single_update(&self) -> Result<(), ProviderError> {
        if self.network_unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("network provider disabled".to_string()));
        }
        self.record(ProviderCall::RequestNetwork);
        Ok(())
    }

    fn cancel(&self) {
        self.record(ProviderCall::CancelNetwork);
    }
}
