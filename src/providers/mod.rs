//! Sensor collaborators
//!
//! The service only issues requests through these traits. Results
//! (scan lists, GPS fixes, network fixes) come back asynchronously as
//! events on the service's `EventSender`, so no call here waits for a
//! sensor.

pub mod recording;

pub use recording::{ProviderCall, RecordingProviders};

use std::sync::Arc;
use thiserror::Error;

/// Errors reported by sensor providers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider registration failed: {0}")]
    Registration(String),
}

/// WiFi scanner
pub trait ScanProvider: Send + Sync {
    /// Keep the radio on while the service is active
    fn acquire_lock(&self) -> Result<(), ProviderError>;

    fn release_lock(&self);

    /// Start a scan; results arrive as a `ScanResults` event
    fn trigger_scan(&self) -> Result<(), ProviderError>;
}

/// GPS receiver
pub trait GpsProvider: Send + Sync {
    /// Deliver fixes every `interval_ms` until cancelled.
    ///
    /// Calling again while running replaces the interval.
    fn request_updates(&self, interval_ms: u64) -> Result<(), ProviderError>;

    fn cancel_updates(&self);
}

/// Network (cell/WiFi database) location
pub trait NetworkProvider: Send + Sync {
    /// Deliver at most one fix
    fn request_single_update(&self) -> Result<(), ProviderError>;

    fn cancel(&self);
}

/// The set of providers a service talks to
#[derive(Clone)]
pub struct Providers {
    pub scan: Arc<dyn ScanProvider>,
    pub gps: Arc<dyn GpsProvider>,
    pub network: Arc<dyn NetworkProvider>,
}

impl Providers {
    pub fn new(
        scan: Arc<dyn ScanProvider>,
        gps: Arc<dyn GpsProvider>,
        network: Arc<dyn NetworkProvider>,
    ) -> Self {
        Providers { scan, gps, network }
    }

    /// Use one object for all three providers
    pub fn from_shared<P>(provider: Arc<P>) -> Self
    where
        P: ScanProvider + GpsProvider + NetworkProvider + 'static,
    {
        Providers {
            scan: provider.clone(),
            gps: provider.clone(),
            network: provider,
        }
    }
}
