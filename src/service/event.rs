use super::ServiceError;
use crate::models::{Location, ScanSnapshot, WorkUnits};
use crate::notifier::{ListenerId, MobilityNotice};
use tokio::sync::{mpsc, oneshot};

pub(crate) type Reply<T> = oneshot::Sender<T>;

pub(crate) type ListenerRegistration = (ListenerId, mpsc::Receiver<MobilityNotice>);

/// Everything the decision loop reacts to, in arrival order
pub(crate) enum ServiceEvent {
    // Sensor callbacks
    ScanResults(ScanSnapshot),
    GpsFix(Location),
    NetworkFix(Location),
    NetworkProviderEnabled(bool),

    // Timers
    ScanTick,
    CleanupTick,
    NetworkTick,
    AccuracyTimeout(u64),

    // Client requests
    Start {
        client_id: String,
        reply: Reply<Result<(), ServiceError>>,
    },
    Stop {
        client_id: String,
        reply: Reply<()>,
    },
    SuggestInterval {
        client_id: String,
        interval_ms: i64,
        reply: Reply<Result<u64, ServiceError>>,
    },
    RegisterListener {
        client_id: String,
        reply: Reply<Result<ListenerRegistration, ServiceError>>,
    },
    UnregisterListener {
        id: ListenerId,
        reply: Reply<bool>,
    },

    // Power arbiter
    IdentifyWorkUnits {
        reply: Reply<WorkUnits>,
    },
    SetGpsLimit {
        minutes: f64,
    },
    SetScanLimit {
        scans: f64,
    },

    Flush {
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Entry point for sensor callbacks.
///
/// Providers (or a trace replayer) push their results here; each one
/// becomes an event on the service's decision loop.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ServiceEvent>,
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::Sender<ServiceEvent>) -> Self {
        EventSender { tx }
    }

    /// Deliver a finished WiFi scan
    pub async fn scan_results(&self, snapshot: ScanSnapshot) -> Result<(), ServiceError> {
        self.send(ServiceEvent::ScanResults(snapshot)).await
    }

    /// Deliver a GPS fix
    pub async fn gps_fix(&self, fix: Location) -> Result<(), ServiceError> {
        self.send(ServiceEvent::GpsFix(fix)).await
    }

    /// Deliver a network-location fix
    pub async fn network_fix(&self, fix: Location) -> Result<(), ServiceError> {
        self.send(ServiceEvent::NetworkFix(fix)).await
    }

    /// Report that the network provider was enabled or disabled
    pub async fn network_enabled(&self, enabled: bool) -> Result<(), ServiceError> {
        self.send(ServiceEvent::NetworkProviderEnabled(enabled)).await
    }

    /// Non-blocking variant of `gps_fix` for synchronous callbacks
    pub fn try_gps_fix(&self, fix: Location) -> Result<(), ServiceError> {
        self.tx
            .try_send(ServiceEvent::GpsFix(fix))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Event queue full, dropping GPS fix");
                    ServiceError::Busy
                }
                mpsc::error::TrySendError::Closed(_) => ServiceError::Stopped,
            })
    }

    async fn send(&self, event: ServiceEvent) -> Result<(), ServiceError> {
        self.tx.send(event).await.map_err(|_| ServiceError::Stopped)
    }
}
