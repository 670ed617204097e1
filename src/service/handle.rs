use super::event::{EventSender, ServiceEvent};
use super::{ServiceError, ServiceState};
use crate::models::{Location, ScanSnapshot, WorkUnits};
use crate::notifier::{ListenerId, MobilityNotice};
use tokio::sync::{mpsc, oneshot, watch};

/// Client-facing surface of a running `LocationService`.
///
/// Reads (`is_active`, `current_location`, `last_scan_snapshot`) come
/// from the last published state and never wait on the decision loop.
/// Everything else is a request answered by the loop.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<ServiceEvent>,
    state: watch::Receiver<ServiceState>,
}

impl ServiceHandle {
    pub(crate) fn new(tx: mpsc::Sender<ServiceEvent>, state: watch::Receiver<ServiceState>) -> Self {
        ServiceHandle { tx, state }
    }

    /// Sender for sensor callbacks
    pub fn events(&self) -> EventSender {
        EventSender::new(self.tx.clone())
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Current location, or `None` while no client has started the service.
    ///
    /// While active this is a real fix or the unknown sentinel.
    pub fn current_location(&self) -> Option<Location> {
        self.state.borrow().location
    }

    /// Last delivered WiFi scan (empty if none yet)
    pub fn last_scan_snapshot(&self) -> ScanSnapshot {
        self.state.borrow().last_scan.clone()
    }

    /// Suggest a GPS interval for `client_id`, returning the negotiated one
    pub async fn suggest_interval(&self, client_id: &str, interval_ms: i64) -> Result<u64, ServiceError> {
        let client_id = client_id.to_string();
        self.request(|reply| ServiceEvent::SuggestInterval {
            client_id,
            interval_ms,
            reply,
        })
        .await?
    }

    /// Subscribe to mobility notices on behalf of `client_id`
    pub async fn register_listener(
        &self,
        client_id: &str,
    ) -> Result<(ListenerId, mpsc::Receiver<MobilityNotice>), ServiceError> {
        let client_id = client_id.to_string();
        self.request(|reply| ServiceEvent::RegisterListener { client_id, reply })
            .await?
    }

    /// Returns false if the listener wasn't registered
    pub async fn unregister_listener(&self, id: ListenerId) -> Result<bool, ServiceError> {
        self.request(|reply| ServiceEvent::UnregisterListener { id, reply })
            .await
    }

    pub async fn start(&self, client_id: &str) -> Result<(), ServiceError> {
        let client_id = client_id.to_string();
        self.request(|reply| ServiceEvent::Start { client_id, reply })
            .await?
    }

    /// Stopping an unknown client is a no-op
    pub async fn stop(&self, client_id: &str) -> Result<(), ServiceError> {
        let client_id = client_id.to_string();
        self.request(|reply| ServiceEvent::Stop { client_id, reply })
            .await
    }

    /// Work done so far, for the power arbiter
    pub async fn identify_work_units(&self) -> Result<WorkUnits, ServiceError> {
        self.request(|reply| ServiceEvent::IdentifyWorkUnits { reply })
            .await
    }

    pub async fn set_gps_limit(&self, minutes: f64) -> Result<(), ServiceError> {
        self.send(ServiceEvent::SetGpsLimit { minutes }).await
    }

    pub async fn set_scan_limit(&self, scans: f64) -> Result<(), ServiceError> {
        self.send(ServiceEvent::SetScanLimit { scans }).await
    }

    /// Wait until every event queued before this call has been handled
    pub async fn flush(&self) -> Result<(), ServiceError> {
        self.request(|reply| ServiceEvent::Flush { reply }).await
    }

    /// Stop sensors, persist the cache and end the decision loop
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.request(|reply| ServiceEvent::Shutdown { reply }).await
    }

    async fn send(&self, event: ServiceEvent) -> Result<(), ServiceError> {
        self.tx.send(event).await.map_err(|_| ServiceError::Stopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ServiceEvent,
    ) -> Result<T, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }
}
