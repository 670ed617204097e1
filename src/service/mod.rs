//! The location service
//!
//! A single task owns the engine, the client registry and the listener
//! list. Sensor callbacks, timer firings and client requests all arrive
//! as events on one channel and are handled one at a time, so no two
//! decisions ever interleave. Anything slow (storage) runs on blocking
//! tasks against a snapshot taken inside the loop.

pub mod event;
pub mod handle;
mod timers;

pub use event::EventSender;
pub use handle::ServiceHandle;

use crate::config::Config;
use crate::engine::{Command, DutyCycleEngine};
use crate::fingerprint::fingerprint;
use crate::models::{Location, ScanSnapshot};
use crate::negotiator::{ClientNegotiator, NegotiationError, StopOutcome};
use crate::notifier::MobilityNotifier;
use crate::persistence::CacheStore;
use crate::providers::Providers;
use event::{Reply, ServiceEvent};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use timers::Timers;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Capacity of the decision loop's event queue
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Errors returned to service clients
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Client id missing")]
    InvalidClient,

    #[error("Invalid interval: {0} ms")]
    InvalidInterval(i64),

    #[error("Event queue full")]
    Busy,

    #[error("Location service stopped")]
    Stopped,
}

impl From<NegotiationError> for ServiceError {
    fn from(e: NegotiationError) -> Self {
        match e {
            NegotiationError::MissingClient => ServiceError::InvalidClient,
            NegotiationError::NegativeInterval(ms) => ServiceError::InvalidInterval(ms),
        }
    }
}

/// What handles can read without a round trip
#[derive(Debug, Clone, Default)]
pub(crate) struct ServiceState {
    pub active: bool,
    pub location: Option<Location>,
    pub last_scan: ScanSnapshot,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct LocationService {
    config: Config,
    engine: DutyCycleEngine,
    negotiator: ClientNegotiator,
    notifier: MobilityNotifier,
    providers: Providers,
    store: Arc<dyn CacheStore>,
    timers: Timers,
    active: bool,
    tx: mpsc::Sender<ServiceEvent>,
    rx: mpsc::Receiver<ServiceEvent>,
    state: watch::Sender<ServiceState>,
    pending_sync: Option<JoinHandle<()>>,
}

impl LocationService {
    /// Build a service and the handle clients use to reach it.
    ///
    /// Nothing happens until `run` is awaited (usually via `spawn`).
    pub fn new(config: Config, providers: Providers, store: Arc<dyn CacheStore>) -> (Self, ServiceHandle) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (state, state_rx) = watch::channel(ServiceState::default());

        let service = LocationService {
            engine: DutyCycleEngine::from_config(&config, now_ms()),
            negotiator: ClientNegotiator::new(config.scheduling.default_gps_interval_ms),
            notifier: MobilityNotifier::new(),
            providers,
            store,
            timers: Timers::default(),
            active: false,
            tx: tx.clone(),
            rx,
            state,
            pending_sync: None,
            config,
        };
        (service, ServiceHandle::new(tx, state_rx))
    }

    /// Build a service and run it on a new task
    pub fn spawn(
        config: Config,
        providers: Providers,
        store: Arc<dyn CacheStore>,
    ) -> (ServiceHandle, JoinHandle<()>) {
        let (service, handle) = LocationService::new(config, providers, store);
        let task = tokio::spawn(service.run());
        (handle, task)
    }

    /// Load the stored cache, then handle events until shutdown
    pub async fn run(mut self) {
        self.load_cache().await;
        log::info!("Location service running");

        while let Some(event) = self.rx.recv().await {
            if let ControlFlow::Break(reply) = self.handle_event(event) {
                self.shutdown().await;
                let _ = reply.send(());
                break;
            }
        }

        log::info!("Location service stopped");
    }

    async fn load_cache(&mut self) {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.load_all()).await {
            Ok(Ok(rows)) => self.engine.load_cache(rows),
            Ok(Err(e)) => log::error!("Failed to load location cache: {}", e),
            Err(e) => log::error!("Cache load task failed: {}", e),
        }
    }

    fn handle_event(&mut self, event: ServiceEvent) -> ControlFlow<Reply<()>> {
        let now = now_ms();

        match event {
            ServiceEvent::ScanResults(snapshot) => self.on_scan_results(snapshot, now),
            ServiceEvent::GpsFix(fix) => {
                let commands = self.engine.on_gps_fix(fix, now);
                self.execute(commands);
            }
            ServiceEvent::NetworkFix(fix) => {
                let commands = self.engine.on_network_fix(fix);
                self.execute(commands);
            }
            ServiceEvent::NetworkProviderEnabled(enabled) => {
                let commands = self.engine.set_network_available(enabled);
                self.execute(commands);
            }
            ServiceEvent::ScanTick => self.on_scan_tick(),
            ServiceEvent::CleanupTick => self.run_janitor(now),
            ServiceEvent::NetworkTick => {
                let commands = self.engine.on_network_tick();
                self.execute(commands);
            }
            ServiceEvent::AccuracyTimeout(token) => {
                let commands = self.engine.on_accuracy_timeout(token, now);
                self.execute(commands);
            }
            ServiceEvent::Start { client_id, reply } => {
                let result = self.start_client(&client_id, now);
                self.respond(reply, result);
            }
            ServiceEvent::Stop { client_id, reply } => {
                self.stop_client(&client_id, now);
                self.respond(reply, ());
            }
            ServiceEvent::SuggestInterval {
                client_id,
                interval_ms,
                reply,
            } => {
                let result = self
                    .negotiator
                    .suggest(&client_id, interval_ms)
                    .map_err(ServiceError::from);
                if result.is_ok() {
                    self.apply_interval();
                }
                self.respond(reply, result);
            }
            ServiceEvent::RegisterListener { client_id, reply } => {
                let result = if self.negotiator.register(&client_id) {
                    let (tx, rx) = MobilityNotifier::create_channel();
                    let id = self.notifier.register(client_id.trim(), tx);
                    self.apply_interval();
                    Ok((id, rx))
                } else {
                    Err(ServiceError::InvalidClient)
                };
                self.respond(reply, result);
            }
            ServiceEvent::UnregisterListener { id, reply } => {
                let removed = self.notifier.unregister(id);
                self.respond(reply, removed);
            }
            ServiceEvent::IdentifyWorkUnits { reply } => {
                let units = self.engine.identify_work_units(now);
                self.respond(reply, units);
            }
            ServiceEvent::SetGpsLimit { minutes } => {
                let commands = self.engine.set_gps_limit(minutes, now);
                self.execute(commands);
            }
            ServiceEvent::SetScanLimit { scans } => self.engine.set_scan_limit(scans),
            ServiceEvent::Flush { reply } => self.respond(reply, ()),
            ServiceEvent::Shutdown { reply } => return ControlFlow::Break(reply),
        }

        self.publish();
        ControlFlow::Continue(())
    }

    // =====================
    // Sensor events
    // =====================

    fn on_scan_results(&mut self, snapshot: ScanSnapshot, now: i64) {
        let fingerprint = fingerprint(&snapshot.entries);
        log::debug!("Scan with {} APs", snapshot.entries.len());
        self.state.send_modify(|s| s.last_scan = snapshot);

        if !self.active {
            log::trace!("Service inactive, not acting on scan");
            return;
        }
        let commands = self.engine.on_fingerprint(fingerprint, now);
        self.execute(commands);
    }

    fn on_scan_tick(&mut self) {
        if !self.active {
            return;
        }
        if !self.engine.try_scan() {
            log::debug!("No scan budget, skipping WiFi scan");
            return;
        }
        if let Err(e) = self.providers.scan.trigger_scan() {
            log::error!("Failed to trigger WiFi scan: {}", e);
        }
    }

    // =====================
    // Clients
    // =====================

    fn start_client(&mut self, client_id: &str, now: i64) -> Result<(), ServiceError> {
        if !self.negotiator.register(client_id) {
            return Err(ServiceError::InvalidClient);
        }
        log::info!("{} started location service", client_id.trim());

        if !self.active {
            self.activate(now);
        }
        self.apply_interval();
        Ok(())
    }

    fn stop_client(&mut self, client_id: &str, now: i64) {
        match self.negotiator.remove(client_id.trim()) {
            StopOutcome::Unknown => {
                log::debug!("Stop from unknown client {}", client_id);
                return;
            }
            StopOutcome::Remaining(_) => {
                log::info!("{} stopped location service", client_id.trim());
            }
            StopOutcome::Emptied => {
                log::info!("{} stopped location service, no clients left", client_id.trim());
                if self.active {
                    self.deactivate(now);
                }
            }
        }
        self.apply_interval();
    }

    fn activate(&mut self, now: i64) {
        log::info!("Activating location service");
        self.active = true;

        if let Err(e) = self.providers.scan.acquire_lock() {
            log::error!("Failed to acquire WiFi lock: {}", e);
        }
        let commands = self.engine.on_activate(now);
        self.execute(commands);

        let scheduling = &self.config.scheduling;
        Timers::periodic(
            &mut self.timers.scan,
            self.tx.clone(),
            Duration::ZERO,
            Duration::from_millis(scheduling.wifi_scan_interval_ms),
            || ServiceEvent::ScanTick,
        );
        let cleanup = Duration::from_millis(self.config.cache.cleanup_interval_ms);
        Timers::periodic(
            &mut self.timers.cleanup,
            self.tx.clone(),
            cleanup,
            cleanup,
            || ServiceEvent::CleanupTick,
        );
        if self.config.engine.prefer_network_location {
            self.arm_network_timer();
        }
    }

    fn deactivate(&mut self, now: i64) {
        log::info!("Deactivating location service");
        self.timers.cancel_periodic();

        let commands = self.engine.suspend(now);
        self.execute(commands);
        self.run_janitor(now);

        self.providers.scan.release_lock();
        self.active = false;
    }

    fn arm_network_timer(&mut self) {
        let interval = Duration::from_millis(self.engine.gps_interval());
        Timers::periodic(
            &mut self.timers.network,
            self.tx.clone(),
            Duration::ZERO,
            interval,
            || ServiceEvent::NetworkTick,
        );
    }

    /// Push the negotiated interval into the engine
    fn apply_interval(&mut self) {
        let interval = self.negotiator.effective_interval();
        if interval == self.engine.gps_interval() {
            return;
        }

        let commands = self.engine.set_gps_interval(interval);
        self.execute(commands);
        if self.active && self.config.engine.prefer_network_location {
            self.arm_network_timer();
        }
    }

    // =====================
    // Commands and state
    // =====================

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::StartGps { interval_ms } => {
                    if let Err(e) = self.providers.gps.request_updates(interval_ms) {
                        log::error!("Failed to request GPS updates: {}", e);
                    }
                }
                Command::StopGps => self.providers.gps.cancel_updates(),
                Command::RequestNetworkFix => {
                    if let Err(e) = self.providers.network.request_single_update() {
                        log::error!("Failed to request network location: {}", e);
                        self.engine.network_request_failed();
                    }
                }
                Command::CancelNetworkFix => self.providers.network.cancel(),
                Command::ArmAccuracyTimeout { token, after_ms } => {
                    Timers::once(
                        &mut self.timers.accuracy,
                        self.tx.clone(),
                        Duration::from_millis(after_ms),
                        ServiceEvent::AccuracyTimeout(token),
                    );
                }
                Command::CancelAccuracyTimeout => Timers::cancel(&mut self.timers.accuracy),
                Command::NotifyMobility(notice) => {
                    self.notifier.notify_all(notice);
                }
            }
        }
    }

    fn publish(&self) {
        let active = self.active;
        let location = active.then(|| self.engine.current_location());
        self.state.send_modify(|s| {
            s.active = active;
            s.location = location;
        });
    }

    fn respond<T>(&self, reply: Reply<T>, value: T) {
        self.publish();
        if reply.send(value).is_err() {
            log::trace!("Requester went away before the reply");
        }
    }

    // =====================
    // Cache maintenance
    // =====================

    fn run_janitor(&mut self, now: i64) {
        self.engine.run_janitor(now);
        self.persist();
    }

    /// Write a snapshot of the cache on a blocking task.
    ///
    /// Syncs are chained so an older snapshot never lands after a newer one.
    fn persist(&mut self) {
        let rows = self.engine.cache_snapshot();
        let store = self.store.clone();
        let previous = self.pending_sync.take();

        self.pending_sync = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let count = rows.len();
            match tokio::task::spawn_blocking(move || store.sync_all(&rows)).await {
                Ok(Ok(())) => log::debug!("Persisted {} cache entries", count),
                Ok(Err(e)) => log::error!("Failed to persist location cache: {}", e),
                Err(e) => log::error!("Cache sync task failed: {}", e),
            }
        }));
    }

    async fn shutdown(&mut self) {
        log::info!("Shutting down location service");
        let now = now_ms();

        self.timers.cancel_all();
        let commands = self.engine.suspend(now);
        self.execute(commands);

        if self.active {
            self.providers.scan.release_lock();
            self.active = false;
        }

        self.persist();
        if let Some(sync) = self.pending_sync.take() {
            if let Err(e) = sync.await {
                log::error!("Cache sync task failed: {}", e);
            }
        }
        self.publish();
    }
}
