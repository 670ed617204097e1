use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use wifigps::cache::CacheRecord;
use wifigps::config::Config;
use wifigps::fingerprint::fingerprint;
use wifigps::models::{Location, LocationSource, ScanEntry, ScanSnapshot};
use wifigps::persistence::{CacheStore, SqliteCacheStore};
use wifigps::providers::{ProviderCall, Providers, RecordingProviders};
use wifigps::service::{LocationService, ServiceError, ServiceHandle, EVENT_QUEUE_CAPACITY};

struct Harness {
    handle: ServiceHandle,
    providers: Arc<RecordingProviders>,
    store: Arc<SqliteCacheStore>,
    task: JoinHandle<()>,
}

fn spawn_with(config: Config, store: Arc<SqliteCacheStore>) -> Harness {
    let providers = Arc::new(RecordingProviders::new());
    let (handle, task) = LocationService::spawn(
        config,
        Providers::from_shared(providers.clone()),
        store.clone(),
    );
    Harness {
        handle,
        providers,
        store,
        task,
    }
}

fn spawn_service() -> Harness {
    let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
    spawn_with(Config::default(), store)
}

fn home_scan() -> ScanSnapshot {
    ScanSnapshot::new(
        vec![ScanEntry::new("A", -70), ScanEntry::new("B", -90)],
        chrono::Utc::now().timestamp_millis(),
    )
}

fn office_scan() -> ScanSnapshot {
    ScanSnapshot::new(
        vec![ScanEntry::new("C", -55), ScanEntry::new("D", -58)],
        chrono::Utc::now().timestamp_millis(),
    )
}

fn fix(accuracy: f64) -> Location {
    Location::new(34.0689, -118.4452, accuracy, chrono::Utc::now().timestamp_millis())
}

/// Let timer tasks run, then wait for the loop to drain
async fn settle(handle: &ServiceHandle) {
    tokio::time::sleep(Duration::from_millis(1)).await;
    handle.flush().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_activates_and_scans() {
    let h = spawn_service();
    assert!(!h.handle.is_active());
    assert_eq!(h.handle.current_location(), None);

    h.handle.start("mobility").await.unwrap();
    settle(&h.handle).await;

    assert!(h.handle.is_active());
    assert!(h.handle.current_location().unwrap().is_unknown());
    assert_eq!(
        h.providers.calls(),
        vec![
            ProviderCall::AcquireLock,
            ProviderCall::RequestGps(60_000),
            ProviderCall::TriggerScan
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_gps_runs_without_any_scan() {
    let h = spawn_service();
    h.handle.set_scan_limit(0.0).await.unwrap();
    h.handle.start("mobility").await.unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;
    h.handle.flush().await.unwrap();
    assert_eq!(h.providers.count(ProviderCall::TriggerScan), 0);
    assert_eq!(h.providers.last_gps_call(), Some(ProviderCall::RequestGps(60_000)));

    h.handle.events().gps_fix(fix(5.0)).await.unwrap();
    h.handle.flush().await.unwrap();
    assert_eq!(h.handle.current_location().unwrap().source, LocationSource::Gps);
}

#[tokio::test(start_paused = true)]
async fn test_fourth_sighting_serves_network_fix() {
    let h = spawn_service();
    let events = h.handle.events();
    h.handle.start("mobility").await.unwrap();

    for _ in 0..3 {
        events.scan_results(home_scan()).await.unwrap();
    }
    settle(&h.handle).await;
    assert_eq!(h.providers.count(ProviderCall::RequestGps(60_000)), 1);

    events.scan_results(home_scan()).await.unwrap();
    settle(&h.handle).await;
    assert_eq!(h.providers.last_gps_call(), Some(ProviderCall::CancelGps));
    assert_eq!(h.providers.count(ProviderCall::RequestNetwork), 1);

    events.network_fix(fix(45.0)).await.unwrap();
    settle(&h.handle).await;

    let current = h.handle.current_location().unwrap();
    assert_eq!(current.source, LocationSource::Network);
    assert_eq!(current.accuracy, 45.0);
    assert_eq!(h.providers.count(ProviderCall::CancelNetwork), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_wifi_starts_gps() {
    let h = spawn_service();
    h.handle.start("mobility").await.unwrap();

    h.handle
        .events()
        .scan_results(ScanSnapshot::new(Vec::new(), 0))
        .await
        .unwrap();
    settle(&h.handle).await;

    assert_eq!(h.providers.last_gps_call(), Some(ProviderCall::RequestGps(60_000)));
}

#[tokio::test(start_paused = true)]
async fn test_inaccurate_fix_adopted_only_after_timeout() {
    let h = spawn_service();
    let events = h.handle.events();
    h.handle.start("mobility").await.unwrap();
    events.scan_results(home_scan()).await.unwrap();
    events.gps_fix(fix(20.0)).await.unwrap();
    settle(&h.handle).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    h.handle.flush().await.unwrap();
    assert!(h.handle.current_location().unwrap().is_unknown());

    tokio::time::sleep(Duration::from_secs(2)).await;
    h.handle.flush().await.unwrap();
    let current = h.handle.current_location().unwrap();
    assert_eq!(current.accuracy, 20.0);
    assert_eq!(current.source, LocationSource::Gps);
}

#[tokio::test(start_paused = true)]
async fn test_accurate_fix_cancels_pending_timeout() {
    let h = spawn_service();
    let events = h.handle.events();
    h.handle.start("mobility").await.unwrap();
    events.scan_results(home_scan()).await.unwrap();
    events.gps_fix(fix(20.0)).await.unwrap();
    events.gps_fix(fix(4.0)).await.unwrap();
    settle(&h.handle).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    h.handle.flush().await.unwrap();
    assert_eq!(h.handle.current_location().unwrap().accuracy, 4.0);
}

#[tokio::test(start_paused = true)]
async fn test_interval_negotiation() {
    let h = spawn_service();
    h.handle.start("mobility").await.unwrap();
    h.handle.events().scan_results(home_scan()).await.unwrap();
    settle(&h.handle).await;

    assert_eq!(h.handle.suggest_interval("mobility", 30_000).await, Ok(30_000));
    assert_eq!(h.handle.suggest_interval("survey", 10_000).await, Ok(10_000));
    assert_eq!(h.handle.suggest_interval("triggers", 90_000).await, Ok(10_000));
    assert_eq!(
        h.handle.suggest_interval("", 5_000).await,
        Err(ServiceError::InvalidClient)
    );
    assert_eq!(
        h.handle.suggest_interval("mobility", -5).await,
        Err(ServiceError::InvalidInterval(-5))
    );

    // Running GPS follows the negotiated interval
    assert_eq!(h.providers.count(ProviderCall::RequestGps(30_000)), 1);
    assert_eq!(h.providers.last_gps_call(), Some(ProviderCall::RequestGps(10_000)));

    h.handle.stop("survey").await.unwrap();
    h.handle.flush().await.unwrap();
    assert_eq!(h.providers.last_gps_call(), Some(ProviderCall::RequestGps(30_000)));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_start_rejected() {
    let h = spawn_service();
    assert_eq!(h.handle.start("  ").await, Err(ServiceError::InvalidClient));
    assert!(!h.handle.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_listeners_notified_on_signature_change() {
    let h = spawn_service();
    let events = h.handle.events();

    let (_, mut mobility) = h.handle.register_listener("mobility").await.unwrap();
    let (_, gone) = h.handle.register_listener("triggers").await.unwrap();
    drop(gone);
    // Listening alone doesn't activate the service
    assert!(!h.handle.is_active());

    h.handle.start("mobility").await.unwrap();
    events.scan_results(home_scan()).await.unwrap();
    events.scan_results(home_scan()).await.unwrap();
    events.scan_results(office_scan()).await.unwrap();
    settle(&h.handle).await;

    let first = mobility.try_recv().unwrap();
    assert_eq!(first.previous, None);
    let second = mobility.try_recv().unwrap();
    assert_eq!(second.previous, Some(first.current));
    assert_eq!(
        Some(second.current),
        fingerprint(&office_scan().entries).signature()
    );
    assert!(mobility.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_listener_gets_nothing() {
    let h = spawn_service();
    let (id, mut rx) = h.handle.register_listener("mobility").await.unwrap();
    assert_eq!(h.handle.unregister_listener(id).await, Ok(true));
    assert_eq!(h.handle.unregister_listener(id).await, Ok(false));

    h.handle.start("mobility").await.unwrap();
    h.handle.events().scan_results(home_scan()).await.unwrap();
    settle(&h.handle).await;

    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_last_stop_deactivates_and_persists() {
    let h = spawn_service();
    h.handle.start("mobility").await.unwrap();
    h.handle.start("triggers").await.unwrap();
    h.handle.events().scan_results(home_scan()).await.unwrap();
    settle(&h.handle).await;

    h.handle.stop("ghost").await.unwrap();
    h.handle.stop("mobility").await.unwrap();
    assert!(h.handle.is_active());

    h.handle.stop("triggers").await.unwrap();
    assert!(!h.handle.is_active());
    assert_eq!(h.handle.current_location(), None);
    assert_eq!(h.providers.last_gps_call(), Some(ProviderCall::CancelGps));
    assert_eq!(h.providers.count(ProviderCall::ReleaseLock), 1);

    h.handle.shutdown().await.unwrap();
    h.task.await.unwrap();

    let rows = h.store.load_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_reuses_stored_location() {
    let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
    let sig = fingerprint(&home_scan().entries).signature().unwrap();
    let stored = fix(6.0).with_source(LocationSource::Cached);
    store
        .sync_all(&[(
            sig,
            CacheRecord {
                count: 8,
                last_seen_ms: chrono::Utc::now().timestamp_millis(),
                location: Some(stored),
                // Rows carrying a location load as resolved regardless
                resolved: false,
            },
        )])
        .unwrap();

    let h = spawn_with(Config::default(), store);
    h.handle.start("mobility").await.unwrap();
    h.handle.events().scan_results(home_scan()).await.unwrap();
    settle(&h.handle).await;

    // GPS from activation is switched off by the familiar place
    assert_eq!(h.providers.last_gps_call(), Some(ProviderCall::CancelGps));
    let current = h.handle.current_location().unwrap();
    assert_eq!(current.source, LocationSource::Cached);
    assert_eq!(current.latitude, 34.0689);
}

#[tokio::test(start_paused = true)]
async fn test_budgets_gate_sensors() {
    let h = spawn_service();
    h.handle.set_gps_limit(0.0).await.unwrap();
    h.handle.set_scan_limit(0.0).await.unwrap();
    h.handle.start("mobility").await.unwrap();
    h.handle.events().scan_results(home_scan()).await.unwrap();
    settle(&h.handle).await;

    assert_eq!(h.providers.count(ProviderCall::TriggerScan), 0);
    assert_eq!(h.providers.last_gps_call(), None);

    let units = h.handle.identify_work_units().await.unwrap();
    assert_eq!(units.gps_minutes, 0.0);
    assert_eq!(units.scan_count, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_scan_timer_repeats() {
    let h = spawn_service();
    h.handle.start("mobility").await.unwrap();
    settle(&h.handle).await;

    tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
    h.handle.flush().await.unwrap();

    assert_eq!(h.providers.count(ProviderCall::TriggerScan), 2);
    let units = h.handle.identify_work_units().await.unwrap();
    assert_eq!(units.scan_count, 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_prefer_network_mode() {
    let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
    let mut config = Config::default();
    config.engine.prefer_network_location = true;

    let h = spawn_with(config, store);
    h.handle.start("mobility").await.unwrap();
    settle(&h.handle).await;
    assert_eq!(h.providers.count(ProviderCall::RequestNetwork), 1);

    h.handle.events().scan_results(home_scan()).await.unwrap();
    settle(&h.handle).await;
    // Sightings only toggle GPS in this mode
    assert_eq!(h.providers.last_gps_call(), None);

    h.handle
        .events()
        .scan_results(ScanSnapshot::new(Vec::new(), 0))
        .await
        .unwrap();
    settle(&h.handle).await;
    assert_eq!(h.providers.last_gps_call(), Some(ProviderCall::RequestGps(60_000)));
}

#[tokio::test(start_paused = true)]
async fn test_network_ticks_outlive_unanswered_requests() {
    let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
    let mut config = Config::default();
    config.engine.prefer_network_location = true;

    let h = spawn_with(config, store);
    h.handle.start("mobility").await.unwrap();
    settle(&h.handle).await;

    // The provider never answers
    tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
    h.handle.flush().await.unwrap();
    assert_eq!(h.providers.count(ProviderCall::RequestNetwork), 3);
    assert_eq!(h.providers.count(ProviderCall::CancelNetwork), 2);

    h.handle.events().network_fix(fix(60.0)).await.unwrap();
    h.handle.flush().await.unwrap();
    assert_eq!(h.handle.current_location().unwrap().source, LocationSource::Network);
}

#[tokio::test(start_paused = true)]
async fn test_new_place_gets_its_own_network_request() {
    let h = spawn_service();
    let events = h.handle.events();
    h.handle.start("mobility").await.unwrap();

    for _ in 0..4 {
        events.scan_results(home_scan()).await.unwrap();
    }
    settle(&h.handle).await;
    assert_eq!(h.providers.count(ProviderCall::RequestNetwork), 1);

    // The home request is never answered
    for _ in 0..4 {
        events.scan_results(office_scan()).await.unwrap();
    }
    settle(&h.handle).await;
    assert_eq!(h.providers.count(ProviderCall::CancelNetwork), 1);
    assert_eq!(h.providers.count(ProviderCall::RequestNetwork), 2);

    events.network_fix(fix(35.0)).await.unwrap();
    settle(&h.handle).await;
    let current = h.handle.current_location().unwrap();
    assert_eq!(current.source, LocationSource::Network);
    assert_eq!(current.accuracy, 35.0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_network_request_retried_later() {
    let h = spawn_service();
    let events = h.handle.events();
    h.providers.set_network_unavailable(true);
    h.handle.start("mobility").await.unwrap();

    for _ in 0..4 {
        events.scan_results(home_scan()).await.unwrap();
    }
    settle(&h.handle).await;
    assert_eq!(h.providers.count(ProviderCall::RequestNetwork), 0);
    assert!(h.handle.current_location().unwrap().is_unknown());

    // A fix arriving now wasn't asked for
    events.network_fix(fix(45.0)).await.unwrap();
    settle(&h.handle).await;
    assert!(h.handle.current_location().unwrap().is_unknown());

    h.providers.set_network_unavailable(false);
    events.scan_results(home_scan()).await.unwrap();
    settle(&h.handle).await;
    assert_eq!(h.providers.count(ProviderCall::RequestNetwork), 1);

    events.network_fix(fix(45.0)).await.unwrap();
    settle(&h.handle).await;
    assert_eq!(h.handle.current_location().unwrap().source, LocationSource::Network);
}

#[tokio::test]
async fn test_try_gps_fix_reports_full_queue() {
    let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
    let providers = Providers::from_shared(Arc::new(RecordingProviders::new()));
    // Not running, so nothing drains the queue
    let (service, handle) = LocationService::new(Config::default(), providers, store);
    let events = handle.events();

    for _ in 0..EVENT_QUEUE_CAPACITY {
        events.try_gps_fix(fix(5.0)).unwrap();
    }
    assert_eq!(events.try_gps_fix(fix(5.0)), Err(ServiceError::Busy));

    drop(service);
    assert_eq!(events.try_gps_fix(fix(5.0)), Err(ServiceError::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_last_scan_snapshot() {
    let h = spawn_service();
    assert!(h.handle.last_scan_snapshot().is_empty());

    let scan = home_scan();
    h.handle.events().scan_results(scan.clone()).await.unwrap();
    h.handle.flush().await.unwrap();

    let snapshot = h.handle.last_scan_snapshot();
    assert_eq!(snapshot, scan);
    assert_eq!(snapshot.to_json()["scan"][0]["ssid"], "A");
}

#[tokio::test(start_paused = true)]
async fn test_requests_fail_after_shutdown() {
    let h = spawn_service();
    h.handle.shutdown().await.unwrap();
    h.task.await.unwrap();

    assert_eq!(h.handle.start("mobility").await, Err(ServiceError::Stopped));
    assert_eq!(h.handle.current_location(), None);
}
