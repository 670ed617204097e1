use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::watch;

use wifigps::config::Config;
use wifigps::input::TraceReplayer;
use wifigps::persistence::SqliteCacheStore;
use wifigps::providers::{Providers, RecordingProviders};
use wifigps::service::LocationService;

const DAEMON_CLIENT: &str = "wifigps_daemon";

/// Location service daemon
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Some(Config::from_file(&config_path)?)
    } else {
        None
    };
    let config_found = config.is_some();
    let config = config.unwrap_or_default();

    // Initialize logging
    let level = log::LevelFilter::from_str(&config.logging.level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    log::info!("Starting WiFiGPS daemon...");
    if !config_found {
        log::warn!("Config file {:?} not found, using defaults", config_path);
    }

    // Setup graceful shutdown signal handling
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        let _ = shutdown_tx.send(true);
    })?;

    let store = Arc::new(SqliteCacheStore::new(&config.cache.database_path)?);
    log::info!("Location cache at {:?}", config.cache.database_path);

    // No platform sensors here: requests are logged and data comes from the trace
    let providers = Providers::from_shared(Arc::new(RecordingProviders::new()));

    let trace_path = config.input.trace_path.clone();
    let (handle, service_task) = LocationService::spawn(config, providers, store);
    handle.start(DAEMON_CLIENT).await?;

    let (_listener, mut notices) = handle.register_listener(DAEMON_CLIENT).await?;
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            log::info!(
                "Location may have changed: {:?} -> {}",
                notice.previous,
                notice.current
            );
        }
    });

    if let Some(path) = trace_path {
        let replayer = TraceReplayer::new(path);
        let events = handle.events();
        let replay_handle = handle.clone();
        tokio::spawn(async move {
            match replayer.run(events).await {
                Ok(_) => {
                    if let Err(e) = replay_handle.flush().await {
                        log::error!("Service stopped during replay: {}", e);
                        return;
                    }
                    match replay_handle.current_location() {
                        Some(location) => log::info!(
                            "Current location after replay: {}, {} ({} m, {})",
                            location.latitude,
                            location.longitude,
                            location.accuracy,
                            location.source
                        ),
                        None => log::info!("Service inactive after replay"),
                    }
                }
                Err(e) => log::error!("Trace replay failed: {}", e),
            }
        });
    } else {
        log::info!("No trace configured, waiting for shutdown");
    }

    log::info!("Daemon running. Press Ctrl+C to stop.");
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    handle.stop(DAEMON_CLIENT).await?;
    handle.shutdown().await?;
    service_task.await?;

    log::info!("WiFiGPS daemon stopped");
    Ok(())
}
