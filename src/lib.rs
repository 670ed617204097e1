pub mod budget;
pub mod cache;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod input;
pub mod models;
pub mod negotiator;
pub mod notifier;
pub mod persistence;
pub mod providers;
pub mod service;

// Re-export commonly used types
pub use config::Config;
pub use engine::{Command, DutyCycleEngine};
pub use fingerprint::{fingerprint, Fingerprint, Signature};
pub use models::{Location, LocationSource, ScanEntry, ScanSnapshot, WorkUnits};
pub use notifier::{ListenerId, MobilityNotice};
pub use persistence::{CacheStore, SqliteCacheStore};
pub use providers::{Providers, RecordingProviders};
pub use service::{EventSender, LocationService, ServiceError, ServiceHandle};
