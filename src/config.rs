use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const ONE_SECOND_MS: i64 = 1000;
const ONE_MINUTE_MS: i64 = 60 * ONE_SECOND_MS;
const ONE_HOUR_MS: i64 = 60 * ONE_MINUTE_MS;
const ONE_DAY_MS: i64 = 24 * ONE_HOUR_MS;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the location service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Duty-cycle decision settings
    pub engine: EngineConfig,
    /// Cache eviction and storage settings
    pub cache: CacheConfig,
    /// Timer and interval settings
    pub scheduling: SchedulingConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Trace replay input
    pub input: InputConfig,
}

/// Duty-cycle decision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sightings required before a fingerprint is trusted
    pub significance_threshold: u32,
    /// Sightings after which a record is never evicted
    pub critical_threshold: u32,
    /// GPS fixes with accuracy below this (meters) are accurate
    pub gps_accuracy_threshold: f64,
    /// How long to wait for an accurate fix before settling for an inaccurate one
    pub accuracy_timeout_ms: u64,
    /// Whether network location may be used at startup
    pub use_network_location: bool,
    /// Rely on periodic network fixes and only use GPS where there is no WiFi
    pub prefer_network_location: bool,
}

/// Cache eviction and storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the SQLite cache database
    pub database_path: PathBuf,
    /// How often the janitor runs
    pub cleanup_interval_ms: u64,
    /// Age after which an insignificant record is evicted
    pub transient_age_ms: i64,
    /// Base lifetime of a significant record
    pub cache_timeout_ms: i64,
    /// Extra lifetime granted per sighting
    pub extension_ms: i64,
}

/// Timer and interval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// GPS interval used when no client suggested one
    pub default_gps_interval_ms: u64,
    /// Period of WiFi scans while active
    pub wifi_scan_interval_ms: u64,
    /// Accounting horizon of the power arbiter
    pub power_horizon_ms: u64,
    /// How often the power arbiter samples work
    pub history_sample_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is unset
    pub level: String,
}

/// Trace replay input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// JSONL trace of scans and fixes to replay
    pub trace_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            significance_threshold: 3,
            critical_threshold: 15,
            gps_accuracy_threshold: 10.0,
            accuracy_timeout_ms: 5 * ONE_SECOND_MS as u64,
            use_network_location: true,
            prefer_network_location: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            database_path: PathBuf::from("wifigps_cache.db"),
            cleanup_interval_ms: ONE_HOUR_MS as u64,
            transient_age_ms: ONE_HOUR_MS,
            cache_timeout_ms: 10 * ONE_DAY_MS,
            extension_ms: ONE_HOUR_MS,
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        SchedulingConfig {
            default_gps_interval_ms: ONE_MINUTE_MS as u64,
            wifi_scan_interval_ms: 2 * ONE_MINUTE_MS as u64,
            power_horizon_ms: ONE_HOUR_MS as u64,
            history_sample_ms: 2 * ONE_MINUTE_MS as u64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl SchedulingConfig {
    /// Number of work samples that fit in one power horizon
    pub fn history_capacity(&self) -> usize {
        (self.power_horizon_ms / self.history_sample_ms.max(1)).max(1) as usize
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings the engine can't run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.significance_threshold >= engine.critical_threshold {
            return Err(ConfigError::Invalid(format!(
                "significance_threshold ({}) must be below critical_threshold ({})",
                engine.significance_threshold, engine.critical_threshold
            )));
        }
        if engine.gps_accuracy_threshold.is_nan() || engine.gps_accuracy_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "gps_accuracy_threshold must be positive".to_string(),
            ));
        }

        let intervals = [
            ("accuracy_timeout_ms", engine.accuracy_timeout_ms),
            ("cleanup_interval_ms", self.cache.cleanup_interval_ms),
            ("default_gps_interval_ms", self.scheduling.default_gps_interval_ms),
            ("wifi_scan_interval_ms", self.scheduling.wifi_scan_interval_ms),
            ("power_horizon_ms", self.scheduling.power_horizon_ms),
            ("history_sample_ms", self.scheduling.history_sample_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        if self.cache.cache_timeout_ms <= 0 || self.cache.transient_age_ms <= 0 {
            return Err(ConfigError::Invalid(
                "cache ages must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
