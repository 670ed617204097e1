//! Replay of recorded sensor traces
//!
//! A trace is a JSONL file, one sensor callback per line:
//!
//! ```text
//! {"type":"scan","aps":[{"id":"00:11:22:33:44:55","strength":-61}]}
//! {"type":"gps","latitude":34.07,"longitude":-118.44,"accuracy":6.0,"delay_ms":1000}
//! {"type":"network","latitude":34.07,"longitude":-118.44,"accuracy":40.0}
//! {"type":"network_enabled","enabled":false}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. `delay_ms` waits
//! before delivering the record; a missing `time` means "now".

use crate::models::{Location, ScanEntry, ScanSnapshot};
use crate::service::{EventSender, ServiceError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(default)]
    pub aps: Vec<ScanEntry>,
    pub time: Option<i64>,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub time: Option<i64>,
    pub speed: Option<f64>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl FixRecord {
    fn to_location(&self, now_ms: i64) -> Location {
        let mut location = Location::new(
            self.latitude,
            self.longitude,
            self.accuracy,
            self.time.unwrap_or(now_ms),
        );
        location.speed = self.speed;
        location
    }
}

/// One line of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceRecord {
    Scan(ScanRecord),
    Gps(FixRecord),
    Network(FixRecord),
    NetworkEnabled {
        enabled: bool,
        #[serde(default)]
        delay_ms: u64,
    },
}

impl TraceRecord {
    /// Parse one trace line. Blank and comment lines yield `None`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }

    pub fn delay(&self) -> Duration {
        let ms = match self {
            TraceRecord::Scan(r) => r.delay_ms,
            TraceRecord::Gps(r) | TraceRecord::Network(r) => r.delay_ms,
            TraceRecord::NetworkEnabled { delay_ms, .. } => *delay_ms,
        };
        Duration::from_millis(ms)
    }

    /// Hand the record to the service as the matching sensor callback
    pub async fn deliver(self, events: &EventSender) -> Result<(), ServiceError> {
        let now = chrono::Utc::now().timestamp_millis();
        match self {
            TraceRecord::Scan(r) => {
                events
                    .scan_results(ScanSnapshot::new(r.aps, r.time.unwrap_or(now)))
                    .await
            }
            TraceRecord::Gps(r) => events.gps_fix(r.to_location(now)).await,
            TraceRecord::Network(r) => events.network_fix(r.to_location(now)).await,
            TraceRecord::NetworkEnabled { enabled, .. } => events.network_enabled(enabled).await,
        }
    }
}

/// Reads a trace file and feeds it to a running service
pub struct TraceReplayer {
    path: PathBuf,
}

impl TraceReplayer {
    pub fn new(path: PathBuf) -> Self {
        TraceReplayer { path }
    }

    /// Parse the whole trace, failing on the first bad line
    pub fn read_all(&self) -> Result<Vec<TraceRecord>, TraceError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            match TraceRecord::parse_line(&line) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(source) => {
                    return Err(TraceError::Parse {
                        line: index + 1,
                        source,
                    })
                }
            }
        }

        Ok(records)
    }

    /// Replay the trace into `events`, returning how many records were delivered.
    ///
    /// Bad lines are logged and skipped. Stops early if the service goes away.
    pub async fn run(&self, events: EventSender) -> Result<usize, TraceError> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut lines = tokio::io::BufReader::new(file).lines();

        log::info!("Replaying trace {:?}", self.path);

        let mut line_no = 0;
        let mut delivered = 0;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let record = match TraceRecord::parse_line(&line) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Skipping trace line {}: {}", line_no, e);
                    continue;
                }
            };

            let delay = record.delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            record.deliver(&events).await?;
            delivered += 1;
        }

        log::info!("Trace replay finished, {} records delivered", delivered);
        Ok(delivered)
    }
}
