use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the current location came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Gps,
    Cached,
    Approximate,
    Network,
    Unknown,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSource::Gps => "WiFiGPSLocation:GPS",
            LocationSource::Cached => "WiFiGPSLocation:Cached",
            LocationSource::Approximate => "WiFiGPSLocation:Approx",
            LocationSource::Network => "WiFiGPSLocation:Network",
            LocationSource::Unknown => "WiFiGPSLocation:Fake",
        }
    }
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WiFiGPSLocation:GPS" => Ok(LocationSource::Gps),
            "WiFiGPSLocation:Cached" => Ok(LocationSource::Cached),
            "WiFiGPSLocation:Approx" => Ok(LocationSource::Approximate),
            "WiFiGPSLocation:Network" => Ok(LocationSource::Network),
            "WiFiGPSLocation:Fake" => Ok(LocationSource::Unknown),
            other => Err(format!("Unknown location source: {}", other)),
        }
    }
}

/// A location fix as exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters
    pub accuracy: f64,
    /// Fix time in epoch milliseconds
    pub time_ms: i64,
    pub speed: Option<f64>,
    pub source: LocationSource,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, time_ms: i64) -> Self {
        Location {
            latitude,
            longitude,
            accuracy,
            time_ms,
            speed: None,
            source: LocationSource::Gps,
        }
    }

    /// The "unknown" location reported when nothing better exists.
    ///
    /// Coordinates and speed are NaN so callers can't mistake it for a fix.
    pub fn unknown(time_ms: i64) -> Self {
        Location {
            latitude: f64::NAN,
            longitude: f64::NAN,
            accuracy: f64::NAN,
            time_ms,
            speed: Some(f64::NAN),
            source: LocationSource::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.source == LocationSource::Unknown
    }

    /// Copy of this location re-tagged with another source
    pub fn with_source(mut self, source: LocationSource) -> Self {
        self.source = source;
        self
    }
}
