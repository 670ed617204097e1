use serde::{Deserialize, Serialize};

/// One access point seen in a WiFi scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// BSSID of the access point
    pub id: String,
    /// Signal strength in dBm
    pub strength: i32,
}

impl ScanEntry {
    pub fn new(id: impl Into<String>, strength: i32) -> Self {
        ScanEntry {
            id: id.into(),
            strength,
        }
    }
}

/// The last scan delivered to the service, as handed to clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub entries: Vec<ScanEntry>,
    /// Capture time in epoch milliseconds (0 if no scan yet)
    pub captured_at_ms: i64,
    /// Local UTC offset at capture, e.g. "+02:00"
    pub utc_offset: String,
}

impl ScanSnapshot {
    pub fn new(entries: Vec<ScanEntry>, captured_at_ms: i64) -> Self {
        let utc_offset = chrono::DateTime::from_timestamp_millis(captured_at_ms)
            .map(|dt| {
                dt.with_timezone(&chrono::Local)
                    .offset()
                    .to_string()
            })
            .unwrap_or_default();

        ScanSnapshot {
            entries,
            captured_at_ms,
            utc_offset,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as the JSON dump clients expect:
    /// `{"scan":[{"ssid":..,"strength":..}],"time":..,"utc_offset":..}`
    pub fn to_json(&self) -> serde_json::Value {
        let scan: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|e| serde_json::json!({ "ssid": e.id, "strength": e.strength }))
            .collect();

        serde_json::json!({
            "scan": scan,
            "time": self.captured_at_ms,
            "utc_offset": self.utc_offset,
        })
    }
}

/// Work done since startup, reported to the power arbiter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkUnits {
    pub gps_minutes: f64,
    pub scan_count: f64,
}
