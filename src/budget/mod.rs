//! Sensor budget accounting
//!
//! An external power arbiter caps how much GPS time (and how many WiFi
//! scans) the service may spend per accounting horizon. The controllers
//! here track usage against that cap and decide whether a sensor may run.
//! Without a limit they always allow it.

pub mod history;

pub use history::UsageHistory;

use std::time::Duration;

/// Tracks GPS on-time against an optional per-horizon limit
#[derive(Debug, Default)]
pub struct GpsBudget {
    total: Duration,
    window: Duration,
    limit: Option<Duration>,
    /// Start of the current active stretch (epoch ms)
    active_since: Option<i64>,
    last_window_usage: Duration,
}

impl GpsBudget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active_since.is_some()
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn window_usage(&self) -> Duration {
        self.window
    }

    /// Usage in the window that the last `set_limit` closed
    pub fn last_window_usage(&self) -> Duration {
        self.last_window_usage
    }

    /// Set the per-horizon limit in minutes and open a new window.
    ///
    /// A negative or non-finite value clears the limit.
    pub fn set_limit(&mut self, minutes: f64, now_ms: i64) {
        self.flush(now_ms);
        self.limit = Duration::try_from_secs_f64(minutes * 60.0).ok();
        self.last_window_usage = self.window;
        self.window = Duration::ZERO;
        log::info!(
            "GPS limit set to {:?} per horizon (used {:?} in previous window)",
            self.limit,
            self.last_window_usage
        );
    }

    /// Ask to run the GPS. Returns whether it is running afterwards.
    ///
    /// While already running this re-checks the limit and stops the
    /// sensor once the window usage exceeds it.
    pub fn request_start(&mut self, now_ms: i64) -> bool {
        if self.is_active() {
            self.flush(now_ms);
            if let Some(limit) = self.limit {
                if self.window > limit {
                    log::info!("Ran out of GPS budget ({:?} > {:?})", self.window, limit);
                    self.active_since = None;
                    return false;
                }
            }
            log::trace!("Continue running GPS");
            return true;
        }

        let allowed = match self.limit {
            None => true,
            Some(limit) => self.window < limit,
        };
        if allowed {
            self.active_since = Some(now_ms);
        } else {
            log::debug!("No budget to start GPS ({:?} used)", self.window);
        }
        allowed
    }

    /// Stop the GPS. Returns true if it was running.
    pub fn request_stop(&mut self, now_ms: i64) -> bool {
        if !self.is_active() {
            return false;
        }
        self.flush(now_ms);
        self.active_since = None;
        log::debug!("GPS window usage now {:?}", self.window);
        true
    }

    /// Lifetime GPS minutes, counting the running stretch up to `now_ms`
    pub fn report_minutes(&mut self, now_ms: i64) -> f64 {
        self.flush(now_ms);
        self.total.as_secs_f64() / 60.0
    }

    fn flush(&mut self, now_ms: i64) {
        if let Some(start) = self.active_since {
            let elapsed = Duration::from_millis((now_ms - start).max(0) as u64);
            self.total += elapsed;
            self.window += elapsed;
            self.active_since = Some(now_ms);
        }
    }
}

/// Counts WiFi scans against an optional per-horizon limit
#[derive(Debug, Default)]
pub struct ScanBudget {
    total: u64,
    window: u64,
    limit: Option<u64>,
}

impl ScanBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-horizon scan limit and open a new window.
    ///
    /// A negative or non-finite value clears the limit.
    pub fn set_limit(&mut self, scans: f64) {
        self.limit = if scans.is_finite() && scans >= 0.0 {
            Some(scans as u64)
        } else {
            None
        };
        self.window = 0;
        log::info!("Scan limit set to {:?} per horizon", self.limit);
    }

    /// Account for one scan if the budget allows it
    pub fn try_scan(&mut self) -> bool {
        let allowed = match self.limit {
            None => true,
            Some(limit) => self.window < limit,
        };
        if allowed {
            self.total += 1;
            self.window += 1;
        } else {
            log::debug!("No budget to scan WiFi");
        }
        allowed
    }

    /// Lifetime scan count
    pub fn report_work(&self) -> f64 {
        self.total as f64
    }
}
