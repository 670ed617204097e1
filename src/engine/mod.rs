//! Duty-cycle decision engine
//!
//! Decides, for each WiFi fingerprint and each location fix, what backs
//! the current location and whether the GPS should run. A fingerprint
//! seen often enough (above the significance threshold) is treated as a
//! place where the user is stationary: the cached location is reused and
//! GPS is switched off. Anything else keeps GPS on until a fix is cached.
//!
//! The engine is a plain synchronous state machine. Every input returns
//! the list of `Command`s the caller must carry out, so one owner can
//! drive it from a serialized event loop.

pub mod command;

pub use command::Command;

use crate::budget::{GpsBudget, ScanBudget, UsageHistory};
use crate::cache::{CacheJanitor, CacheRecord, EvictionPolicy, LocationCache};
use crate::config::Config;
use crate::fingerprint::{Fingerprint, Signature};
use crate::models::{Location, LocationSource, WorkUnits};
use crate::notifier::MobilityNotice;

/// Decision thresholds
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub significance_threshold: u32,
    pub gps_accuracy_threshold: f64,
    pub accuracy_timeout_ms: u64,
    pub prefer_network_location: bool,
    pub use_network_location: bool,
    pub default_gps_interval_ms: u64,
    pub history_capacity: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        EngineSettings {
            significance_threshold: config.engine.significance_threshold,
            gps_accuracy_threshold: config.engine.gps_accuracy_threshold,
            accuracy_timeout_ms: config.engine.accuracy_timeout_ms,
            prefer_network_location: config.engine.prefer_network_location,
            use_network_location: config.engine.use_network_location,
            default_gps_interval_ms: config.scheduling.default_gps_interval_ms,
            history_capacity: config.scheduling.history_capacity(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::from_config(&Config::default())
    }
}

/// The duty-cycle state machine
pub struct DutyCycleEngine {
    settings: EngineSettings,
    cache: LocationCache,
    janitor: CacheJanitor,
    gps_budget: GpsBudget,
    scan_budget: ScanBudget,
    gps_history: UsageHistory,
    scan_history: UsageHistory,
    /// Reported when nothing better exists
    sentinel: Location,
    current: Location,
    /// Inaccurate fix waiting for the accuracy timeout
    provisional: Option<Location>,
    previous_signature: Option<Signature>,
    awaiting_network_fix: bool,
    use_network_location: bool,
    gps_interval_ms: u64,
    armed_timeout: Option<u64>,
    next_token: u64,
}

impl DutyCycleEngine {
    pub fn new(settings: EngineSettings, policy: EvictionPolicy, now_ms: i64) -> Self {
        let sentinel = Location::unknown(now_ms);
        DutyCycleEngine {
            cache: LocationCache::new(),
            janitor: CacheJanitor::new(policy),
            gps_budget: GpsBudget::new(),
            scan_budget: ScanBudget::new(),
            gps_history: UsageHistory::new(settings.history_capacity),
            scan_history: UsageHistory::new(settings.history_capacity),
            sentinel,
            current: sentinel,
            provisional: None,
            previous_signature: None,
            awaiting_network_fix: false,
            use_network_location: settings.use_network_location,
            gps_interval_ms: settings.default_gps_interval_ms,
            armed_timeout: None,
            next_token: 0,
            settings,
        }
    }

    pub fn from_config(config: &Config, now_ms: i64) -> Self {
        let policy = EvictionPolicy::new(
            config.engine.significance_threshold,
            config.engine.critical_threshold,
            &config.cache,
        );
        DutyCycleEngine::new(EngineSettings::from_config(config), policy, now_ms)
    }

    // =====================
    // Accessors
    // =====================

    pub fn current_location(&self) -> Location {
        self.current
    }

    pub fn gps_running(&self) -> bool {
        self.gps_budget.is_active()
    }

    pub fn gps_interval(&self) -> u64 {
        self.gps_interval_ms
    }

    pub fn awaiting_network_fix(&self) -> bool {
        self.awaiting_network_fix
    }

    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    pub fn previous_signature(&self) -> Option<Signature> {
        self.previous_signature
    }

    // =====================
    // Fingerprint input
    // =====================

    /// Process a fresh WiFi fingerprint
    pub fn on_fingerprint(&mut self, fingerprint: Fingerprint, now_ms: i64) -> Vec<Command> {
        let mut commands = Vec::new();
        self.cancel_accuracy_timeout(&mut commands);

        if self.settings.prefer_network_location {
            match fingerprint {
                Fingerprint::NoWifi => self.start_gps(now_ms, &mut commands),
                Fingerprint::Signature(_) => self.stop_gps(now_ms, &mut commands),
            }
            return commands;
        }

        let sig = match fingerprint {
            Fingerprint::NoWifi => {
                log::debug!("No WiFi AP visible, running GPS");
                self.start_gps(now_ms, &mut commands);
                return commands;
            }
            Fingerprint::Signature(sig) => sig,
        };

        if self.previous_signature != Some(sig) {
            commands.push(Command::NotifyMobility(MobilityNotice {
                previous: self.previous_signature,
                current: sig,
                observed_at_ms: now_ms,
            }));

            // A fix requested for the old place would be stale here
            self.cancel_network_fix(&mut commands);

            // Moved away before getting a fix: don't keep retrying GPS for it
            if let Some(previous) = self.previous_signature {
                if self.cache.mark_resolved(&previous) {
                    log::debug!("Concluded no fix for {}", previous);
                }
            }
        }

        let record = self.cache.upsert_on_sighting(sig, now_ms);
        let count = record.count;
        let stored = record.location;

        if count <= self.settings.significance_threshold {
            log::debug!("{} not significant yet ({} sightings), running GPS", sig, count);
            self.start_gps(now_ms, &mut commands);
        } else {
            match stored {
                Some(location) => {
                    log::debug!("{} is significant, using cached location", sig);
                    self.current = location.with_source(LocationSource::Cached);
                }
                None => {
                    log::debug!("{} is significant but has no location", sig);
                    self.request_network_fix(&mut commands);
                    self.degrade_current();
                }
            }
            self.stop_gps(now_ms, &mut commands);
        }

        self.previous_signature = Some(sig);
        commands
    }

    fn degrade_current(&mut self) {
        if self.current.is_unknown() {
            log::warn!("Using unknown location");
            self.current = self.sentinel;
        } else {
            log::debug!("Using approximate location");
            self.current.source = LocationSource::Approximate;
            self.current.speed = Some(0.0);
        }
    }

    // =====================
    // Location fixes
    // =====================

    /// Process a GPS fix
    pub fn on_gps_fix(&mut self, fix: Location, now_ms: i64) -> Vec<Command> {
        let mut commands = Vec::new();
        log::debug!("Received GPS fix, accuracy {}", fix.accuracy);

        if fix.accuracy < self.settings.gps_accuracy_threshold {
            self.cancel_accuracy_timeout(&mut commands);
            self.current = fix.with_source(LocationSource::Gps);

            if let Some(sig) = self.previous_signature {
                let cached = fix.with_source(LocationSource::Cached);
                if self.cache.attach_location(&sig, cached, now_ms) {
                    log::debug!("Stored fix for {}", sig);
                }
            }
        } else {
            self.provisional = Some(fix.with_source(LocationSource::Gps));
            let token = self.next_token;
            self.next_token += 1;
            self.armed_timeout = Some(token);
            commands.push(Command::ArmAccuracyTimeout {
                token,
                after_ms: self.settings.accuracy_timeout_ms,
            });
        }

        commands
    }

    /// The inaccurate-fix timeout fired without an accurate fix arriving
    pub fn on_accuracy_timeout(&mut self, token: u64, now_ms: i64) -> Vec<Command> {
        if self.armed_timeout != Some(token) {
            log::trace!("Ignoring stale accuracy timeout {}", token);
            return Vec::new();
        }
        self.armed_timeout = None;

        let Some(provisional) = self.provisional.take() else {
            return Vec::new();
        };
        log::debug!("Settling for inaccurate fix ({} m)", provisional.accuracy);
        self.current = provisional;

        if let Some(sig) = self.previous_signature {
            let unresolved = self.cache.lookup(&sig).map_or(false, |r| !r.resolved);
            if unresolved {
                self.cache
                    .attach_location(&sig, provisional.with_source(LocationSource::Cached), now_ms);
                log::debug!("Stored inaccurate fix for {}", sig);
            }
        } else {
            log::debug!("No familiar WiFi signature");
        }

        Vec::new()
    }

    /// Process a network-location fix
    pub fn on_network_fix(&mut self, fix: Location) -> Vec<Command> {
        if !self.awaiting_network_fix {
            log::warn!("Discarding unexpected network location fix");
            return Vec::new();
        }

        self.awaiting_network_fix = false;
        self.current = fix.with_source(LocationSource::Network);
        vec![Command::CancelNetworkFix]
    }

    /// The network provider couldn't take the request
    pub fn network_request_failed(&mut self) {
        self.awaiting_network_fix = false;
    }

    /// Network provider was enabled or disabled
    pub fn set_network_available(&mut self, available: bool) -> Vec<Command> {
        log::info!(
            "Network location {}",
            if available { "enabled" } else { "disabled" }
        );
        self.use_network_location = available;

        let mut commands = Vec::new();
        if !available {
            self.cancel_network_fix(&mut commands);
        }
        commands
    }

    /// Periodic network request used when network location is preferred.
    ///
    /// An unanswered request from the previous tick is replaced, so a
    /// provider that never answers doesn't silence later ticks.
    pub fn on_network_tick(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.use_network_location {
            self.cancel_network_fix(&mut commands);
        }
        self.request_network_fix(&mut commands);
        commands
    }

    fn request_network_fix(&mut self, commands: &mut Vec<Command>) {
        if !self.use_network_location {
            return;
        }
        if self.awaiting_network_fix {
            log::trace!("Network fix already outstanding");
            return;
        }
        self.awaiting_network_fix = true;
        commands.push(Command::RequestNetworkFix);
    }

    fn cancel_network_fix(&mut self, commands: &mut Vec<Command>) {
        if self.awaiting_network_fix {
            log::debug!("Dropping unanswered network location request");
            self.awaiting_network_fix = false;
            commands.push(Command::CancelNetworkFix);
        }
    }

    fn cancel_accuracy_timeout(&mut self, commands: &mut Vec<Command>) {
        self.provisional = None;
        if self.armed_timeout.take().is_some() {
            commands.push(Command::CancelAccuracyTimeout);
        }
    }

    // =====================
    // GPS control
    // =====================

    fn start_gps(&mut self, now_ms: i64, commands: &mut Vec<Command>) {
        let was_running = self.gps_budget.is_active();
        let running = self.gps_budget.request_start(now_ms);
        match (was_running, running) {
            (false, true) => commands.push(Command::StartGps {
                interval_ms: self.gps_interval_ms,
            }),
            (true, false) => commands.push(Command::StopGps),
            _ => {}
        }
    }

    fn stop_gps(&mut self, now_ms: i64, commands: &mut Vec<Command>) {
        if self.gps_budget.request_stop(now_ms) {
            commands.push(Command::StopGps);
        }
    }

    /// Apply a newly negotiated GPS interval
    pub fn set_gps_interval(&mut self, interval_ms: u64) -> Vec<Command> {
        if interval_ms == self.gps_interval_ms {
            return Vec::new();
        }
        self.gps_interval_ms = interval_ms;

        if self.gps_budget.is_active() {
            vec![Command::StartGps { interval_ms }]
        } else {
            Vec::new()
        }
    }

    /// The service just became active.
    ///
    /// Unless network location is preferred, GPS starts right away (within
    /// the GPS budget) so a location is available before the first scan.
    pub fn on_activate(&mut self, now_ms: i64) -> Vec<Command> {
        let mut commands = Vec::new();
        if !self.settings.prefer_network_location {
            self.start_gps(now_ms, &mut commands);
        }
        commands
    }

    /// Stop everything that is running, e.g. when the last client leaves
    pub fn suspend(&mut self, now_ms: i64) -> Vec<Command> {
        let mut commands = Vec::new();
        self.cancel_accuracy_timeout(&mut commands);
        self.cancel_network_fix(&mut commands);
        self.stop_gps(now_ms, &mut commands);
        commands
    }

    // =====================
    // Budgets
    // =====================

    /// Account for a WiFi scan if the scan budget allows it
    pub fn try_scan(&mut self) -> bool {
        self.scan_budget.try_scan()
    }

    /// Report work done so far and record it in the usage history
    pub fn identify_work_units(&mut self, now_ms: i64) -> WorkUnits {
        let gps_minutes = self.gps_budget.report_minutes(now_ms);
        self.gps_history.add(gps_minutes);

        let scan_count = self.scan_budget.report_work();
        self.scan_history.add(scan_count);

        log::debug!(
            "Work units: {:.2} GPS minutes, {} scans",
            gps_minutes,
            scan_count
        );
        WorkUnits {
            gps_minutes,
            scan_count,
        }
    }

    /// Apply a GPS limit (minutes per horizon) from the power arbiter
    pub fn set_gps_limit(&mut self, minutes: f64, now_ms: i64) -> Vec<Command> {
        log::info!(
            "Estimated GPS usage per horizon: {:.2}, new limit: {}",
            self.gps_history.sum(),
            minutes
        );
        self.gps_budget.set_limit(minutes, now_ms);

        // A running GPS must respect the new window right away
        let mut commands = Vec::new();
        if self.gps_budget.is_active() {
            self.start_gps(now_ms, &mut commands);
        }
        commands
    }

    /// Apply a scan limit (scans per horizon) from the power arbiter
    pub fn set_scan_limit(&mut self, scans: f64) {
        log::info!(
            "Estimated scans per horizon: {}, new limit: {}",
            self.scan_history.sum(),
            scans
        );
        self.scan_budget.set_limit(scans);
    }

    // =====================
    // Cache maintenance
    // =====================

    pub fn load_cache(&mut self, rows: Vec<(Signature, CacheRecord)>) {
        log::info!("Loaded {} cache entries", rows.len());
        self.cache.load_all(rows);
    }

    /// Evict expired records, returning what was removed
    pub fn run_janitor(&mut self, now_ms: i64) -> Vec<Signature> {
        self.janitor.sweep(&mut self.cache, now_ms)
    }

    pub fn cache_snapshot(&self) -> Vec<(Signature, CacheRecord)> {
        self.cache.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::models::ScanEntry;

    const SECOND: i64 = 1000;

    fn engine() -> DutyCycleEngine {
        DutyCycleEngine::new(EngineSettings::default(), EvictionPolicy::default(), 0)
    }

    fn home() -> Fingerprint {
        fingerprint(&[ScanEntry::new("A", -70), ScanEntry::new("B", -90)])
    }

    fn office() -> Fingerprint {
        fingerprint(&[ScanEntry::new("C", -60), ScanEntry::new("D", -61)])
    }

    fn fix(accuracy: f64) -> Location {
        Location::new(34.0689, -118.4452, accuracy, 0)
    }

    fn starts_gps(commands: &[Command]) -> bool {
        commands.iter().any(|c| matches!(c, Command::StartGps { .. }))
    }

    #[test]
    fn test_new_fingerprint_starts_gps_and_notifies() {
        let mut engine = engine();
        let commands = engine.on_fingerprint(home(), 0);

        assert!(starts_gps(&commands));
        assert!(commands.iter().any(|c| matches!(c, Command::NotifyMobility(_))));
        assert!(engine.gps_running());
        assert!(engine.current_location().is_unknown());
    }

    #[test]
    fn test_fourth_sighting_skips_gps() {
        let mut engine = engine();
        for i in 0..3 {
            engine.on_fingerprint(home(), i * SECOND);
        }
        assert!(engine.gps_running());

        let commands = engine.on_fingerprint(home(), 3 * SECOND);

        assert!(!starts_gps(&commands));
        assert!(commands.contains(&Command::StopGps));
        assert!(commands.contains(&Command::RequestNetworkFix));
        assert!(!engine.gps_running());
    }

    #[test]
    fn test_repeat_sighting_does_not_renotify() {
        let mut engine = engine();
        engine.on_fingerprint(home(), 0);
        let commands = engine.on_fingerprint(home(), SECOND);

        assert!(!commands.iter().any(|c| matches!(c, Command::NotifyMobility(_))));
    }

    #[test]
    fn test_no_wifi_always_starts_gps() {
        let mut engine = engine();
        for i in 0..5 {
            engine.on_fingerprint(home(), i * SECOND);
        }
        assert!(!engine.gps_running());

        let commands = engine.on_fingerprint(Fingerprint::NoWifi, 10 * SECOND);

        assert!(starts_gps(&commands));
        assert_eq!(engine.previous_signature(), home().signature());
    }

    #[test]
    fn test_accurate_fix_is_cached_and_reused() {
        let mut engine = engine();
        for i in 0..3 {
            engine.on_fingerprint(home(), i * SECOND);
        }
        engine.on_gps_fix(fix(5.0), 3 * SECOND);
        assert_eq!(engine.current_location().source, LocationSource::Gps);

        let sig = home().signature().unwrap();
        let record = engine.cache().lookup(&sig).unwrap();
        assert!(record.resolved);
        assert_eq!(record.location.unwrap().source, LocationSource::Cached);

        // Count is frozen at 3 once resolved, so the record never becomes
        // significant and GPS stays on
        engine.on_fingerprint(home(), 10 * SECOND);
        assert!(engine.gps_running());
    }

    #[test]
    fn test_significant_record_with_location_never_starts_gps() {
        let mut engine = engine();
        for i in 0..4 {
            engine.on_fingerprint(home(), i * SECOND);
        }
        engine.on_gps_fix(fix(5.0), 4 * SECOND);

        for i in 5..10 {
            let commands = engine.on_fingerprint(home(), i * SECOND);
            assert!(!starts_gps(&commands));
            assert_eq!(engine.current_location().source, LocationSource::Cached);
            assert_eq!(engine.current_location().latitude, 34.0689);
        }
    }

    #[test]
    fn test_accurate_fix_replaces_stored_location() {
        let mut engine = engine();
        engine.on_fingerprint(home(), 0);
        engine.on_gps_fix(fix(8.0), SECOND);
        engine.on_gps_fix(Location::new(1.0, 2.0, 3.0, 0), 2 * SECOND);

        let record = engine.cache().lookup(&home().signature().unwrap()).unwrap();
        assert_eq!(record.location.unwrap().latitude, 1.0);
    }

    #[test]
    fn test_inaccurate_fix_adopted_only_after_timeout() {
        let mut engine = engine();
        engine.on_fingerprint(home(), 0);

        let commands = engine.on_gps_fix(fix(20.0), SECOND);
        let token = match commands.as_slice() {
            [Command::ArmAccuracyTimeout { token, after_ms: 5000 }] => *token,
            other => panic!("unexpected commands: {:?}", other),
        };
        assert!(engine.current_location().is_unknown());

        engine.on_accuracy_timeout(token, 6 * SECOND);

        let current = engine.current_location();
        assert_eq!(current.accuracy, 20.0);
        assert_eq!(current.source, LocationSource::Gps);
        let record = engine.cache().lookup(&home().signature().unwrap()).unwrap();
        assert!(record.resolved);
        assert_eq!(record.location.unwrap().accuracy, 20.0);
    }

    #[test]
    fn test_accurate_fix_cancels_timeout() {
        let mut engine = engine();
        engine.on_fingerprint(home(), 0);
        let token = match engine.on_gps_fix(fix(20.0), SECOND).as_slice() {
            [Command::ArmAccuracyTimeout { token, .. }] => *token,
            _ => unreachable!(),
        };

        let commands = engine.on_gps_fix(fix(4.0), 2 * SECOND);
        assert!(commands.contains(&Command::CancelAccuracyTimeout));

        engine.on_accuracy_timeout(token, 6 * SECOND);
        assert_eq!(engine.current_location().accuracy, 4.0);
    }

    #[test]
    fn test_rearming_replaces_previous_timeout() {
        let mut engine = engine();
        engine.on_fingerprint(home(), 0);
        let first = match engine.on_gps_fix(fix(20.0), SECOND).as_slice() {
            [Command::ArmAccuracyTimeout { token, .. }] => *token,
            _ => unreachable!(),
        };
        let second = match engine.on_gps_fix(fix(30.0), 2 * SECOND).as_slice() {
            [Command::ArmAccuracyTimeout { token, .. }] => *token,
            _ => unreachable!(),
        };

        engine.on_accuracy_timeout(first, 6 * SECOND);
        assert!(engine.current_location().is_unknown());

        engine.on_accuracy_timeout(second, 7 * SECOND);
        assert_eq!(engine.current_location().accuracy, 30.0);
    }

    #[test]
    fn test_moving_away_concludes_previous_record() {
        let mut engine = engine();
        engine.on_fingerprint(home(), 0);
        let commands = engine.on_fingerprint(office(), SECOND);

        let notice = commands
            .iter()
            .find_map(|c| match c {
                Command::NotifyMobility(n) => Some(*n),
                _ => None,
            })
            .unwrap();
        assert_eq!(notice.previous, home().signature());
        assert_eq!(notice.current, office().signature().unwrap());

        let record = engine.cache().lookup(&home().signature().unwrap()).unwrap();
        assert!(record.resolved);
        assert!(record.location.is_none());
    }

    #[test]
    fn test_network_fix_only_when_requested() {
        let mut engine = engine();
        assert!(engine.on_network_fix(fix(50.0)).is_empty());
        assert!(engine.current_location().is_unknown());

        for i in 0..4 {
            engine.on_fingerprint(home(), i * SECOND);
        }
        assert!(engine.awaiting_network_fix());

        // Single outstanding request
        let commands = engine.on_fingerprint(home(), 5 * SECOND);
        assert!(!commands.contains(&Command::RequestNetworkFix));

        let commands = engine.on_network_fix(fix(50.0));
        assert_eq!(commands, vec![Command::CancelNetworkFix]);
        assert_eq!(engine.current_location().source, LocationSource::Network);
        assert!(!engine.awaiting_network_fix());
    }

    #[test]
    fn test_significant_without_location_degrades_current() {
        let mut engine = engine();
        engine.on_fingerprint(office(), 0);
        engine.on_gps_fix(fix(5.0), SECOND);

        engine.set_network_available(false);
        for i in 2..6 {
            engine.on_fingerprint(home(), i * SECOND);
        }

        let current = engine.current_location();
        assert_eq!(current.source, LocationSource::Approximate);
        assert_eq!(current.speed, Some(0.0));
        assert!(!engine.awaiting_network_fix());
    }

    #[test]
    fn test_gps_budget_blocks_start() {
        let mut engine = engine();
        engine.set_gps_limit(0.0, 0);

        let commands = engine.on_fingerprint(home(), 0);

        assert!(!starts_gps(&commands));
        assert!(!engine.gps_running());
    }

    #[test]
    fn test_new_limit_stops_running_gps_over_budget() {
        let mut engine = engine();
        engine.on_fingerprint(home(), 0);
        engine.set_gps_limit(1.0, 0);

        engine.on_fingerprint(home(), 61 * SECOND);

        assert!(!engine.gps_running());
        let units = engine.identify_work_units(120 * SECOND);
        assert!((units.gps_minutes - 61.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_interval_change_rerequests_running_gps() {
        let mut engine = engine();
        assert!(engine.set_gps_interval(30_000).is_empty());

        engine.on_fingerprint(home(), 0);
        assert_eq!(
            engine.set_gps_interval(10_000),
            vec![Command::StartGps { interval_ms: 10_000 }]
        );
        assert!(engine.set_gps_interval(10_000).is_empty());
    }

    #[test]
    fn test_prefer_network_mode_only_toggles_gps() {
        let settings = EngineSettings {
            prefer_network_location: true,
            ..EngineSettings::default()
        };
        let mut engine = DutyCycleEngine::new(settings, EvictionPolicy::default(), 0);

        assert!(starts_gps(&engine.on_fingerprint(Fingerprint::NoWifi, 0)));
        assert_eq!(engine.on_fingerprint(home(), SECOND), vec![Command::StopGps]);
        assert!(engine.cache().is_empty());
        assert_eq!(engine.on_network_tick(), vec![Command::RequestNetworkFix]);
    }

    #[test]
    fn test_network_tick_replaces_unanswered_request() {
        let settings = EngineSettings {
            prefer_network_location: true,
            ..EngineSettings::default()
        };
        let mut engine = DutyCycleEngine::new(settings, EvictionPolicy::default(), 0);

        assert_eq!(engine.on_network_tick(), vec![Command::RequestNetworkFix]);
        for _ in 0..2 {
            assert_eq!(
                engine.on_network_tick(),
                vec![Command::CancelNetworkFix, Command::RequestNetworkFix]
            );
            assert!(engine.awaiting_network_fix());
        }

        engine.on_network_fix(fix(40.0));
        assert_eq!(engine.on_network_tick(), vec![Command::RequestNetworkFix]);
    }

    #[test]
    fn test_network_tick_idle_without_network() {
        let settings = EngineSettings {
            prefer_network_location: true,
            use_network_location: false,
            ..EngineSettings::default()
        };
        let mut engine = DutyCycleEngine::new(settings, EvictionPolicy::default(), 0);

        assert!(engine.on_network_tick().is_empty());
        assert!(!engine.awaiting_network_fix());
    }

    #[test]
    fn test_moving_away_drops_unanswered_network_request() {
        let mut engine = engine();
        for i in 0..4 {
            engine.on_fingerprint(home(), i * SECOND);
        }
        assert!(engine.awaiting_network_fix());

        let commands = engine.on_fingerprint(office(), 5 * SECOND);
        assert!(commands.contains(&Command::CancelNetworkFix));
        assert!(!engine.awaiting_network_fix());

        for i in 6..8 {
            engine.on_fingerprint(office(), i * SECOND);
        }
        let commands = engine.on_fingerprint(office(), 8 * SECOND);
        assert!(commands.contains(&Command::RequestNetworkFix));
        assert!(engine.awaiting_network_fix());
    }

    #[test]
    fn test_activation_starts_gps() {
        let mut engine = engine();
        assert_eq!(
            engine.on_activate(0),
            vec![Command::StartGps { interval_ms: 60_000 }]
        );
        assert!(engine.gps_running());

        // Sightings that want GPS find it already running
        assert!(!starts_gps(&engine.on_fingerprint(home(), SECOND)));
    }

    #[test]
    fn test_activation_respects_budget_and_mode() {
        let mut engine = engine();
        engine.set_gps_limit(0.0, 0);
        assert!(engine.on_activate(0).is_empty());
        assert!(!engine.gps_running());

        let settings = EngineSettings {
            prefer_network_location: true,
            ..EngineSettings::default()
        };
        let mut engine = DutyCycleEngine::new(settings, EvictionPolicy::default(), 0);
        assert!(engine.on_activate(0).is_empty());
    }

    #[test]
    fn test_suspend_stops_everything() {
        let mut engine = engine();
        engine.on_fingerprint(home(), 0);
        engine.on_gps_fix(fix(20.0), SECOND);

        let commands = engine.suspend(2 * SECOND);

        assert!(commands.contains(&Command::CancelAccuracyTimeout));
        assert!(commands.contains(&Command::StopGps));
        assert!(!engine.gps_running());
    }
}
