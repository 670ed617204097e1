use crate::notifier::MobilityNotice;

/// Side effects requested by the engine.
///
/// The engine never talks to sensors itself; the service loop carries
/// these out after each decision step.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start GPS updates at the given interval (or re-request with a new one)
    StartGps { interval_ms: u64 },
    StopGps,
    /// Ask the network provider for a single fix
    RequestNetworkFix,
    CancelNetworkFix,
    /// Arm the inaccurate-fix timeout, replacing any armed one
    ArmAccuracyTimeout { token: u64, after_ms: u64 },
    CancelAccuracyTimeout,
    /// Tell listeners the location may have changed
    NotifyMobility(MobilityNotice),
}
