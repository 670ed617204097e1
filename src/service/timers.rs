//! Timer tasks feeding events back into the decision loop

use super::event::ServiceEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Armed timers. Each slot holds at most one task; re-arming aborts the old one.
#[derive(Default)]
pub(crate) struct Timers {
    pub scan: Option<JoinHandle<()>>,
    pub cleanup: Option<JoinHandle<()>>,
    pub network: Option<JoinHandle<()>>,
    pub accuracy: Option<JoinHandle<()>>,
}

impl Timers {
    /// Fire `event` after `first`, then every `period`
    pub fn periodic(
        slot: &mut Option<JoinHandle<()>>,
        tx: mpsc::Sender<ServiceEvent>,
        first: Duration,
        period: Duration,
        event: fn() -> ServiceEvent,
    ) {
        Self::cancel(slot);
        // interval_at panics on a zero period, and clients may negotiate 0 ms
        let period = period.max(Duration::from_millis(1));
        *slot = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(event()).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Fire `event` once after `after`
    pub fn once(
        slot: &mut Option<JoinHandle<()>>,
        tx: mpsc::Sender<ServiceEvent>,
        after: Duration,
        event: ServiceEvent,
    ) {
        Self::cancel(slot);
        *slot = Some(tokio::spawn(async move {
            time::sleep(after).await;
            let _ = tx.send(event).await;
        }));
    }

    pub fn cancel(slot: &mut Option<JoinHandle<()>>) {
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// Cancel the scan, cleanup and network timers
    pub fn cancel_periodic(&mut self) {
        Self::cancel(&mut self.scan);
        Self::cancel(&mut self.cleanup);
        Self::cancel(&mut self.network);
    }

    pub fn cancel_all(&mut self) {
        self.cancel_periodic();
        Self::cancel(&mut self.accuracy);
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
