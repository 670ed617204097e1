//! Mobility notifications
//!
//! Listeners are told "your location may have changed" whenever the WiFi
//! signature changes. Each listener owns the receiving end of a bounded
//! channel; delivery never blocks the decision loop and a full or closed
//! listener is logged without affecting the others.

use crate::fingerprint::Signature;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity of each listener's channel
pub const LISTENER_QUEUE_CAPACITY: usize = 16;

/// Delivery failures for a single listener
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Listener queue full")]
    Full,

    #[error("Listener channel closed")]
    Closed,
}

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Sent to listeners when the WiFi signature changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MobilityNotice {
    pub previous: Option<Signature>,
    pub current: Signature,
    /// When the change was observed (epoch ms)
    pub observed_at_ms: i64,
}

struct Listener {
    id: ListenerId,
    client_id: String,
    tx: mpsc::Sender<MobilityNotice>,
}

impl Listener {
    fn deliver(&self, notice: MobilityNotice) -> Result<(), NotifyError> {
        self.tx.try_send(notice).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::Full,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

/// Registered listeners
#[derive(Default)]
pub struct MobilityNotifier {
    listeners: Vec<Listener>,
    next_id: u64,
}

impl MobilityNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel for a new listener and register its sending end
    pub fn create_channel() -> (mpsc::Sender<MobilityNotice>, mpsc::Receiver<MobilityNotice>) {
        mpsc::channel(LISTENER_QUEUE_CAPACITY)
    }

    pub fn register(&mut self, client_id: &str, tx: mpsc::Sender<MobilityNotice>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(Listener {
            id,
            client_id: client_id.to_string(),
            tx,
        });
        log::debug!("Registered listener {:?} for {}", id, client_id);
        id
    }

    /// Remove a listener. Returns false if it wasn't registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        before != self.listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `notice` to every listener, returning how many received it.
    ///
    /// Listeners whose receiver was dropped are unregistered.
    pub fn notify_all(&mut self, notice: MobilityNotice) -> usize {
        if self.listeners.is_empty() {
            return 0;
        }

        log::debug!("Notifying {} listeners of location change", self.listeners.len());

        let mut delivered = 0;
        let mut closed = Vec::new();
        for listener in &self.listeners {
            match listener.deliver(notice) {
                Ok(()) => delivered += 1,
                Err(NotifyError::Full) => {
                    log::warn!("Listener for {} is full, dropping notice", listener.client_id);
                }
                Err(NotifyError::Closed) => {
                    log::warn!("Listener for {} is gone", listener.client_id);
                    closed.push(listener.id);
                }
            }
        }

        self.listeners.retain(|l| !closed.contains(&l.id));
        delivered
    }
}
