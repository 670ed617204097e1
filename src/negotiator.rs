//! Client interval negotiation
//!
//! Each client may suggest how often it wants GPS fixes. The service
//! samples at the fastest rate any registered client asked for.

use std::collections::HashMap;
use thiserror::Error;

/// Rejected interval suggestions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Client id missing")]
    MissingClient,

    #[error("Invalid interval: {0} ms")]
    NegativeInterval(i64),
}

/// Result of removing a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The client was not registered
    Unknown,
    /// Other clients remain; carries the new effective interval
    Remaining(u64),
    /// That was the last client
    Emptied,
}

/// Registered clients and their requested GPS intervals
pub struct ClientNegotiator {
    clients: HashMap<String, u64>,
    default_interval_ms: u64,
    effective_interval_ms: u64,
}

impl ClientNegotiator {
    pub fn new(default_interval_ms: u64) -> Self {
        ClientNegotiator {
            clients: HashMap::new(),
            default_interval_ms,
            effective_interval_ms: default_interval_ms,
        }
    }

    /// Record a client's requested interval and renegotiate
    pub fn suggest(&mut self, client_id: &str, interval_ms: i64) -> Result<u64, NegotiationError> {
        let client_id = Self::validate_client(client_id)?;
        if interval_ms < 0 {
            return Err(NegotiationError::NegativeInterval(interval_ms));
        }

        log::info!("{} suggested {} ms as interval", client_id, interval_ms);
        self.clients.insert(client_id.to_string(), interval_ms as u64);
        Ok(self.recompute())
    }

    /// Register a client with the default interval unless it already has one.
    ///
    /// Returns false for a missing client id.
    pub fn register(&mut self, client_id: &str) -> bool {
        match Self::validate_client(client_id) {
            Ok(client_id) => {
                if !self.clients.contains_key(client_id) {
                    self.clients
                        .insert(client_id.to_string(), self.default_interval_ms);
                    self.recompute();
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Remove a client and renegotiate
    pub fn remove(&mut self, client_id: &str) -> StopOutcome {
        if self.clients.remove(client_id).is_none() {
            return StopOutcome::Unknown;
        }

        let interval = self.recompute();
        if self.clients.is_empty() {
            StopOutcome::Emptied
        } else {
            StopOutcome::Remaining(interval)
        }
    }

    pub fn effective_interval(&self) -> u64 {
        self.effective_interval_ms
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn validate_client(client_id: &str) -> Result<&str, NegotiationError> {
        let trimmed = client_id.trim();
        if trimmed.is_empty() {
            Err(NegotiationError::MissingClient)
        } else {
            Ok(trimmed)
        }
    }

    fn recompute(&mut self) -> u64 {
        self.effective_interval_ms = self
            .clients
            .values()
            .copied()
            .min()
            .unwrap_or(self.default_interval_ms);
        log::debug!("GPS interval adjusted to {} ms", self.effective_interval_ms);
        self.effective_interval_ms
    }
}
