//! Correlation tokens and the pending-wait table
//!
//! A CorrelationToken is the only identity linking an intercepted call to its
//! eventual verdict across sandboxes. Each sandbox that awaits responses owns
//! its own WaiterTable; the tables never share memory, they only see the same
//! token value carried inside relayed envelopes.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::envelope::Envelope;
use crate::error::{Error, Result};

/// Opaque, globally-unique identifier minted at interception time.
///
/// Never reused: minting always produces a fresh UUID, and a waiter table
/// consumes each token at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Mint a fresh token
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation-token-keyed table of pending waits.
///
/// One entry per token, resolved exactly once: `resolve` removes the waiter
/// before delivering, so a second message for the same token finds nothing.
#[derive(Default)]
pub struct WaiterTable {
    waiters: DashMap<CorrelationToken, oneshot::Sender<Envelope>>,
}

impl WaiterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending wait for a token.
    ///
    /// Fails if a wait is already registered - at most one PendingWait may
    /// exist per token.
    pub fn register(&self, token: &CorrelationToken) -> Result<oneshot::Receiver<Envelope>> {
        let (tx, rx) = oneshot::channel();
        match self.waiters.entry(token.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::DuplicateWait(token.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Deliver an envelope to the waiter for its token, consuming the entry.
    ///
    /// Returns false when no waiter exists (already resolved, timed out, or
    /// never registered).
    pub fn resolve(&self, token: &CorrelationToken, envelope: Envelope) -> bool {
        match self.waiters.remove(token) {
            Some((_, tx)) => tx.send(envelope).is_ok(),
            None => {
                debug!(%token, "no pending wait for token, dropping message");
                false
            }
        }
    }

    /// Drop the waiter for a token without delivering anything.
    ///
    /// Called on timeout so a late verdict cannot resolve a wait the caller
    /// has already abandoned.
    pub fn abandon(&self, token: &CorrelationToken) {
        self.waiters.remove(token);
    }

    pub fn is_pending(&self, token: &CorrelationToken) -> bool {
        self.waiters.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Await a registered receiver with a deadline.
///
/// Returns `Ok(envelope)` when the verdict arrives in time, `WaitTimeout`
/// when the deadline elapses first. The caller decides fail-open vs fail-closed.
pub async fn await_resolution(
    rx: oneshot::Receiver<Envelope>,
    deadline: Duration,
) -> Result<Envelope> {
    match tokio::time::timeout(deadline, rx).await {
        Ok(Ok(envelope)) => Ok(envelope),
        Ok(Err(_)) => Err(Error::ChannelClosed("waiter sender dropped".into())),
        Err(_) => Err(Error::WaitTimeout(deadline.as_millis() as u64)),
    }
}
