//! Provider binding slot: the install-before-the-wallet accessor trap
//!
//! The wallet library populates a well-known global binding at an arbitrary
//! point after the page starts running. Wrapping after the fact loses that
//! race non-deterministically, so the firewall claims the binding slot first
//! and observes every assignment through an explicit BindingObserver. Each
//! binding can be claimed exactly once per page lifetime; a failed claim
//! degrades coverage to the network hook alone.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::bus::{MessageOrigin, PageBus};
use crate::correlation::WaiterTable;
use crate::envelope::{Envelope, ProviderHint};
use crate::error::{Error, Result};
use crate::sandbox::provider::{GuardedProvider, WalletProvider};

/// Hooks invoked when the observed binding is written or read
pub trait BindingObserver: Send + Sync {
    /// Called on assignment; the returned value is what the slot stores
    fn on_assign(&self, value: Arc<dyn WalletProvider>) -> Arc<dyn WalletProvider>;

    /// Called on every read of the binding
    fn on_read(&self);
}

/// The firewall's observer: wraps every assigned provider with the signing
/// guard. Values that are already guarded are stored as-is.
pub struct GuardObserver {
    bus: PageBus,
    waiters: Arc<WaiterTable>,
    wait_timeout: Duration,
}

impl GuardObserver {
    pub fn new(bus: PageBus, waiters: Arc<WaiterTable>, wait_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            bus,
            waiters,
            wait_timeout,
        })
    }
}

impl BindingObserver for GuardObserver {
    fn on_assign(&self, value: Arc<dyn WalletProvider>) -> Arc<dyn WalletProvider> {
        debug!(provider = value.name(), "wallet provider assigned, wrapping");
        GuardedProvider::wrap(
            value,
            self.bus.clone(),
            self.waiters.clone(),
            self.wait_timeout,
        )
    }

    fn on_read(&self) {
        trace!("wallet binding read");
    }
}

/// One observed global binding slot
pub struct ProviderSlot {
    binding: String,
    observer: Arc<dyn BindingObserver>,
    current: RwLock<Option<Arc<dyn WalletProvider>>>,
}

impl std::fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

impl ProviderSlot {
    fn new(binding: String, observer: Arc<dyn BindingObserver>) -> Self {
        Self {
            binding,
            observer,
            current: RwLock::new(None),
        }
    }

    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// The wallet library (or anything else) assigning the binding.
    /// Repeated assignment is absorbed: an already-guarded value is stored
    /// unchanged instead of being wrapped again.
    pub fn assign(&self, provider: Arc<dyn WalletProvider>) {
        let stored = self.observer.on_assign(provider);
        *self.current.write().expect("slot lock poisoned") = Some(stored);
    }

    /// Clearing the binding (provider teardown)
    pub fn clear(&self) {
        *self.current.write().expect("slot lock poisoned") = None;
    }

    /// Read the binding the way a page script would
    pub fn get(&self) -> Option<Arc<dyn WalletProvider>> {
        self.observer.on_read();
        self.current.read().expect("slot lock poisoned").clone()
    }
}

/// The page sandbox's global binding namespace.
///
/// Claiming a binding installs the accessor trap; a binding can be claimed
/// at most once per page lifetime. A claim that loses the race fails with
/// `InterceptInstall` and the caller degrades to detect-only coverage.
#[derive(Default)]
pub struct PageBindings {
    slots: DashMap<String, Arc<ProviderSlot>>,
}

impl PageBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_slot(
        &self,
        binding: &str,
        observer: Arc<dyn BindingObserver>,
    ) -> Result<Arc<ProviderSlot>> {
        match self.slots.entry(binding.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::InterceptInstall {
                binding: binding.to_string(),
                reason: "binding already claimed".into(),
            }),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let slot = Arc::new(ProviderSlot::new(binding.to_string(), observer));
                entry.insert(slot.clone());
                Ok(slot)
            }
        }
    }

    pub fn slot(&self, binding: &str) -> Option<Arc<ProviderSlot>> {
        self.slots.get(binding).map(|s| s.value().clone())
    }

    /// First slot that currently holds a provider
    pub fn first_available(&self) -> Option<Arc<dyn WalletProvider>> {
        self.slots.iter().find_map(|entry| entry.value().get())
    }

    /// Provider whose name matches, searching every claimed slot
    pub fn named(&self, name: &str) -> Option<Arc<dyn WalletProvider>> {
        self.slots
            .iter()
            .find_map(|entry| entry.value().get().filter(|p| p.name() == name))
    }
}

/// Page-side answerer for the relay's connect intents.
///
/// Listens for `intercept-connect-request` envelopes, resolves the hinted
/// provider, attempts the wallet connect, and posts a single matched
/// response back onto the page channel.
pub fn spawn_connect_responder(
    bus: &PageBus,
    bindings: Arc<PageBindings>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    let bus = bus.clone();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "connect responder lagged behind the bus");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            // Connect intents are posted by the relay bridge
            if event.origin != MessageOrigin::Relay {
                continue;
            }
            let (token, hint) = match event.envelope {
                Envelope::InterceptConnectRequest {
                    token,
                    provider_hint,
                } => (token, provider_hint),
                _ => continue,
            };

            let provider = match &hint {
                ProviderHint::FirstAvailable => bindings.first_available(),
                ProviderHint::Named { name } => bindings.named(name),
            };

            let response = match provider {
                Some(provider) => match provider.connect().await {
                    Ok(address) => Envelope::InterceptConnectResponse {
                        token,
                        ok: true,
                        address: Some(address),
                        error: None,
                    },
                    Err(e) => Envelope::InterceptConnectResponse {
                        token,
                        ok: false,
                        address: None,
                        error: Some(e.to_string()),
                    },
                },
                None => Envelope::InterceptConnectResponse {
                    token,
                    ok: false,
                    address: None,
                    error: Some(Error::ProviderUnavailable.to_string()),
                },
            };

            bus.emit(MessageOrigin::Page, response);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::provider::testing::StubWallet;

    fn guard_observer(bus: &PageBus) -> Arc<GuardObserver> {
        GuardObserver::new(
            bus.clone(),
            Arc::new(WaiterTable::new()),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn test_claim_is_exactly_once() {
        let bus = PageBus::new(16);
        let bindings = PageBindings::new();

        let observer = guard_observer(&bus);
        assert!(bindings.install_slot("solana", observer.clone()).is_ok());

        // Second claim loses the race
        let err = bindings.install_slot("solana", observer).unwrap_err();
        assert!(matches!(err, Error::InterceptInstall { .. }));
    }

    #[test]
    fn test_assignment_wraps_and_reassignment_absorbed() {
        let bus = PageBus::new(16);
        let bindings = PageBindings::new();
        let slot = bindings
            .install_slot("solana", guard_observer(&bus))
            .unwrap();

        slot.assign(StubWallet::new("W1"));
        let wrapped = slot.get().unwrap();
        assert!(wrapped.is_guarded());

        // The library re-asserting the value it read back does not
        // produce a guard around a guard
        slot.assign(wrapped.clone());
        let rewrapped = slot.get().unwrap();
        assert!(Arc::ptr_eq(&wrapped, &rewrapped));
    }

    #[test]
    fn test_clear_empties_slot() {
        let bus = PageBus::new(16);
        let bindings = PageBindings::new();
        let slot = bindings
            .install_slot("solana", guard_observer(&bus))
            .unwrap();

        slot.assign(StubWallet::new("W1"));
        assert!(slot.get().is_some());
        slot.clear();
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_named_lookup() {
        let bus = PageBus::new(16);
        let bindings = PageBindings::new();
        let slot = bindings
            .install_slot("solana", guard_observer(&bus))
            .unwrap();
        slot.assign(StubWallet::new("W1"));

        assert!(bindings.named("stub-wallet").is_some());
        assert!(bindings.named("phantom").is_none());
        assert!(bindings.first_available().is_some());
    }
}
