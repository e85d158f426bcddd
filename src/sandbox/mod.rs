//! Page-sandbox interception: provider trap and outbound-call hook
//!
//! Two independent capture paths with deliberately different guarantees.
//! The provider trap gates signing calls behind a verdict (fail-open on
//! timeout); the network hook only observes and reports. Losing the trap
//! install race degrades coverage to detect-only, never to a hard failure.

pub mod provider;
pub mod rpc_hook;
pub mod slot;

pub use provider::{GuardedProvider, SignedTransaction, WalletProvider, INTERCEPTED_METHODS};
pub use rpc_hook::{classify, HookedTransport, OutboundTransport, RpcSubmission};
pub use slot::{
    spawn_connect_responder, BindingObserver, GuardObserver, PageBindings, ProviderSlot,
};
