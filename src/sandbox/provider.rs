//! Wallet provider interface and the signing guard wrapper
//!
//! The guard is a capability-interception wrapper: a fixed allow-list of
//! signing-family methods is substituted with checkpointed versions, and every
//! other capability delegates straight to the wrapped provider. Checkpointed
//! methods emit an InterceptedCall, wait for a verdict with a bounded
//! deadline, and fail open when no verdict arrives in time.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bus::{MessageOrigin, PageBus};
use crate::correlation::{await_resolution, WaiterTable};
use crate::envelope::{Envelope, InterceptedCall, SignMethod, TransactionPayload};
use crate::error::{Error, Result};

/// Signing-family methods the guard intercepts; all other provider
/// capabilities pass through untouched.
pub const INTERCEPTED_METHODS: [SignMethod; 4] = [
    SignMethod::SignTransaction,
    SignMethod::SignAll,
    SignMethod::SignAndSend,
    SignMethod::SubmitRaw,
];

/// A transaction the provider has signed
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    pub transaction: TransactionPayload,
    pub signature: String,
}

/// The wallet provider surface the page sees.
///
/// Implemented by real wallet adapters outside this crate; the guard wraps
/// any implementation without knowing which wallet is behind it.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn name(&self) -> &str;

    /// True only for the guard wrapper itself; lets repeated slot
    /// assignments be absorbed without double-wrapping.
    fn is_guarded(&self) -> bool {
        false
    }

    async fn connect(&self) -> Result<String>;

    async fn sign_transaction(&self, tx: TransactionPayload) -> Result<SignedTransaction>;

    async fn sign_all_transactions(
        &self,
        txs: Vec<TransactionPayload>,
    ) -> Result<Vec<SignedTransaction>>;

    async fn sign_and_send(&self, tx: TransactionPayload) -> Result<String>;
}

/// Delegating wrapper that gates signing methods behind a risk verdict
pub struct GuardedProvider {
    inner: Arc<dyn WalletProvider>,
    bus: PageBus,
    waiters: Arc<WaiterTable>,
    wait_timeout: Duration,
}

impl GuardedProvider {
    /// Wrap a provider, absorbing values that are already guarded
    pub fn wrap(
        inner: Arc<dyn WalletProvider>,
        bus: PageBus,
        waiters: Arc<WaiterTable>,
        wait_timeout: Duration,
    ) -> Arc<dyn WalletProvider> {
        if inner.is_guarded() {
            debug!("provider already guarded, skipping re-wrap");
            return inner;
        }
        Arc::new(Self {
            inner,
            bus,
            waiters,
            wait_timeout,
        })
    }

    /// Emit an InterceptedCall and wait for its verdict.
    ///
    /// Resolves exactly once per token: either the verdict arrives and is
    /// enforced, or the deadline elapses and the call fails open. A "block"
    /// verdict is the only outcome that refuses the signing call.
    async fn checkpoint(&self, method: SignMethod, payload: TransactionPayload) -> Result<()> {
        debug_assert!(INTERCEPTED_METHODS.contains(&method));
        let call = InterceptedCall::new(method, payload);
        let token = call.token.clone();

        let rx = self.waiters.register(&token)?;
        self.bus.emit(MessageOrigin::Page, Envelope::from(call));

        match await_resolution(rx, self.wait_timeout).await {
            Ok(Envelope::InterceptSigningResponse { verdict, .. }) => {
                use crate::analysis::types::RecommendedAction;
                info!(
                    %token,
                    score = verdict.score,
                    level = ?verdict.level,
                    action = ?verdict.recommended_action,
                    "verdict received"
                );
                if verdict.recommended_action == RecommendedAction::Block {
                    return Err(Error::TransactionBlocked {
                        score: verdict.score,
                        reasons: verdict.reasons,
                    });
                }
                Ok(())
            }
            Ok(other) => {
                warn!(%token, kind = other.kind(), "unexpected envelope resolved wait, failing open");
                Ok(())
            }
            Err(Error::WaitTimeout(ms)) => {
                // Fail-open by design: availability over guaranteed blocking
                self.waiters.abandon(&token);
                warn!(%token, timeout_ms = ms, "verdict wait timed out, failing open");
                Ok(())
            }
            Err(e) => {
                self.waiters.abandon(&token);
                warn!(%token, "verdict wait failed ({e}), failing open");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl WalletProvider for GuardedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_guarded(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<String> {
        // Not a signing capability; pure pass-through
        self.inner.connect().await
    }

    async fn sign_transaction(&self, tx: TransactionPayload) -> Result<SignedTransaction> {
        self.checkpoint(SignMethod::SignTransaction, tx.clone()).await?;
        self.inner.sign_transaction(tx).await
    }

    async fn sign_all_transactions(
        &self,
        txs: Vec<TransactionPayload>,
    ) -> Result<Vec<SignedTransaction>> {
        // The batch is gated as one intercepted call, keyed on its first
        // transaction; one wait per wallet call, not per transaction.
        let representative = txs.first().cloned().unwrap_or_default();
        self.checkpoint(SignMethod::SignAll, representative).await?;
        self.inner.sign_all_transactions(txs).await
    }

    async fn sign_and_send(&self, tx: TransactionPayload) -> Result<String> {
        self.checkpoint(SignMethod::SignAndSend, tx.clone()).await?;
        self.inner.sign_and_send(tx).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory provider that signs everything it is asked to
    pub(crate) struct StubWallet {
        pub address: String,
        pub sign_calls: AtomicU32,
    }

    impl StubWallet {
        pub fn new(address: &str) -> Arc<Self> {
            Arc::new(Self {
                address: address.to_string(),
                sign_calls: AtomicU32::new(0),
            })
        }

        pub fn sign_calls(&self) -> u32 {
            self.sign_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WalletProvider for StubWallet {
        fn name(&self) -> &str {
            "stub-wallet"
        }

        async fn connect(&self) -> Result<String> {
            Ok(self.address.clone())
        }

        async fn sign_transaction(&self, tx: TransactionPayload) -> Result<SignedTransaction> {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SignedTransaction {
                transaction: tx,
                signature: format!("signed-by-{}", self.address),
            })
        }

        async fn sign_all_transactions(
            &self,
            txs: Vec<TransactionPayload>,
        ) -> Result<Vec<SignedTransaction>> {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            Ok(txs
                .into_iter()
                .map(|tx| SignedTransaction {
                    transaction: tx,
                    signature: format!("signed-by-{}", self.address),
                })
                .collect())
        }

        async fn sign_and_send(&self, tx: TransactionPayload) -> Result<String> {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            let _ = tx;
            Ok(format!("sig-{}", self.address))
        }
    }
}
