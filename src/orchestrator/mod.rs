//! Background orchestrator: relayed call in, verdict out
//!
//! Owns the background-side pending table (a separate instance from the
//! page-side one - the two only ever see the same token value inside relayed
//! envelopes). Each accepted envelope is translated into a structured
//! AnalysisRequest, scored by the analysis client, and answered with a
//! normalized verdict over the same token. Tokens are single-use here:
//! replayed or duplicated envelopes are dropped without a response.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::analysis::types::{
    AnalysisContext, AnalysisPreferences, AnalysisRequest, AnalysisResult, RiskLevel,
    TransactionDetails, TransactionType, Verdict,
};
use crate::analysis::AnalysisClient;
use crate::config::Config;
use crate::correlation::CorrelationToken;
use crate::envelope::{Envelope, SignMethod, TransactionPayload};
use crate::error::Result;

/// Explicit marker for fields the raw payload did not carry
const UNKNOWN: &str = "unknown";

/// Best-effort hook for bringing an interactive surface to the foreground
/// when a verdict needs user attention. Failure is logged, never propagated:
/// verdict delivery does not depend on it.
pub trait AttentionSurface: Send + Sync {
    fn request_attention(&self, token: &CorrelationToken, verdict: &Verdict) -> Result<()>;
}

/// Default surface: log and move on
pub struct LogAttention;

impl AttentionSurface for LogAttention {
    fn request_attention(&self, token: &CorrelationToken, verdict: &Verdict) -> Result<()> {
        info!(%token, score = verdict.score, "high-risk verdict needs user attention");
        Ok(())
    }
}

/// Lifecycle of a token on the background side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    InFlight,
    Done,
}

/// Background-side endpoint of the relay path
pub struct Orchestrator {
    analysis: AnalysisClient,
    attention: Arc<dyn AttentionSurface>,
    preferences: AnalysisPreferences,
    tokens: DashMap<CorrelationToken, TokenState>,
}

impl Orchestrator {
    pub fn new(
        analysis: AnalysisClient,
        attention: Arc<dyn AttentionSurface>,
        preferences: AnalysisPreferences,
    ) -> Arc<Self> {
        Arc::new(Self {
            analysis,
            attention,
            preferences,
            tokens: DashMap::new(),
        })
    }

    /// Orchestrator wired from configuration with the logging surface
    pub fn from_config(config: &Config) -> Arc<Self> {
        let preferences = AnalysisPreferences {
            depth: crate::analysis::types::AnalysisDepth::parse(&config.analysis.depth)
                .unwrap_or(crate::analysis::types::AnalysisDepth::Standard),
            include_on_chain_data: config.analysis.include_on_chain_data,
            include_ml_prediction: config.analysis.include_ml_prediction,
        };
        Self::new(
            AnalysisClient::from_config(config),
            Arc::new(LogAttention),
            preferences,
        )
    }

    /// Consume relayed envelopes until the channel closes, answering each
    /// accepted one over `verdicts`.
    pub async fn run(
        self: Arc<Self>,
        mut requests: mpsc::Receiver<Envelope>,
        verdicts: mpsc::Sender<Envelope>,
    ) {
        while let Some(envelope) = requests.recv().await {
            if let Some(response) = self.handle(envelope).await {
                if verdicts.send(response).await.is_err() {
                    warn!("verdict channel closed, orchestrator stopping");
                    break;
                }
            }
        }
    }

    /// Handle one envelope; None means it was dropped (replay or unexpected
    /// type) and no response must be sent.
    pub async fn handle(&self, envelope: Envelope) -> Option<Envelope> {
        match envelope {
            Envelope::InterceptSigningRequest {
                token,
                method,
                transaction,
            } => {
                if !self.begin(&token) {
                    return None;
                }
                let request = self.translate(token.clone(), method, &transaction);
                let result = self.analysis.analyze(&request).await;
                let verdict = self.finish(&token, &result);
                Some(Envelope::InterceptSigningResponse { token, verdict })
            }
            Envelope::InterceptNetworkSubmission {
                token,
                method,
                params,
            } => {
                if !self.begin(&token) {
                    return None;
                }
                debug!(%token, %method, "analyzing network submission (advisory)");
                let payload = payload_from_submission(&params);
                let request = self.translate(token.clone(), SignMethod::SubmitRaw, &payload);
                let result = self.analysis.analyze(&request).await;
                let verdict = self.finish(&token, &result);
                // Observability echo only; the submission already proceeded
                Some(Envelope::InterceptNetworkAnalysisComplete { token, verdict })
            }
            other => {
                warn!(kind = other.kind(), "unexpected envelope at orchestrator, dropping");
                None
            }
        }
    }

    /// Admit a token, rejecting replays. A token is usable exactly once:
    /// in-flight and already-consumed tokens are both refused.
    fn begin(&self, token: &CorrelationToken) -> bool {
        match self.tokens.entry(token.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                warn!(%token, state = ?entry.get(), "replayed token rejected");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(TokenState::InFlight);
                true
            }
        }
    }

    /// Close out a token and produce the verdict for its result, raising
    /// the attention surface for high-risk outcomes.
    fn finish(&self, token: &CorrelationToken, result: &AnalysisResult) -> Verdict {
        let verdict = normalize_verdict(result);

        if verdict.level == RiskLevel::High {
            if let Err(e) = self.attention.request_attention(token, &verdict) {
                warn!(%token, "attention surface failed: {e}");
            }
        }

        self.tokens.insert(token.clone(), TokenState::Done);
        verdict
    }

    /// Build a structured AnalysisRequest from a raw intercepted payload.
    ///
    /// Missing fields become explicit unknown markers instead of failures;
    /// a payload without a declared type is treated as a transfer when its
    /// transfer-shaped fields are all present.
    fn translate(
        &self,
        token: CorrelationToken,
        method: SignMethod,
        payload: &TransactionPayload,
    ) -> AnalysisRequest {
        let transaction_type = match payload.transaction_type.as_deref() {
            Some(declared) => TransactionType::parse(declared),
            None => {
                if payload.from.is_some() && payload.to.is_some() && payload.amount.is_some() {
                    TransactionType::Transfer
                } else {
                    TransactionType::Unknown
                }
            }
        };

        debug!(
            %token,
            method = method.as_str(),
            tx_type = transaction_type.as_str(),
            "translating intercepted call"
        );

        AnalysisRequest {
            token,
            transaction: TransactionDetails {
                from_address: payload.from.clone().unwrap_or_else(|| UNKNOWN.into()),
                to_address: payload.to.clone().unwrap_or_else(|| UNKNOWN.into()),
                amount: payload.amount.clone().unwrap_or_else(|| UNKNOWN.into()),
                asset: payload.asset.clone(),
                asset_symbol: payload.asset_symbol.clone(),
                signature: payload.signature.clone(),
                transaction_type,
            },
            context: AnalysisContext::default(),
            preferences: self.preferences.clone(),
        }
    }
}

/// Normalize an analysis result into the verdict contract, filling safe
/// defaults where detail is missing.
fn normalize_verdict(result: &AnalysisResult) -> Verdict {
    let mut verdict = Verdict::from(result);
    verdict.score = verdict.score.min(100);
    if verdict.reasons.is_empty() {
        verdict.reasons.push("No analysis detail available".into());
    }
    verdict
}

/// Reconstruct a minimal payload from a network submission's RPC params.
/// The first param of a submission call is the serialized transaction.
fn payload_from_submission(params: &Value) -> TransactionPayload {
    let raw_base64 = params
        .get(0)
        .and_then(|p| p.as_str())
        .filter(|s| BASE64.decode(s).is_ok())
        .map(|s| s.to_string());

    TransactionPayload {
        raw_base64,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{scorer_response, ScriptedScorer};
    use crate::analysis::types::RecommendedAction;
    use crate::bus::{spawn_page_dispatcher, MessageOrigin, PageBus};
    use crate::config::{CacheConfig, RelayConfig, ScorerConfig};
    use crate::correlation::WaiterTable;
    use crate::envelope::ProviderHint;
    use crate::error::Error;
    use crate::relay::ContextRelay;
    use crate::sandbox::provider::testing::StubWallet;
    use crate::sandbox::provider::{GuardedProvider, WalletProvider};
    use std::time::Duration;

    fn analysis_client(scorer: Arc<ScriptedScorer>) -> AnalysisClient {
        let scorer_config = ScorerConfig {
            max_retries: 1,
            retry_base_delay_ms: 1,
            ..ScorerConfig::default()
        };
        AnalysisClient::new(scorer, scorer_config, CacheConfig::default())
    }

    fn orchestrator(scorer: Arc<ScriptedScorer>) -> Arc<Orchestrator> {
        Orchestrator::new(
            analysis_client(scorer),
            Arc::new(LogAttention),
            AnalysisPreferences::default(),
        )
    }

    fn transfer_payload() -> TransactionPayload {
        TransactionPayload {
            from: Some("A".into()),
            to: Some("B".into()),
            amount: Some("5".into()),
            asset: Some("X".into()),
            ..Default::default()
        }
    }

    /// Wire the full pipeline: guarded wallet on a page bus, relay in the
    /// middle, orchestrator in the background. Returns the guarded provider
    /// and the wallet stub for assertions.
    fn wire_pipeline(
        scorer: Arc<ScriptedScorer>,
        wait_timeout: Duration,
    ) -> (Arc<dyn WalletProvider>, Arc<StubWallet>, PageBus) {
        let page = PageBus::new(64);
        let waiters = Arc::new(WaiterTable::new());
        spawn_page_dispatcher(&page, waiters.clone());

        let (bg_tx, bg_rx) = mpsc::channel(64);
        let (verdict_tx, verdict_rx) = mpsc::channel(64);
        let relay = ContextRelay::new(
            page.clone(),
            bg_tx,
            &RelayConfig {
                channel_capacity: 64,
                connect_timeout_ms: 1_000,
            },
        );
        relay.spawn_page_listener();
        relay.spawn_background_listener(verdict_rx);

        tokio::spawn(orchestrator(scorer).run(bg_rx, verdict_tx));

        let wallet = StubWallet::new("W1");
        let guarded = GuardedProvider::wrap(wallet.clone(), page.clone(), waiters, wait_timeout);
        (guarded, wallet, page)
    }

    #[tokio::test]
    async fn test_happy_path_signing_proceeds() {
        let scorer = ScriptedScorer::new(vec![Ok(scorer_response(20.0, "low", "approve"))]);
        let (guarded, wallet, _page) = wire_pipeline(scorer.clone(), Duration::from_secs(2));

        let signed = guarded.sign_transaction(transfer_payload()).await.unwrap();
        assert_eq!(signed.signature, "signed-by-W1");
        assert_eq!(wallet.sign_calls(), 1);
        assert_eq!(scorer.calls(), 1);
    }

    #[tokio::test]
    async fn test_block_path_throws_transaction_blocked() {
        let scorer = ScriptedScorer::new(vec![Ok(scorer_response(92.0, "high", "block"))]);
        let (guarded, wallet, _page) = wire_pipeline(scorer.clone(), Duration::from_secs(2));

        let result = guarded.sign_transaction(transfer_payload()).await;
        match result {
            Err(Error::TransactionBlocked { score, .. }) => assert_eq!(score, 92),
            other => panic!("expected TransactionBlocked, got {other:?}"),
        }
        assert_eq!(wallet.sign_calls(), 0);
    }

    #[tokio::test]
    async fn test_provenance_attack_gets_no_response_and_wait_times_out() {
        use crate::correlation::await_resolution;

        let scorer = ScriptedScorer::new(vec![Ok(scorer_response(20.0, "low", "approve"))]);

        let page = PageBus::new(64);
        let waiters = Arc::new(WaiterTable::new());
        spawn_page_dispatcher(&page, waiters.clone());

        let (bg_tx, bg_rx) = mpsc::channel(64);
        let (verdict_tx, verdict_rx) = mpsc::channel(64);
        let relay = ContextRelay::new(
            page.clone(),
            bg_tx,
            &RelayConfig {
                channel_capacity: 64,
                connect_timeout_ms: 1_000,
            },
        );
        relay.spawn_page_listener();
        relay.spawn_background_listener(verdict_rx);
        tokio::spawn(orchestrator(scorer.clone()).run(bg_rx, verdict_tx));

        // A hostile frame posts a well-formed signing request and waits for
        // the verdict on its token
        let token = CorrelationToken::mint();
        let rx = waiters.register(&token).unwrap();
        page.emit(
            MessageOrigin::Frame("https://evil.example".into()),
            Envelope::InterceptSigningRequest {
                token: token.clone(),
                method: SignMethod::SignTransaction,
                transaction: transfer_payload(),
            },
        );

        // No response is ever sent for that token; the wait runs out and the
        // caller falls back to its fail-open default
        let result = await_resolution(rx, Duration::from_millis(80)).await;
        assert!(matches!(result, Err(Error::WaitTimeout(_))));
        assert_eq!(scorer.calls(), 0);

        // Legitimate traffic on the same pipeline is unaffected
        let wallet = StubWallet::new("W1");
        let guarded =
            GuardedProvider::wrap(wallet.clone(), page.clone(), waiters, Duration::from_secs(2));
        let signed = guarded.sign_transaction(transfer_payload()).await.unwrap();
        assert_eq!(signed.signature, "signed-by-W1");
        assert_eq!(scorer.calls(), 1);
    }

    #[tokio::test]
    async fn test_replayed_token_dropped() {
        let scorer = ScriptedScorer::new(vec![
            Ok(scorer_response(20.0, "low", "approve")),
            Ok(scorer_response(20.0, "low", "approve")),
        ]);
        let orchestrator = orchestrator(scorer.clone());

        let token = CorrelationToken::mint();
        let envelope = Envelope::InterceptSigningRequest {
            token: token.clone(),
            method: SignMethod::SignTransaction,
            transaction: transfer_payload(),
        };

        let first = orchestrator.handle(envelope.clone()).await;
        assert!(first.is_some());

        // Same token again: dropped, no response, no second scoring
        let second = orchestrator.handle(envelope).await;
        assert!(second.is_none());
        assert_eq!(scorer.calls(), 1);
    }

    #[tokio::test]
    async fn test_network_submission_echoes_analysis_complete() {
        let scorer = ScriptedScorer::new(vec![Ok(scorer_response(30.0, "low", "approve"))]);
        let orchestrator = orchestrator(scorer.clone());

        let token = CorrelationToken::mint();
        let response = orchestrator
            .handle(Envelope::InterceptNetworkSubmission {
                token: token.clone(),
                method: "sendTransaction".into(),
                params: serde_json::json!(["AQAAAA==", {"encoding": "base64"}]),
            })
            .await
            .unwrap();

        match response {
            Envelope::InterceptNetworkAnalysisComplete { token: echoed, verdict } => {
                assert_eq!(echoed, token);
                // Raw submissions carry no structured fields, so the
                // unknown-typed request routes to the fallback
                assert!(verdict.score <= 100);
            }
            other => panic!("expected analysis-complete echo, got {other:?}"),
        }
        // The opaque payload never reached the remote scorer
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_translate_fills_unknown_markers() {
        let orchestrator = orchestrator(ScriptedScorer::unreachable());
        let token = CorrelationToken::mint();

        let request = orchestrator.translate(
            token.clone(),
            SignMethod::SignTransaction,
            &TransactionPayload::default(),
        );
        assert_eq!(request.transaction.from_address, "unknown");
        assert_eq!(request.transaction.to_address, "unknown");
        assert_eq!(request.transaction.amount, "unknown");
        assert_eq!(request.transaction.transaction_type, TransactionType::Unknown);

        // Transfer-shaped payloads without a declared type become transfers
        let request =
            orchestrator.translate(token, SignMethod::SignTransaction, &transfer_payload());
        assert_eq!(request.transaction.transaction_type, TransactionType::Transfer);
        assert_eq!(request.transaction.from_address, "A");
    }

    #[tokio::test]
    async fn test_attention_failure_does_not_affect_verdict() {
        struct FailingAttention;
        impl AttentionSurface for FailingAttention {
            fn request_attention(
                &self,
                _token: &CorrelationToken,
                _verdict: &Verdict,
            ) -> crate::error::Result<()> {
                Err(Error::Internal("no interactive surface".into()))
            }
        }

        let scorer = ScriptedScorer::new(vec![Ok(scorer_response(92.0, "high", "block"))]);
        let orchestrator = Orchestrator::new(
            analysis_client(scorer),
            Arc::new(FailingAttention),
            AnalysisPreferences::default(),
        );

        let response = orchestrator
            .handle(Envelope::InterceptSigningRequest {
                token: CorrelationToken::mint(),
                method: SignMethod::SignTransaction,
                transaction: transfer_payload(),
            })
            .await
            .unwrap();

        match response {
            Envelope::InterceptSigningResponse { verdict, .. } => {
                assert_eq!(verdict.recommended_action, RecommendedAction::Block);
            }
            other => panic!("expected signing response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wallet_connect_through_pipeline() {
        use crate::sandbox::slot::{spawn_connect_responder, GuardObserver, PageBindings};

        let page = PageBus::new(64);
        let (bg_tx, _bg_rx) = mpsc::channel(64);
        let relay = ContextRelay::new(
            page.clone(),
            bg_tx,
            &RelayConfig {
                channel_capacity: 64,
                connect_timeout_ms: 1_000,
            },
        );
        relay.spawn_page_listener();

        let bindings = Arc::new(PageBindings::new());
        let observer = GuardObserver::new(
            page.clone(),
            Arc::new(WaiterTable::new()),
            Duration::from_millis(50),
        );
        let slot = bindings.install_slot("solana", observer).unwrap();
        slot.assign(StubWallet::new("W9"));
        spawn_connect_responder(&page, bindings);

        let address = relay.connect(ProviderHint::FirstAvailable).await.unwrap();
        assert_eq!(address, "W9");
    }
}
