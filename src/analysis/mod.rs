//! Risk analysis client: cache -> validate -> remote -> fallback
//!
//! Produces an AnalysisResult for every AnalysisRequest with bounded latency.
//! The remote scorer is the preferred source; when it is slow, wrong or
//! unreachable the client degrades to a deterministic local heuristic instead
//! of propagating an error. Callers never see a hard failure from `analyze`.

pub mod cache;
pub mod fallback;
pub mod remote;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use backoff::{future::retry, ExponentialBackoff};
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, Config, ScorerConfig};
use crate::error::{Error, Result};

use cache::{Fingerprint, ScoreCache};
use remote::{HttpScorer, RiskScorer, ScorerHealth};
use types::{AnalysisRequest, AnalysisResult};

/// Analysis client with caching, bounded retry and local fallback
pub struct AnalysisClient {
    scorer: Arc<dyn RiskScorer>,
    scorer_config: ScorerConfig,
    cache: ScoreCache,
}

impl AnalysisClient {
    pub fn new(
        scorer: Arc<dyn RiskScorer>,
        scorer_config: ScorerConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            scorer,
            scorer_config,
            cache: ScoreCache::new(cache_config),
        }
    }

    /// Build a client backed by the HTTP scorer from configuration
    pub fn from_config(config: &Config) -> Self {
        let scorer = Arc::new(HttpScorer::new(config.scorer.clone()));
        Self::new(scorer, config.scorer.clone(), config.cache.clone())
    }

    /// Produce an AnalysisResult for the request. Infallible by design:
    /// every failure path ends in a fallback-sourced result.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let fingerprint = Fingerprint::of(&request.transaction);

        // State Lookup: a fresh cache entry short-circuits everything
        if let Some(hit) = self.cache.get(&fingerprint) {
            info!(token = %request.token, "analysis served from cache");
            return hit;
        }

        // State Validate: malformed requests fail fast, no retry
        if let Err(e) = validate_request(request) {
            warn!(token = %request.token, "analysis request rejected: {e}");
            return fallback::invalid_request(&e.to_string());
        }

        // State Remote -> Validate-Output -> Normalize
        match self.score_remote(request).await {
            Ok(result) => {
                // State Cache-Write: remote-sourced results only
                self.cache.put(&fingerprint, &result);
                result
            }
            // State Fallback: degradation, not an error
            Err(e) => {
                warn!(token = %request.token, "remote scoring failed, using fallback: {e}");
                fallback::score(&request.transaction)
            }
        }
    }

    /// Call the remote scorer with bounded exponential backoff.
    ///
    /// Transport failures are transient up to the configured attempt bound;
    /// a response that parses but violates the schema is permanent and sends
    /// the caller straight to the fallback.
    async fn score_remote(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let wire = remote::build_request(request, &self.scorer_config.network);
        let max_attempts = self.scorer_config.max_retries + 1;
        let attempts = AtomicU32::new(0);

        let backoff = ExponentialBackoff {
            initial_interval: self.scorer_config.retry_base_delay(),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_interval: self.scorer_config.retry_base_delay() * 8,
            max_elapsed_time: None,
            ..Default::default()
        };

        let raw = retry(backoff, || async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.scorer.score(&wire).await {
                Ok(raw) => Ok(raw),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, max_attempts, "retryable scorer error: {e}");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await?;

        let response = remote::validate_response(raw)?;
        debug!(token = %request.token, "remote scorer response validated");
        Ok(remote::normalize_response(response))
    }

    /// Probe the remote scorer's health endpoint
    pub async fn scorer_health(&self) -> Result<ScorerHealth> {
        self.scorer.health().await
    }

    pub fn cache(&self) -> &ScoreCache {
        &self.cache
    }
}

/// Reject requests missing required transaction fields or declaring a
/// transaction type outside the known set.
fn validate_request(request: &AnalysisRequest) -> Result<()> {
    let tx = &request.transaction;

    if tx.from_address.is_empty() {
        return Err(Error::InvalidRequest("source address is required".into()));
    }
    if tx.to_address.is_empty() {
        return Err(Error::InvalidRequest(
            "destination address is required".into(),
        ));
    }
    if tx.amount.is_empty() {
        return Err(Error::InvalidRequest("transaction amount is required".into()));
    }
    if !tx.transaction_type.is_known() {
        return Err(Error::InvalidRequest(format!(
            "invalid transaction type: {}",
            tx.transaction_type.as_str()
        )));
    }

    Ok(())
}
