//! Remote risk scorer client
//!
//! Speaks the scoring service's HTTP contract: a snake_case
//! `{transaction, context, preferences}` request body, and a response that
//! must carry `risk_assessment`, `risk_factors` and `recommendations`.
//! Anything outside that shape is a validation failure, never silently
//! coerced - an out-of-range score from the wire must not reach the wallet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::analysis::types::{
    AnalysisRequest, AnalysisResult, RecommendedAction, ResultSource, RiskFactor, RiskLevel,
};
use crate::config::ScorerConfig;
use crate::error::{Error, Result};

/// Confidence assumed for remote results that omit the field
const DEFAULT_REMOTE_CONFIDENCE: f64 = 0.8;

/// Health probe timeout, independent of the scoring timeout
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Abstraction over the remote scorer so the analysis client can be tested
/// without a network. The raw `Value` is returned untyped on purpose:
/// schema interpretation and validation happen in the caller, outside the
/// retry loop.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    /// Submit a scoring request; transport-level failures only
    async fn score(&self, request: &ScorerRequest) -> Result<Value>;

    /// Probe the scorer's health endpoint
    async fn health(&self) -> Result<ScorerHealth>;
}

/// Request body sent to the scorer
#[derive(Debug, Clone, Serialize)]
pub struct ScorerRequest {
    pub transaction: ScorerTransaction,
    pub context: ScorerContext,
    pub preferences: ScorerPreferences,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScorerTransaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    pub timestamp: i64,
    pub network: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScorerContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_reputation: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_transaction_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_age_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_high_risk_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScorerPreferences {
    pub analysis_depth: String,
    pub include_on_chain_data: bool,
    pub include_ml_prediction: bool,
}

/// Reshape an internal AnalysisRequest into the wire request
pub fn build_request(request: &AnalysisRequest, network: &str) -> ScorerRequest {
    let tx = &request.transaction;
    let context = &request.context;
    let reputation = context.reputation.clone().unwrap_or_default();

    ScorerRequest {
        transaction: ScorerTransaction {
            signature: tx.signature.clone(),
            transaction_type: tx.transaction_type.as_str().to_string(),
            from_address: tx.from_address.clone(),
            to_address: tx.to_address.clone(),
            amount: tx.amount.clone(),
            token_address: tx.asset.clone(),
            token_symbol: tx.asset_symbol.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            network: network.to_string(),
        },
        context: ScorerContext {
            user_id: context.caller_identity.clone(),
            user_reputation: reputation.user_reputation,
            user_transaction_count: reputation.transaction_count,
            wallet_age_days: reputation.wallet_age_days,
            previous_high_risk_count: reputation.previous_high_risk_count,
        },
        preferences: ScorerPreferences {
            analysis_depth: request.preferences.depth.as_str().to_string(),
            include_on_chain_data: request.preferences.include_on_chain_data,
            include_ml_prediction: request.preferences.include_ml_prediction,
        },
    }
}

/// Response body expected from the scorer
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerResponse {
    pub risk_assessment: RiskAssessmentWire,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactorWire>,
    #[serde(default)]
    pub recommendations: Option<RecommendationsWire>,
    #[serde(default)]
    pub evidence: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskAssessmentWire {
    pub score: f64,
    pub level: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskFactorWire {
    pub factor: String,
    #[serde(default)]
    pub severity: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationsWire {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub alternative_actions: Option<Vec<String>>,
}

/// Scorer health probe result
#[derive(Debug, Clone, Serialize)]
pub struct ScorerHealth {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Interpret and validate a raw scorer response.
///
/// Runs after the retry loop: a response that parses as JSON but violates the
/// schema (score out of [0,100], level outside the known set) is a terminal
/// validation failure that routes the caller to the fallback, not a retry.
pub fn validate_response(raw: Value) -> Result<ScorerResponse> {
    let response: ScorerResponse = serde_json::from_value(raw)
        .map_err(|e| Error::ScorerSchema(format!("missing or malformed fields: {e}")))?;

    let assessment = &response.risk_assessment;
    if !assessment.score.is_finite() || assessment.score < 0.0 || assessment.score > 100.0 {
        return Err(Error::ScorerSchema(format!(
            "risk score out of range: {}",
            assessment.score
        )));
    }

    if RiskLevel::parse(&assessment.level).is_none() {
        return Err(Error::ScorerSchema(format!(
            "unknown risk level: {}",
            assessment.level
        )));
    }

    if let Some(confidence) = assessment.confidence {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(Error::ScorerSchema(format!(
                "confidence out of range: {confidence}"
            )));
        }
    }

    Ok(response)
}

/// Map a validated scorer response into the internal result shape
pub fn normalize_response(response: ScorerResponse) -> AnalysisResult {
    let assessment = &response.risk_assessment;
    let score = assessment.score.round() as u8;
    // validate_response guarantees the level parses
    let level = RiskLevel::parse(&assessment.level).unwrap_or(RiskLevel::Medium);

    let reasons: Vec<String> = response
        .risk_factors
        .iter()
        .map(|f| f.description.clone())
        .collect();

    let factors: Vec<RiskFactor> = response
        .risk_factors
        .iter()
        .map(|f| RiskFactor {
            factor: f.factor.clone(),
            severity: f
                .severity
                .as_deref()
                .and_then(RiskLevel::parse)
                .unwrap_or(RiskLevel::Medium),
            description: f.description.clone(),
        })
        .collect();

    let recommended_action = response
        .recommendations
        .as_ref()
        .and_then(|r| r.action.as_deref())
        .and_then(RecommendedAction::parse)
        .unwrap_or(if level == RiskLevel::High {
            RecommendedAction::Block
        } else {
            RecommendedAction::Approve
        });

    AnalysisResult {
        score,
        level,
        confidence: assessment.confidence.unwrap_or(DEFAULT_REMOTE_CONFIDENCE),
        reasons,
        factors,
        recommended_action,
        evidence: response.evidence.unwrap_or_else(|| serde_json::json!({})),
        sourced_from: ResultSource::Remote,
        cached: false,
    }
}

/// HTTP client for the remote scoring service
pub struct HttpScorer {
    client: reqwest::Client,
    config: ScorerConfig,
}

impl HttpScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout())
                .user_agent("wallet-sentinel/0.1")
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl RiskScorer for HttpScorer {
    async fn score(&self, request: &ScorerRequest) -> Result<Value> {
        debug!(endpoint = %self.config.endpoint, "calling remote scorer");

        let mut builder = self.client.post(&self.config.endpoint).json(request);
        if !self.config.api_key.is_empty() {
            builder = builder.header("X-API-Key", &self.config.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::ScorerTimeout(self.config.timeout_ms)
            } else {
                Error::ScorerTransport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ScorerHttp {
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                Error::ScorerTimeout(self.config.timeout_ms)
            } else {
                Error::ScorerTransport(format!("malformed response body: {e}"))
            }
        })
    }

    async fn health(&self) -> Result<ScorerHealth> {
        let mut builder = self.client.get(self.health_url()).timeout(HEALTH_TIMEOUT);
        if !self.config.api_key.is_empty() {
            builder = builder.header("X-API-Key", &self.config.api_key);
        }

        match builder.send().await {
            Ok(response) => Ok(ScorerHealth {
                available: response.status().is_success(),
                status: Some(response.status().as_u16()),
                error: None,
            }),
            Err(e) => Ok(ScorerHealth {
                available: false,
                status: None,
                error: Some(e.to_string()),
            }),
        }
    }
}
