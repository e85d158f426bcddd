//! Data model for risk analysis requests and results

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationToken;

/// Risk level buckets used across the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Parse a scorer-reported level; anything outside the known set is None
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    /// Level implied by a 0-100 score
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// What the wallet should do with the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Approve,
    Review,
    Block,
}

impl RecommendedAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(RecommendedAction::Approve),
            "review" => Some(RecommendedAction::Review),
            "block" => Some(RecommendedAction::Block),
            _ => None,
        }
    }
}

/// Known transaction types accepted by the scorer.
///
/// `Unknown` marks payloads the orchestrator could not decode; it is outside
/// the valid set, so validation routes those requests to the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Transfer,
    Swap,
    Approve,
    Mint,
    Burn,
    Other,
    Unknown,
}

impl TransactionType {
    pub fn parse(value: &str) -> Self {
        match value {
            "transfer" => TransactionType::Transfer,
            "swap" => TransactionType::Swap,
            "approve" => TransactionType::Approve,
            "mint" => TransactionType::Mint,
            "burn" => TransactionType::Burn,
            "other" => TransactionType::Other,
            _ => TransactionType::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TransactionType::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Swap => "swap",
            TransactionType::Approve => "approve",
            TransactionType::Mint => "mint",
            TransactionType::Burn => "burn",
            TransactionType::Other => "other",
            TransactionType::Unknown => "unknown",
        }
    }
}

/// Structured transaction fields fed to the scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub transaction_type: TransactionType,
}

/// Optional reputation hints forwarded to the scorer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReputationHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_reputation: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_age_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_high_risk_count: Option<u32>,
}

/// Caller context attached to an analysis request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<ReputationHints>,
}

/// How much work the scorer should invest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Quick,
    Standard,
    Deep,
}

impl AnalysisDepth {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "quick" => Some(AnalysisDepth::Quick),
            "standard" => Some(AnalysisDepth::Standard),
            "deep" => Some(AnalysisDepth::Deep),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Quick => "quick",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Deep => "deep",
        }
    }
}

/// Analysis preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPreferences {
    pub depth: AnalysisDepth,
    pub include_on_chain_data: bool,
    pub include_ml_prediction: bool,
}

impl Default for AnalysisPreferences {
    fn default() -> Self {
        Self {
            depth: AnalysisDepth::Standard,
            include_on_chain_data: true,
            include_ml_prediction: true,
        }
    }
}

/// One analysis request, built by the orchestrator from an intercepted call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub token: CorrelationToken,
    pub transaction: TransactionDetails,
    #[serde(default)]
    pub context: AnalysisContext,
    #[serde(default)]
    pub preferences: AnalysisPreferences,
}

/// A single contributing risk factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub severity: RiskLevel,
    pub description: String,
}

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Remote,
    Fallback,
}

/// Final analysis result, immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Overall risk score, 0-100
    pub score: u8,
    pub level: RiskLevel,
    /// Confidence in the assessment, 0-1
    pub confidence: f64,
    /// Human-readable reasons for the score
    pub reasons: Vec<String>,
    /// Per-factor breakdown
    pub factors: Vec<RiskFactor>,
    pub recommended_action: RecommendedAction,
    /// Evidence payload passed through from the scorer (empty for fallback)
    pub evidence: serde_json::Value,
    pub sourced_from: ResultSource,
    pub cached: bool,
}

impl AnalysisResult {
    /// Copy of this result tagged as served from cache
    pub fn as_cached(&self) -> Self {
        Self {
            cached: true,
            ..self.clone()
        }
    }
}

/// The verdict contract consumed by the provider trap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub score: u8,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
    pub recommended_action: RecommendedAction,
    pub confidence: f64,
}

impl Default for Verdict {
    fn default() -> Self {
        Self {
            score: 0,
            level: RiskLevel::Low,
            reasons: Vec::new(),
            recommended_action: RecommendedAction::Approve,
            confidence: 0.0,
        }
    }
}

impl From<&AnalysisResult> for Verdict {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            score: result.score,
            level: result.level,
            reasons: result.reasons.clone(),
            recommended_action: result.recommended_action,
            confidence: result.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!(RiskLevel::parse("low"), Some(RiskLevel::Low));
        assert_eq!(RiskLevel::parse("high"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("extreme"), None);
        assert_eq!(RiskLevel::parse("LOW"), None);
    }

    #[test]
    fn test_level_from_score() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(69), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::High);
    }

    #[test]
    fn test_transaction_type_valid_set() {
        assert!(TransactionType::parse("transfer").is_known());
        assert!(TransactionType::parse("burn").is_known());
        assert!(!TransactionType::parse("stake").is_known());
        assert!(!TransactionType::parse("").is_known());
    }

    #[test]
    fn test_verdict_from_result() {
        let result = AnalysisResult {
            score: 92,
            level: RiskLevel::High,
            confidence: 0.9,
            reasons: vec!["drainer pattern".into()],
            factors: Vec::new(),
            recommended_action: RecommendedAction::Block,
            evidence: serde_json::json!({}),
            sourced_from: ResultSource::Remote,
            cached: false,
        };
        let verdict = Verdict::from(&result);
        assert_eq!(verdict.score, 92);
        assert_eq!(verdict.recommended_action, RecommendedAction::Block);
    }
}
