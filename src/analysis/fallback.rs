//! Deterministic local fallback scoring
//!
//! Used when the remote scorer is unreachable, keeps timing out, or returns
//! data that fails validation. No network dependency, no randomness: the same
//! transaction always produces the same score, so the degraded mode stays
//! predictable and testable.

use crate::analysis::types::{
    AnalysisResult, RecommendedAction, ResultSource, RiskLevel, TransactionDetails,
    TransactionType,
};

/// Confidence attached to every fallback result; below the 0.8 default
/// assumed for remote results that omit confidence.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

const BASE_SCORE: i32 = 50;

/// Compute a heuristic score from transaction amount and type alone
pub fn score(tx: &TransactionDetails) -> AnalysisResult {
    let mut score = BASE_SCORE;
    let mut reasons = Vec::new();

    let amount = tx.amount.parse::<f64>().unwrap_or(0.0);
    if amount > 1_000_000.0 {
        score += 20;
        reasons.push("Extremely high transaction amount".to_string());
    } else if amount > 100_000.0 {
        score += 10;
        reasons.push("High transaction amount".to_string());
    }

    if tx.transaction_type == TransactionType::Approve {
        score += 15;
        reasons.push("Approval transactions can be risky".to_string());
    }

    if reasons.is_empty() {
        reasons.push("Basic heuristic analysis performed".to_string());
    }

    let score = score.clamp(0, 100) as u8;
    let level = RiskLevel::from_score(score);

    AnalysisResult {
        score,
        level,
        confidence: FALLBACK_CONFIDENCE,
        reasons,
        factors: Vec::new(),
        recommended_action: if level == RiskLevel::High {
            RecommendedAction::Review
        } else {
            RecommendedAction::Approve
        },
        evidence: serde_json::json!({}),
        sourced_from: ResultSource::Fallback,
        cached: false,
    }
}

/// Fallback result for a request that failed validation before any remote
/// attempt was made; carries a generic reason instead of heuristic detail.
pub fn invalid_request(reason: &str) -> AnalysisResult {
    AnalysisResult {
        score: BASE_SCORE as u8,
        level: RiskLevel::Medium,
        confidence: FALLBACK_CONFIDENCE,
        reasons: vec![format!("Request could not be analyzed: {reason}")],
        factors: Vec::new(),
        recommended_action: RecommendedAction::Review,
        evidence: serde_json::json!({}),
        sourced_from: ResultSource::Fallback,
        cached: false,
    }
}
