//! Shared test doubles for the analysis pipeline

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::analysis::remote::{RiskScorer, ScorerHealth, ScorerRequest};
use crate::error::{Error, Result};

/// Scripted scorer: pops one canned response per call, errors once the
/// script runs dry.
pub(crate) struct ScriptedScorer {
    responses: Mutex<VecDeque<Result<Value>>>,
    calls: AtomicU32,
}

impl ScriptedScorer {
    pub fn new(responses: Vec<Result<Value>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        })
    }

    /// Scorer that always fails at the transport level
    pub fn unreachable() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskScorer for ScriptedScorer {
    async fn score(&self, _request: &ScorerRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::ScorerTransport("script exhausted".into())))
    }

    async fn health(&self) -> Result<ScorerHealth> {
        Ok(ScorerHealth {
            available: true,
            status: Some(200),
            error: None,
        })
    }
}

/// Wire-shaped response with the given score/level/action
pub(crate) fn scorer_response(score: f64, level: &str, action: &str) -> Value {
    json!({
        "risk_assessment": {"score": score, "level": level, "confidence": 0.9},
        "risk_factors": [
            {"factor": "scripted", "severity": level, "description": format!("scripted {level} risk")}
        ],
        "recommendations": {"action": action, "reason": "scripted"}
    })
}
