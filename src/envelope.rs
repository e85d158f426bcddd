//! Tagged message envelopes exchanged between sandboxes
//!
//! Every hop of the relay path speaks the same `{type, token, ...}` envelope,
//! serialized with kebab-case type tags. The token travels verbatim through
//! every hop; it is the only thing that ties a response to its request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::types::Verdict;
use crate::correlation::CorrelationToken;

/// Signing-family methods substituted by the provider trap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignMethod {
    SignTransaction,
    SignAll,
    SignAndSend,
    SubmitRaw,
}

impl SignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignMethod::SignTransaction => "sign-transaction",
            SignMethod::SignAll => "sign-all",
            SignMethod::SignAndSend => "sign-and-send",
            SignMethod::SubmitRaw => "submit-raw",
        }
    }
}

/// Raw transaction fields as captured at the interception point.
///
/// Everything is optional: the page sandbox forwards whatever it could see,
/// and the orchestrator substitutes explicit unknown markers for the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Token mint address, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Base64-encoded serialized transaction, when the call carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_base64: Option<String>,
}

/// An intercepted signing attempt, minted by the provider trap or the
/// outbound-call hook. Immutable; consumed exactly once by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedCall {
    pub token: CorrelationToken,
    pub method: SignMethod,
    pub payload: TransactionPayload,
    pub captured_at: DateTime<Utc>,
}

impl InterceptedCall {
    pub fn new(method: SignMethod, payload: TransactionPayload) -> Self {
        Self {
            token: CorrelationToken::mint(),
            method,
            payload,
            captured_at: Utc::now(),
        }
    }
}

/// Which wallet provider a connect intent should target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderHint {
    FirstAvailable,
    Named { name: String },
}

/// The tagged envelope carried over every message channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Envelope {
    InterceptConnectRequest {
        token: CorrelationToken,
        provider_hint: ProviderHint,
    },
    InterceptConnectResponse {
        token: CorrelationToken,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    InterceptSigningRequest {
        token: CorrelationToken,
        method: SignMethod,
        transaction: TransactionPayload,
    },
    InterceptSigningResponse {
        token: CorrelationToken,
        verdict: Verdict,
    },
    InterceptNetworkSubmission {
        token: CorrelationToken,
        method: String,
        params: Value,
    },
    InterceptNetworkAnalysisComplete {
        token: CorrelationToken,
        verdict: Verdict,
    },
}

impl Envelope {
    pub fn token(&self) -> &CorrelationToken {
        match self {
            Envelope::InterceptConnectRequest { token, .. }
            | Envelope::InterceptConnectResponse { token, .. }
            | Envelope::InterceptSigningRequest { token, .. }
            | Envelope::InterceptSigningResponse { token, .. }
            | Envelope::InterceptNetworkSubmission { token, .. }
            | Envelope::InterceptNetworkAnalysisComplete { token, .. } => token,
        }
    }

    /// Requests travel page -> background, responses travel back
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Envelope::InterceptSigningRequest { .. }
                | Envelope::InterceptNetworkSubmission { .. }
        )
    }

    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Envelope::InterceptSigningResponse { .. }
                | Envelope::InterceptNetworkAnalysisComplete { .. }
                | Envelope::InterceptConnectResponse { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::InterceptConnectRequest { .. } => "intercept-connect-request",
            Envelope::InterceptConnectResponse { .. } => "intercept-connect-response",
            Envelope::InterceptSigningRequest { .. } => "intercept-signing-request",
            Envelope::InterceptSigningResponse { .. } => "intercept-signing-response",
            Envelope::InterceptNetworkSubmission { .. } => "intercept-network-submission",
            Envelope::InterceptNetworkAnalysisComplete { .. } => {
                "intercept-network-analysis-complete"
            }
        }
    }
}

impl From<InterceptedCall> for Envelope {
    fn from(call: InterceptedCall) -> Self {
        Envelope::InterceptSigningRequest {
            token: call.token,
            method: call.method,
            transaction: call.payload,
        }
    }
}
