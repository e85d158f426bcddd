//! Outbound-call interception at the network layer
//!
//! Detects transaction submission independent of which wallet object handled
//! signing, by classifying every outbound request against chain-RPC hostname
//! patterns and submission-style method names. Matches are reported
//! fire-and-forget: the underlying call always proceeds, classification only
//! produces telemetry. Over-matching is tolerated; under-matching is covered
//! by the provider trap.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::bus::{MessageOrigin, PageBus};
use crate::correlation::CorrelationToken;
use crate::envelope::Envelope;
use crate::error::Result;

lazy_static! {
    /// Known chain-RPC hostname fragments
    static ref CHAIN_RPC_HOST: Regex =
        Regex::new(r"(?i)(solana|mainnet|devnet|testnet|rpcpool)").expect("static pattern");
}

/// Submission-style RPC method names
const SUBMISSION_METHODS: [&str; 2] = ["sendTransaction", "sendRawTransaction"];

/// A classified transaction submission
#[derive(Debug, Clone, PartialEq)]
pub struct RpcSubmission {
    pub method: String,
    pub params: Value,
}

/// Classify an outbound call as a chain transaction submission.
///
/// Pure function: destination host must look like a chain RPC endpoint AND
/// the body must carry a submission method. Anything else is None.
pub fn classify(url: &str, body: &str) -> Option<RpcSubmission> {
    let host_matches = match Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map(|host| CHAIN_RPC_HOST.is_match(host))
            .unwrap_or(false),
        // Relative or malformed URLs: fall back to matching the whole string
        Err(_) => CHAIN_RPC_HOST.is_match(url),
    };
    if !host_matches {
        return None;
    }

    let parsed: Value = serde_json::from_str(body).ok()?;
    let method = parsed.get("method")?.as_str()?;
    if !SUBMISSION_METHODS.contains(&method) {
        return None;
    }

    Some(RpcSubmission {
        method: method.to_string(),
        params: parsed.get("params").cloned().unwrap_or(Value::Null),
    })
}

/// The page's outbound request primitive
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    async fn send(&self, url: &str, body: &str) -> Result<String>;
}

/// Transport wrapper that reports classified submissions onto the page
/// channel without ever touching the underlying call.
pub struct HookedTransport<T> {
    inner: T,
    bus: PageBus,
}

impl<T: OutboundTransport> HookedTransport<T> {
    pub fn new(inner: T, bus: PageBus) -> Self {
        Self { inner, bus }
    }
}

#[async_trait]
impl<T: OutboundTransport> OutboundTransport for HookedTransport<T> {
    async fn send(&self, url: &str, body: &str) -> Result<String> {
        if let Some(submission) = classify(url, body) {
            let token = CorrelationToken::mint();
            debug!(%token, method = %submission.method, url, "outbound chain submission detected");
            // Advisory only; blocking an already-encoded RPC call is unsafe
            self.bus.emit(
                MessageOrigin::Page,
                Envelope::InterceptNetworkSubmission {
                    token,
                    method: submission.method,
                    params: submission.params,
                },
            );
        }

        self.inner.send(url, body).await
    }
}
