//! Page message channel
//!
//! Models the page sandbox's broadcast message channel: every participant in
//! the page (wallet trap, network hook, relay bridge) sees every message, and
//! each message carries the origin it was posted from. Origin is what the
//! relay's provenance check runs against - an embedded frame can post a
//! perfectly shaped envelope, but it cannot forge the Page origin.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::correlation::WaiterTable;
use crate::envelope::Envelope;
use std::sync::Arc;

/// Where a page message was posted from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOrigin {
    /// The page's own scripts (wallet trap, network hook, connect responder)
    Page,
    /// The relay bridge re-emitting verdicts from the background
    Relay,
    /// An embedded frame; never trusted
    Frame(String),
}

/// One message on the page channel
#[derive(Debug, Clone)]
pub struct PageEvent {
    pub origin: MessageOrigin,
    pub envelope: Envelope,
}

/// Broadcast handle for the page sandbox's message channel
#[derive(Clone)]
pub struct PageBus {
    tx: broadcast::Sender<PageEvent>,
}

impl PageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Post an envelope to the channel. Delivery is best-effort: with no
    /// subscribers the message is dropped, like a postMessage nobody listens to.
    pub fn emit(&self, origin: MessageOrigin, envelope: Envelope) {
        let kind = envelope.kind();
        if self.tx.send(PageEvent { origin, envelope }).is_err() {
            debug!(kind, "page bus has no subscribers, message dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.tx.subscribe()
    }
}

/// Spawn the page-side dispatcher: routes response envelopes re-emitted by
/// the relay into the page's waiter table. Responses with no pending waiter
/// (late verdicts, fire-and-forget echoes) are logged and dropped.
pub fn spawn_page_dispatcher(
    bus: &PageBus,
    waiters: Arc<WaiterTable>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "page dispatcher lagged behind the bus");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            // Only the relay bridge delivers verdicts into the page
            if event.origin != MessageOrigin::Relay {
                continue;
            }

            match &event.envelope {
                Envelope::InterceptSigningResponse { token, .. } => {
                    waiters.resolve(token, event.envelope.clone());
                }
                Envelope::InterceptNetworkAnalysisComplete { token, verdict } => {
                    // Observability echo for the fire-and-forget path
                    debug!(
                        %token,
                        score = verdict.score,
                        level = ?verdict.level,
                        "network submission analysis complete"
                    );
                    waiters.resolve(token, event.envelope.clone());
                }
                _ => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::Verdict;
    use crate::correlation::{await_resolution, CorrelationToken};
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispatcher_resolves_relay_verdict() {
        let bus = PageBus::new(16);
        let waiters = Arc::new(WaiterTable::new());
        let handle = spawn_page_dispatcher(&bus, waiters.clone());

        let token = CorrelationToken::mint();
        let rx = waiters.register(&token).unwrap();

        bus.emit(
            MessageOrigin::Relay,
            Envelope::InterceptSigningResponse {
                token: token.clone(),
                verdict: Verdict::default(),
            },
        );

        let envelope = await_resolution(rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(envelope.token(), &token);
        handle.abort();
    }

    #[tokio::test]
    async fn test_dispatcher_ignores_page_origin_verdict() {
        let bus = PageBus::new(16);
        let waiters = Arc::new(WaiterTable::new());
        let handle = spawn_page_dispatcher(&bus, waiters.clone());

        let token = CorrelationToken::mint();
        let rx = waiters.register(&token).unwrap();

        // A verdict posted with page origin is not a relay delivery
        bus.emit(
            MessageOrigin::Page,
            Envelope::InterceptSigningResponse {
                token: token.clone(),
                verdict: Verdict::default(),
            },
        );

        let result = await_resolution(rx, Duration::from_millis(50)).await;
        assert!(result.is_err());
        handle.abort();
    }
}
