//! Context relay: the bridge hop between page channel and background channel
//!
//! Stateless for the transaction path: inbound intercepted calls are
//! forwarded to the background verbatim, inbound verdicts are re-emitted onto
//! the page channel, and the correlation token travels untouched in both
//! directions. Provenance is enforced on the page side - an envelope that did
//! not originate from the page itself is dropped without a response, so a
//! spoofing frame only ever sees its own wait time out.
//!
//! The wallet-connect path is the one stateful exception: a one-shot
//! request/response with its own minted token and deadline.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{MessageOrigin, PageBus};
use crate::config::RelayConfig;
use crate::correlation::{await_resolution, CorrelationToken, WaiterTable};
use crate::envelope::{Envelope, ProviderHint};
use crate::error::{Error, Result};

/// One relay instance per page
pub struct ContextRelay {
    page: PageBus,
    to_background: mpsc::Sender<Envelope>,
    connect_waits: Arc<WaiterTable>,
    connect_timeout: Duration,
}

impl ContextRelay {
    pub fn new(page: PageBus, to_background: mpsc::Sender<Envelope>, config: &RelayConfig) -> Self {
        Self {
            page,
            to_background,
            connect_waits: Arc::new(WaiterTable::new()),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    /// Spawn the page -> background half.
    ///
    /// Subscribes to the page channel, validates provenance, and forwards
    /// intercepted-call envelopes to the background. Connect responses are
    /// matched against the relay's own one-shot waits instead.
    pub fn spawn_page_listener(&self) -> JoinHandle<()> {
        let mut rx = self.page.subscribe();
        let to_background = self.to_background.clone();
        let connect_waits = self.connect_waits.clone();

        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "relay lagged behind the page channel");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                // Provenance check: act only on messages the page itself
                // posted. Spoofed envelopes are dropped silently - no
                // response must ever be sent for them.
                if event.origin != MessageOrigin::Page {
                    if event.origin != MessageOrigin::Relay {
                        debug!(
                            origin = ?event.origin,
                            kind = event.envelope.kind(),
                            "dropping envelope with untrusted origin"
                        );
                    }
                    continue;
                }

                match event.envelope {
                    envelope @ (Envelope::InterceptSigningRequest { .. }
                    | Envelope::InterceptNetworkSubmission { .. }) => {
                        if to_background.send(envelope).await.is_err() {
                            warn!("background channel closed, relay stopping");
                            break;
                        }
                    }
                    envelope @ Envelope::InterceptConnectResponse { .. } => {
                        let token = envelope.token().clone();
                        connect_waits.resolve(&token, envelope);
                    }
                    _ => {}
                }
            }
        })
    }

    /// Spawn the background -> page half: verdicts come back over the
    /// privileged channel and are re-emitted onto the page channel under the
    /// relay origin, tagged with the same token they left with.
    pub fn spawn_background_listener(
        &self,
        mut from_background: mpsc::Receiver<Envelope>,
    ) -> JoinHandle<()> {
        let page = self.page.clone();
        tokio::spawn(async move {
            while let Some(envelope) = from_background.recv().await {
                if envelope.is_response() {
                    page.emit(MessageOrigin::Relay, envelope);
                } else {
                    warn!(
                        kind = envelope.kind(),
                        "unexpected request-direction envelope from background"
                    );
                }
            }
        })
    }

    /// One-shot wallet connect relay.
    ///
    /// Mints its own token, posts the connect intent into the page, and
    /// resolves or rejects on the single matched response. Unlike signing,
    /// a timeout here is an error - there is no transaction to fail open.
    pub async fn connect(&self, hint: ProviderHint) -> Result<String> {
        let token = CorrelationToken::mint();
        let rx = self.connect_waits.register(&token)?;

        info!(%token, ?hint, "relaying wallet connect intent");
        self.page.emit(
            MessageOrigin::Relay,
            Envelope::InterceptConnectRequest {
                token: token.clone(),
                provider_hint: hint,
            },
        );

        match await_resolution(rx, self.connect_timeout).await {
            Ok(Envelope::InterceptConnectResponse {
                ok: true,
                address: Some(address),
                ..
            }) => Ok(address),
            Ok(Envelope::InterceptConnectResponse { ok: true, .. }) => Err(Error::ConnectFailed(
                "provider connected without an address".into(),
            )),
            Ok(Envelope::InterceptConnectResponse { error, .. }) => Err(Error::ConnectFailed(
                error.unwrap_or_else(|| "connect rejected".into()),
            )),
            Ok(other) => Err(Error::Internal(format!(
                "unexpected envelope resolved connect wait: {}",
                other.kind()
            ))),
            Err(e) => {
                self.connect_waits.abandon(&token);
                Err(e)
            }
        }
    }
}
