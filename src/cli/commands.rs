//! CLI command implementations

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::analysis::types::{
    AnalysisContext, AnalysisRequest, TransactionDetails, TransactionType,
};
use crate::analysis::AnalysisClient;
use crate::bus::{spawn_page_dispatcher, PageBus};
use crate::config::Config;
use crate::correlation::WaiterTable;
use crate::envelope::{ProviderHint, TransactionPayload};
use crate::error::Error;
use crate::orchestrator::Orchestrator;
use crate::relay::ContextRelay;
use crate::sandbox::provider::{SignedTransaction, WalletProvider};
use crate::sandbox::slot::{spawn_connect_responder, GuardObserver, PageBindings};

/// Analyze a single transaction from the command line
pub async fn analyze(
    config: &Config,
    from: &str,
    to: &str,
    amount: &str,
    asset: Option<String>,
    tx_type: &str,
) -> Result<()> {
    let client = AnalysisClient::from_config(config);

    let request = AnalysisRequest {
        token: crate::correlation::CorrelationToken::mint(),
        transaction: TransactionDetails {
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount: amount.to_string(),
            asset,
            asset_symbol: None,
            signature: None,
            transaction_type: TransactionType::parse(tx_type),
        },
        context: AnalysisContext::default(),
        preferences: Default::default(),
    };

    info!("Analyzing transaction {} -> {} ({})", from, to, amount);
    let result = client.analyze(&request).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Check remote scorer health
pub async fn health(config: &Config) -> Result<()> {
    info!("Checking scorer at {}", config.scorer.endpoint);
    let client = AnalysisClient::from_config(config);

    let health = client.scorer_health().await?;
    println!("{}", serde_json::to_string_pretty(&health)?);

    if !health.available {
        warn!("Remote scorer unavailable - analysis will degrade to local fallback");
    }
    Ok(())
}

/// Show current configuration with secrets masked
pub fn show_config(config: &Config) -> Result<()> {
    let mut masked = config.clone();
    if !masked.scorer.api_key.is_empty() {
        masked.scorer.api_key = "***".to_string();
    }
    println!("{masked:#?}");
    Ok(())
}

/// Demo wallet used by the simulate command; signs everything
struct DemoWallet;

#[async_trait]
impl WalletProvider for DemoWallet {
    fn name(&self) -> &str {
        "demo-wallet"
    }

    async fn connect(&self) -> crate::error::Result<String> {
        Ok("DemoWa11etAddre55".to_string())
    }

    async fn sign_transaction(
        &self,
        tx: TransactionPayload,
    ) -> crate::error::Result<SignedTransaction> {
        Ok(SignedTransaction {
            transaction: tx,
            signature: "demo-signature".to_string(),
        })
    }

    async fn sign_all_transactions(
        &self,
        txs: Vec<TransactionPayload>,
    ) -> crate::error::Result<Vec<SignedTransaction>> {
        Ok(txs
            .into_iter()
            .map(|tx| SignedTransaction {
                transaction: tx,
                signature: "demo-signature".to_string(),
            })
            .collect())
    }

    async fn sign_and_send(&self, _tx: TransactionPayload) -> crate::error::Result<String> {
        Ok("demo-signature".to_string())
    }
}

/// Run one intercepted signing attempt through the full in-process pipeline:
/// page trap -> relay -> orchestrator -> analysis -> verdict -> wallet.
pub async fn simulate(config: &Config, from: &str, to: &str, amount: &str) -> Result<()> {
    info!("Wiring in-process firewall pipeline");

    // Page sandbox: message channel, waiter table, binding trap
    let page = PageBus::new(config.sandbox.bus_capacity);
    let waiters = Arc::new(WaiterTable::new());
    spawn_page_dispatcher(&page, waiters.clone());

    let bindings = Arc::new(PageBindings::new());
    let observer = GuardObserver::new(
        page.clone(),
        waiters.clone(),
        Duration::from_millis(config.sandbox.wait_timeout_ms),
    );
    let slot = match bindings.install_slot(&config.sandbox.binding_name, observer) {
        Ok(slot) => slot,
        Err(e) => {
            // Degraded mode: only the network hook would observe anything
            warn!("{e}; signing interception disabled");
            return Ok(());
        }
    };
    spawn_connect_responder(&page, bindings);

    // Relay and background orchestrator
    let (bg_tx, bg_rx) = mpsc::channel(config.relay.channel_capacity);
    let (verdict_tx, verdict_rx) = mpsc::channel(config.relay.channel_capacity);
    let relay = ContextRelay::new(page.clone(), bg_tx, &config.relay);
    relay.spawn_page_listener();
    relay.spawn_background_listener(verdict_rx);
    tokio::spawn(Orchestrator::from_config(config).run(bg_rx, verdict_tx));

    // The wallet library arrives late and populates the binding
    slot.assign(Arc::new(DemoWallet));
    info!("Demo wallet assigned to binding '{}'", config.sandbox.binding_name);

    let address = relay.connect(ProviderHint::FirstAvailable).await?;
    info!("Wallet connected: {address}");

    let provider = slot.get().ok_or(Error::ProviderUnavailable)?;
    let payload = TransactionPayload {
        from: Some(from.to_string()),
        to: Some(to.to_string()),
        amount: Some(amount.to_string()),
        ..Default::default()
    };

    info!("Submitting signing request through the trap...");
    match provider.sign_transaction(payload).await {
        Ok(signed) => {
            println!("APPROVED: transaction signed ({})", signed.signature);
        }
        Err(Error::TransactionBlocked { score, reasons }) => {
            println!("BLOCKED: risk score {score}");
            for reason in reasons {
                println!("  - {reason}");
            }
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
