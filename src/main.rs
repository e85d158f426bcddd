//! Wallet Sentinel - transaction firewall for Solana wallet signing flows
//!
//! # WARNING
//! - Timeouts fail open by design: a slow scorer means the transaction
//!   proceeds unanalyzed. This is an availability tradeoff, not a guarantee
//!   that malicious transactions are stopped.
//! - The network-layer hook is detect-only; blocking happens exclusively at
//!   the wallet provider trap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use wallet_sentinel::cli::commands;
use wallet_sentinel::config::Config;

/// Wallet Sentinel - transaction firewall for Solana wallets
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single transaction (cache -> remote -> fallback)
    Analyze {
        /// Source wallet address
        #[arg(long)]
        from: String,

        /// Destination wallet address
        #[arg(long)]
        to: String,

        /// Transaction amount
        #[arg(long)]
        amount: String,

        /// Token mint address
        #[arg(long)]
        asset: Option<String>,

        /// Transaction type: transfer, swap, approve, mint, burn, other
        #[arg(long, default_value = "transfer")]
        tx_type: String,
    },

    /// Run one signing attempt through the full in-process pipeline
    Simulate {
        /// Source wallet address
        #[arg(long, default_value = "DemoWa11etAddre55")]
        from: String,

        /// Destination wallet address
        #[arg(long, default_value = "Rec1pientAddre55")]
        to: String,

        /// Transaction amount
        #[arg(long, default_value = "5")]
        amount: String,
    },

    /// Check remote scorer health
    Health,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wallet_sentinel=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Analyze {
            from,
            to,
            amount,
            asset,
            tx_type,
        } => commands::analyze(&config, &from, &to, &amount, asset, &tx_type).await,
        Commands::Simulate { from, to, amount } => {
            commands::simulate(&config, &from, &to, &amount).await
        }
        Commands::Health => commands::health(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
