//! Price Relay - answers on-chain price requests with simulated exchange quotes
//!
//! Run with: cargo run -- relay --logs requests.json

use alloy_primitives::{Address, B256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod gas_oracle;
mod relay;
mod simulator;
mod tokens;

use config::Config;
use relay::{PriceRelay, PriceRequest, RawLog, RelaySigner, RpcOracleChain, SubmissionOutcome};
use simulator::{parse_amount, BundleSimulationClient, QuoteSimulator};
use tokens::parse_address;

#[derive(Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// TOML config file; environment variables are used when absent
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relay every price request found in a batch of logs
    Relay {
        /// JSON array of raw logs `{address, topics, data}`
        #[clap(long, conflicts_with = "tx_hash", required_unless_present = "tx_hash")]
        logs: Option<PathBuf>,

        /// Destination-chain transaction whose receipt logs are relayed
        #[clap(long)]
        tx_hash: Option<String>,
    },

    /// Simulate one quote and print it without submitting
    Quote {
        #[clap(long)]
        from: String,

        #[clap(long)]
        to: String,

        /// Input amount in base units (decimal or 0x hex); one whole token by default
        #[clap(long)]
        amount: Option<String>,
    },

    /// Validate the configuration and print a summary
    Check,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 📡 PRICE RELAY - Simulated Exchange Quotes for On-Chain Oracles").cyan().bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

fn build_simulator(config: &Config) -> Result<(QuoteSimulator, BundleSimulationClient)> {
    let simulator = QuoteSimulator::new(
        config.exchange()?,
        config.storage_overrides()?,
        config.token_settings()?,
    );
    let backend = BundleSimulationClient::new(
        &config.simulation_rpc_url,
        &config.simulation_method,
        &config.simulation_block,
    )?;
    Ok((simulator, backend))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("price_relay=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    print_banner();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Check => {
            config.print_summary();
            config.validate()?;
            println!("{}", style("✓ Configuration is valid").green().bold());
            Ok(())
        }
        Command::Quote { from, to, amount } => run_quote(&config, &from, &to, amount.as_deref()).await,
        Command::Relay { logs, tx_hash } => run_relay(&config, logs, tx_hash).await,
    }
}

async fn run_quote(config: &Config, from: &str, to: &str, amount: Option<&str>) -> Result<()> {
    config.validate_quoting()?;
    let (simulator, backend) = build_simulator(config)?;

    let request = PriceRequest {
        request_key: None,
        from_token: parse_address(from)?,
        to_token: parse_address(to)?,
        oracle_address: Address::ZERO,
        amount: amount.map(parse_amount).transpose()?,
    };

    println!("{}", style("Step 1: Simulating exchange...").bold());
    let start = Instant::now();
    let quote = simulator.simulate(&request, &backend).await?;

    if quote.is_available() {
        println!(
            "   ✓ {} in → {} out ({} decimals) in {:?}",
            quote.amount_in,
            quote.tokens_received,
            quote.decimals.unwrap_or_default(),
            start.elapsed()
        );
    } else {
        println!("   {} No quote available for this pair", style("✗").red());
    }

    println!("{}", serde_json::to_string_pretty(&quote)?);
    Ok(())
}

async fn run_relay(config: &Config, logs: Option<PathBuf>, tx_hash: Option<String>) -> Result<()> {
    config.validate()?;

    let key = config
        .relayer_private_key
        .as_deref()
        .ok_or_else(|| eyre!("RELAYER_PRIVATE_KEY is not set"))?;
    let signer = RelaySigner::from_key(key, config.chain_id)?;
    let chain = RpcOracleChain::new(&config.rpc_url)?;
    let decoder = config.request_decoder()?;
    let (simulator, backend) = build_simulator(config)?;

    let mut engine = PriceRelay::new(simulator, config.gas_oracle()?, config.failure_policy);
    if let Some(journal) = config.journal() {
        info!("Journaling outcomes to {}", journal.path().display());
        engine = engine.with_journal(journal);
    }

    // ============================================
    // STEP 1: Collect logs
    // ============================================
    println!("{}", style("Step 1: Loading request logs...").bold());
    let raw_logs: Vec<RawLog> = match (logs, tx_hash) {
        (Some(path), _) => {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        }
        (None, Some(hash)) => {
            let hash = B256::from_str(hash.trim()).map_err(|e| eyre!("invalid tx hash '{}': {}", hash, e))?;
            chain.transaction_logs(hash).await?
        }
        (None, None) => return Err(eyre!("either --logs or --tx-hash is required")),
    };
    println!(
        "   ✓ {} logs, relayer {:?} on chain {}",
        raw_logs.len(),
        signer.address(),
        signer.chain_id()
    );

    // ============================================
    // STEP 2: Quote and submit
    // ============================================
    println!("{}", style("Step 2: Quoting and submitting...").bold());
    let start = Instant::now();
    let outcomes = engine
        .relay_logs(&raw_logs, &decoder, &signer, &backend, &chain)
        .await?;

    // ============================================
    // SUMMARY
    // ============================================
    for outcome in &outcomes {
        match outcome {
            SubmissionOutcome::Submitted { key, nonce, tx_hash, .. } => {
                println!("   {} {} nonce {} → {}", style("✓").green(), key, nonce, tx_hash);
            }
            SubmissionOutcome::Duplicate { key } => {
                println!("   {} {} (duplicate)", style("•").dim(), key);
            }
            SubmissionOutcome::Unpriceable { key } => {
                println!("   {} {} (no quote)", style("✗").yellow(), key);
            }
            SubmissionOutcome::Failed { key, reason } => {
                warn!("{} failed: {}", key, reason);
                println!("   {} {} ({})", style("✗").red(), key, reason);
            }
        }
    }

    let submitted = outcomes.iter().filter(|o| o.is_submitted()).count();
    println!();
    println!(
        "{}",
        style(format!(
            "Relayed {}/{} requests in {:?}",
            submitted,
            outcomes.len(),
            start.elapsed()
        ))
        .bold()
    );

    Ok(())
}
