// In app/src/main.rs

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use api_client::ApiClient;
use app_config::Settings;
use clap::{Parser, Subcommand};
use engine::Engine;
use execution::live::LiveGateway;
use execution::market::ExchangeMarketData;
use execution::simulated::SimulatedExchange;
use execution::{MarketDataSource, OrderGateway, SimulationSettings};
use notifier::{LogNotifier, Notifier, TelegramNotifier, messages};
use tokio::sync::watch;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

const LOG_FILE: &str = "trading_bot.log";

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "An ML-driven Binance Futures trading bot.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the trading loop against the exchange, or the simulator when `app.simulation` is set.
    Run,

    /// Runs the trading loop against the in-process simulated exchange.
    Simulate,

    /// Checks connectivity and credentials, and prints the account balance.
    Check,

    /// Reconciles local positions with the exchange once and prints a summary. Places no orders.
    Reconcile,
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let cli = Cli::parse();

    let settings = app_config::load_settings().context("Failed to load configuration")?;
    init_tracing(&settings)?;

    tracing::info!(environment = %settings.app.environment, command = ?cli.command, "Starting trading bot.");

    // Match on the parsed command and call the appropriate handler.
    match cli.command {
        Commands::Run => {
            let simulate = settings.app.simulation;
            run_bot(settings, simulate).await?;
        }
        Commands::Simulate => run_bot(settings, true).await?,
        Commands::Check => handle_check(&settings).await?,
        Commands::Reconcile => handle_reconcile(settings).await?,
    }

    tracing::info!("Trading bot has finished successfully.");
    Ok(())
}

/// Stdout plus a plain-text log file, both filtered by `app.log_level`.
fn init_tracing(settings: &Settings) -> Result<()> {
    let level = settings
        .app
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    let targets = Targets::new()
        .with_target("reqwest", tracing::Level::WARN)
        .with_target("hyper", tracing::Level::WARN)
        .with_target("hyper_util", tracing::Level::WARN)
        .with_default(level);

    let log_dir = Path::new(&settings.storage.log_dir);
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
        .context("Failed to open log file")?;

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(targets.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .with_filter(targets);
    tracing_subscriber::registry().with(stdout_layer).with(file_layer).init();
    Ok(())
}

fn build_notifier(settings: &Settings) -> Result<Arc<dyn Notifier>> {
    match &settings.telegram {
        Some(telegram) if !telegram.token.is_empty() => {
            let notifier = TelegramNotifier::new(telegram, settings.gateway_timeout())?;
            tracing::info!("Telegram notifications enabled.");
            Ok(Arc::new(notifier))
        }
        _ => {
            tracing::warn!("No Telegram token configured; notifications go to the log only.");
            Ok(Arc::new(LogNotifier))
        }
    }
}

type Venue = (Arc<dyn MarketDataSource>, Arc<dyn OrderGateway>);

/// Market data and order flow from either the real exchange or the simulator.
async fn build_venue(settings: &Settings, simulate: bool) -> Result<Venue> {
    if simulate {
        tracing::warn!("Simulation mode: orders are filled by the in-process simulated exchange.");
        let exchange = Arc::new(SimulatedExchange::new(SimulationSettings::default()));
        let market: Arc<dyn MarketDataSource> = exchange.clone();
        let gateway: Arc<dyn OrderGateway> = exchange;
        return Ok((market, gateway));
    }

    let api_client = ApiClient::new(&settings.exchange, settings.gateway_timeout())?;
    check_connection(&api_client).await?;
    let market: Arc<dyn MarketDataSource> = Arc::new(ExchangeMarketData::new(api_client.clone()));
    let gateway: Arc<dyn OrderGateway> = Arc::new(LiveGateway::new(api_client));
    Ok((market, gateway))
}

async fn check_connection(api_client: &ApiClient) -> Result<()> {
    let account = api_client
        .get_account_balance()
        .await
        .context("Exchange connection check failed")?;
    match account.asset_balance("USDT") {
        Some(balance) => tracing::info!(%balance, "Connected to exchange. USDT balance available."),
        None => tracing::warn!("Connected to exchange, but the account holds no USDT."),
    }
    Ok(())
}

// --- "Run" Subcommand Logic ---

/// Builds every component and trades until Ctrl-C or a fatal error.
async fn run_bot(settings: Settings, simulate: bool) -> Result<()> {
    let notifier = build_notifier(&settings)?;
    let (market, gateway) = build_venue(&settings, simulate).await?;
    let symbols = settings.trading.symbols.join(", ");
    let mut engine = Engine::new(settings, market, gateway.clone(), notifier.clone())?;

    notifier
        .send(&format!(
            "<b>Trading bot started</b>\nVenue: {}\nSymbols: {}",
            gateway.name(),
            messages::escape(&symbols)
        ))
        .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested; finishing the current tick.");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(shutdown_rx).await.context("Trading halted")?;
    notifier.send("<b>Trading bot stopped</b>").await;
    Ok(())
}

// --- "Check" Subcommand Logic ---

async fn handle_check(settings: &Settings) -> Result<()> {
    let api_client = ApiClient::new(&settings.exchange, settings.gateway_timeout())?;
    let account = api_client
        .get_account_balance()
        .await
        .context("Exchange connection check failed")?;

    println!("Connection OK ({})", settings.exchange.rest_base_url);
    println!("Total wallet balance: {}", account.total_wallet_balance);
    println!("Unrealized profit:    {}", account.total_unrealized_profit);
    for asset in account.assets.iter().filter(|a| !a.wallet_balance.is_zero()) {
        println!("  {:<6} wallet {} available {}", asset.asset, asset.wallet_balance, asset.available_balance);
    }
    Ok(())
}

// --- "Reconcile" Subcommand Logic ---

async fn handle_reconcile(settings: Settings) -> Result<()> {
    let notifier = build_notifier(&settings)?;
    let (market, gateway) = build_venue(&settings, settings.app.simulation).await?;
    let mut engine = Engine::new(settings, market, gateway, notifier)?;

    engine.startup_reconcile().await.context("Reconciliation failed")?;
    engine.refresh_prices().await;
    match engine.summary().await {
        Some(table) => println!("{table}"),
        None => println!("No open positions."),
    }
    Ok(())
}
