//! Median-reversion exit bot entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use median_reversion_bot::api::{create_router, AppState};
use median_reversion_bot::config::Config;
use median_reversion_bot::engine::TradeDecisionLoop;
use median_reversion_bot::market::{KalshiClient, MarketDataSource};
use median_reversion_bot::metrics;
use median_reversion_bot::recorder::CsvTradeRecorder;
use median_reversion_bot::trading::{OrderExecutor, PaperExecutor, PositionSource};
use median_reversion_bot::utils::{spawn_shutdown_listener, wait_for_shutdown};

const RULE: &str = "======================================================================";

/// Median-reversion exit bot for a Kalshi contract.
#[derive(Parser, Debug)]
#[command(name = "median-reversion-bot")]
#[command(about = "Sells a held Kalshi position when price rises above its rolling median")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Simulate fills instead of sending orders.
    #[arg(long)]
    paper: bool,

    /// HTTP server port for health/status/metrics.
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the decision loop (default).
    Run {
        /// Simulate fills instead of sending orders.
        #[arg(long)]
        paper: bool,

        /// HTTP server port for health/status/metrics.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Fetch the current price of the configured contract.
    CheckPrice,

    /// Show the exchange-reported position in the configured contract.
    CheckPosition,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("median_reversion_bot=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::CheckPrice) => cmd_check_price().await,
        Some(Command::CheckPosition) => cmd_check_position().await,
        Some(Command::Run { paper, port }) => cmd_run(paper || args.paper, port.or(args.port)).await,
        None => cmd_run(args.paper, args.port).await,
    }
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("MEDIAN REVERSION BOT - CONFIGURATION CHECK");
    println!("{RULE}");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Ticker: {}", config.kalshi_ticker);
    println!("  API URL: {}", config.kalshi_api_url);
    println!("  API Token: {}", if config.kalshi_api_token.is_some() { "set" } else { "not set" });
    println!("  Window: {} samples", config.window_size);
    println!("  Threshold: {}%", config.deviation_threshold_pct);
    println!("  Max Hold: {}s", config.max_hold_seconds);
    println!("  Refresh: {}s", config.refresh_interval_seconds);
    println!("  Entry Policy: {}", config.entry_policy);
    match config.stop_loss_pct {
        Some(pct) => println!("  Stop Loss: {}% (floor {})", pct, config.stop_loss_floor),
        None => println!("  Stop Loss: disabled"),
    }
    let secs = |v: Option<u64>| v.map_or_else(|| "disabled".to_string(), |s| format!("{}s", s));
    println!("  Min Hold (loss stops): {}s", config.min_hold_seconds);
    println!(
        "  Max Loss: {}",
        config.max_loss_pct.map_or_else(|| "disabled".to_string(), |p| format!("{}%", p))
    );
    println!("  Losing Stop After: {}", secs(config.losing_stop_seconds));
    println!("  Break-even Stop After: {}", secs(config.break_even_seconds));
    println!("  Trailing Stop: {}", if config.trailing_stop { "on" } else { "off" });
    println!("  Reconcile Every: {} cycles", config.reconcile_every_cycles);
    println!("  Mode: {}", if config.paper_trading { "PAPER" } else { "LIVE" });
    println!("  Trade Log: {}", config.trade_log_path());
    println!("{RULE}");
    println!("CONFIGURATION CHECK PASSED");
    println!("{RULE}");

    Ok(())
}

/// Fetch and print the current price.
async fn cmd_check_price() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("MEDIAN REVERSION BOT - PRICE CHECK");
    println!("{RULE}");

    let config = Config::load()?;
    anyhow::ensure!(!config.kalshi_ticker.is_empty(), "KALSHI_TICKER is required");
    let client = KalshiClient::new(&config)?;

    let info = client
        .market_info(&config.kalshi_ticker)
        .await
        .with_context(|| format!("failed to fetch market {}", config.kalshi_ticker))?;

    println!("  Ticker: {}", info.ticker);
    println!("  Title: {}", info.title.as_deref().unwrap_or("-"));
    println!("  Status: {}", info.status.as_deref().unwrap_or("-"));
    println!("  YES Bid: {}", info.yes_bid.map_or("-".to_string(), |p| format!("${}", p)));
    println!("  YES Ask: {}", info.yes_ask.map_or("-".to_string(), |p| format!("${}", p)));

    match client.fetch_price(&config.kalshi_ticker).await {
        Ok(sample) => println!("  Decision Price: ${}", sample.price),
        Err(e) => println!("  Decision Price: unavailable ({})", e),
    }
    println!("{RULE}");

    Ok(())
}

/// Fetch and print the exchange position.
async fn cmd_check_position() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("MEDIAN REVERSION BOT - POSITION CHECK");
    println!("{RULE}");

    let config = Config::load()?;
    anyhow::ensure!(!config.kalshi_ticker.is_empty(), "KALSHI_TICKER is required");
    let client = KalshiClient::new(&config)?;

    match client.fetch_position(&config.kalshi_ticker).await? {
        Some(position) => {
            println!("  Ticker: {}", position.instrument_id);
            println!("  Contracts: {}", position.quantity);
            match position.avg_price {
                Some(avg) => println!("  Avg Price: ${}", avg),
                None => println!("  Avg Price: unknown"),
            }
        }
        None => println!("  No position in {}", config.kalshi_ticker),
    }
    println!("{RULE}");

    Ok(())
}

/// Run the decision loop with the status API alongside.
async fn cmd_run(paper_override: bool, port_override: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if paper_override {
        config.paper_trading = true;
    }
    if let Some(port) = port_override {
        config.port = port;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    };
    metrics::init_metrics();

    let config = Arc::new(config);
    let client = Arc::new(KalshiClient::new(&config)?);

    let executor: Arc<dyn OrderExecutor> = if config.paper_trading {
        let mut paper = PaperExecutor::new();
        if config.kalshi_api_token.is_some() {
            let upstream: Arc<dyn PositionSource> = client.clone();
            paper = paper.with_upstream(upstream);
        } else {
            warn!("No API token: paper mode will not see exchange positions");
        }
        Arc::new(paper)
    } else {
        client.clone()
    };

    let recorder = CsvTradeRecorder::open(config.trade_log_path())
        .with_context(|| format!("failed to open trade log {}", config.trade_log_path()))?;

    let mut decision_loop = TradeDecisionLoop::new(config.clone(), client, executor, recorder)?;

    let mut app_state = AppState::new(decision_loop.subscribe());
    if let Some(handle) = metrics_handle {
        app_state = app_state.with_metrics(handle);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    spawn_shutdown_listener(shutdown_tx.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(wait_for_shutdown(server_shutdown))
            .await
    });

    info!("========================================");
    info!("MEDIAN REVERSION BOT STARTED");
    info!("========================================");
    info!("Ticker: {}", config.kalshi_ticker);
    info!("Mode: {}", if config.paper_trading { "PAPER TRADING" } else { "LIVE TRADING" });
    info!("Trade log: {}", config.trade_log_path());
    info!("========================================");

    app_state.set_ready(true);
    let outcome = decision_loop.run(shutdown_rx).await;
    app_state.set_ready(false);

    // Stop the server too when the loop halted on its own.
    shutdown_tx.send_replace(true);
    if let Err(e) = server_handle.await? {
        warn!(error = %e, "HTTP server error");
    }

    let stats = outcome.map_err(|e| {
        error!("Decision loop halted: {}", e);
        e
    })?;

    info!("========================================");
    info!("SESSION SUMMARY");
    info!("Cycles: {}", stats.cycles);
    info!("Trades closed: {} ({} wins, {} losses)", stats.trades_closed, stats.wins, stats.losses);
    info!("Realized P&L: ${} (fees ${})", stats.total_realized_pnl, stats.total_fees);
    info!("Failed exit attempts: {}", stats.failed_exit_attempts);
    info!("Reconciliation alarms: {}", stats.reconciliation_alarms);
    info!("========================================");

    Ok(())
}
