//! Up/Down arbitrage engine entry point.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use updown_arb::api::{create_router, AppState};
use updown_arb::arbitrage::BookTouch;
use updown_arb::config::{Config, StrategyMode};
use updown_arb::engine::{Engine, EngineDeps, LogSink};
use updown_arb::market::{
    GammaDiscovery, Instrument, MarketDiscovery, PaperExchange, PolymarketClient,
};
use updown_arb::metrics;
use updown_arb::orderbook::{BookDelta, BookUpdate, MarketFeed};
use updown_arb::signing::{address_from_private_key, signature_type_from_u8};
use updown_arb::trading::ExecutionGateway;
use updown_arb::utils::shutdown_signal;

/// Up/Down binary arbitrage engine for Polymarket timed events.
#[derive(Parser, Debug)]
#[command(name = "updown-arb")]
#[command(about = "Buys both sides of Polymarket Up/Down events under a combined-cost ceiling")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine (default).
    Run {
        /// Run in dry-run mode (paper exchange).
        #[arg(long)]
        dry_run: Option<bool>,

        /// HTTP server port for health/status/metrics.
        #[arg(short, long)]
        port: Option<u16>,

        /// Strategy: reactive or grid.
        #[arg(long)]
        mode: Option<StrategyMode>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Print the currently open instruments.
    Discover,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("updown_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let registry = tracing_subscriber::registry().with(filter);
    if args.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Discover) => cmd_discover().await,
        Some(Command::Run {
            dry_run,
            port,
            mode,
        }) => cmd_run(dry_run, port, mode).await,
        None => cmd_run(None, None, None).await,
    }
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("UPDOWN ARB - CONFIGURATION CHECK");
    println!("======================================================================");

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
    match config.validate_live() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    if let Some(key) = &config.polymarket_private_key {
        print!("Checking private key... ");
        match address_from_private_key(key) {
            Ok(addr) => {
                println!("OK");
                println!("  Wallet address: {}", addr);
            }
            Err(e) => {
                println!("FAILED");
                println!("  Error: {}", e);
                return Err(anyhow::anyhow!("Private key invalid"));
            }
        }
    }

    let timeframes: Vec<String> = config.timeframes().iter().map(|t| t.to_string()).collect();
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Mode: {}", if config.dry_run { "PAPER" } else { "LIVE" });
    println!("  Strategy: {}", config.strategy_mode);
    println!(
        "  Signature Type: {:?}",
        signature_type_from_u8(config.polymarket_signature_type)
    );
    println!("  Assets: {}", config.asset_list().join(", "));
    println!("  Timeframes: {}", timeframes.join(", "));
    println!("  Cost Ceiling: ${}", config.cost_ceiling);
    println!(
        "  Order Size: {} shares (min {}, max {})",
        config.order_size, config.min_order_size, config.max_order_size
    );
    println!("  Max Imbalance: {} shares", config.max_imbalance_shares);
    println!("  Cooldown: {}ms", config.cooldown_ms);
    println!("  Poll Interval: {}ms", config.poll_interval_ms);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Print the open instrument of every configured series.
async fn cmd_discover() -> anyhow::Result<()> {
    let config = Config::load()?;
    let client = PolymarketClient::new(&config)?;
    let discovery = GammaDiscovery::new(client.http().clone(), config.polymarket_gamma_url.clone());
    let now = OffsetDateTime::now_utc();

    println!("======================================================================");
    println!("UPDOWN ARB - MARKET DISCOVERY");
    println!("======================================================================");
    for asset in config.asset_list() {
        for timeframe in config.timeframes() {
            match discovery.discover(&asset, timeframe, now).await {
                Ok(Some(instrument)) => {
                    println!("  {}", instrument.slug);
                    println!("    UP Token:   {}", instrument.up_token_id);
                    println!("    DOWN Token: {}", instrument.down_token_id);
                    println!("    Remaining:  {}", instrument.time_remaining_str(now));
                }
                Ok(None) => println!("  {asset} {timeframe}: no open event"),
                Err(e) => println!("  {asset} {timeframe}: lookup failed ({e})"),
            }
        }
    }
    println!("======================================================================");
    Ok(())
}

/// Run the engine until a shutdown signal arrives.
async fn cmd_run(
    dry_run: Option<bool>,
    port: Option<u16>,
    mode: Option<StrategyMode>,
) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    if let Some(dry_run) = dry_run {
        config.dry_run = dry_run;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(mode) = mode {
        config.strategy_mode = mode;
    }
    if let Err(e) = config.validate_live() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!(
        mode = if config.dry_run { "PAPER" } else { "LIVE TRADING" },
        strategy = %config.strategy_mode,
        ceiling = %config.cost_ceiling,
        order_size = %config.order_size,
        "Configuration loaded"
    );

    let prometheus = match metrics::install_prometheus() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    };

    let client = PolymarketClient::new(&config)?;
    let gateway: Arc<dyn ExecutionGateway> = if config.dry_run {
        Arc::new(PaperExchange::new(config.sim_balance, Arc::new(BookTouch)))
    } else {
        Arc::new(client.clone())
    };
    let discovery = GammaDiscovery::new(client.http().clone(), config.polymarket_gamma_url.clone());

    let (feed_tx, feed_rx) = mpsc::channel(4096);
    let mut engine = Engine::new(
        &config,
        EngineDeps {
            gateway,
            oracle: Arc::new(client.clone()),
            sink: Arc::new(LogSink),
            feed: feed_rx,
        },
    );

    let mut app_state = AppState::new(engine.subscribe_status(), config.dry_run);
    if let Some(handle) = prometheus {
        app_state = app_state.with_prometheus(handle);
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    let router = create_router(app_state.clone());
    let _server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let feed = MarketFeed::new(
        config.polymarket_ws_url.clone(),
        Duration::from_secs(config.ws_reconnect_delay_secs),
        Duration::from_secs(config.ws_heartbeat_timeout_secs),
    );
    let mut feeds: HashMap<String, JoinHandle<()>> = HashMap::new();

    let mut poll = tokio::time::interval(config.poll_interval());
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut discover = tokio::time::interval(Duration::from_secs(config.discovery_interval_secs));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Engine started");
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let report = engine.tick(OffsetDateTime::now_utc()).await;
                for settlement in &report.settlements {
                    if let Some(handle) = feeds.remove(&settlement.slug) {
                        handle.abort();
                    }
                }
                app_state.set_ready(!engine.arena().is_empty());
            }
            _ = discover.tick() => {
                let now = OffsetDateTime::now_utc();
                for instrument in discover_open(&discovery, &config, now).await {
                    if engine.knows(&instrument.slug) {
                        continue;
                    }
                    info!(
                        slug = %instrument.slug,
                        remaining = %instrument.time_remaining_str(now),
                        "Admitting instrument"
                    );
                    let tokens = vec![
                        instrument.up_token_id.clone(),
                        instrument.down_token_id.clone(),
                    ];
                    warm_books(&client, &tokens, &feed_tx).await;
                    feeds.insert(
                        instrument.slug.clone(),
                        feed.clone().spawn(tokens, feed_tx.clone()),
                    );
                    engine.admit(instrument);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!("Shutting down, canceling resting orders");
    let canceled = engine.shutdown().await;
    for (_, handle) in feeds {
        handle.abort();
    }
    info!(canceled, "Engine stopped");
    Ok(())
}

/// Open instruments of every enabled series.
async fn discover_open(
    discovery: &dyn MarketDiscovery,
    config: &Config,
    now: OffsetDateTime,
) -> Vec<Instrument> {
    let mut found = Vec::new();
    for asset in config.asset_list() {
        for timeframe in config.timeframes() {
            match discovery.discover(&asset, timeframe, now).await {
                Ok(Some(instrument)) => found.push(instrument),
                Ok(None) => {}
                Err(e) => warn!(%asset, %timeframe, error = %e, "Discovery failed"),
            }
        }
    }
    found
}

/// Seed the store with REST snapshots before the feed connects.
async fn warm_books(client: &PolymarketClient, tokens: &[String], tx: &mpsc::Sender<BookUpdate>) {
    for token in tokens {
        match client.get_order_book(token).await {
            Ok(book) => {
                let update = BookUpdate {
                    token_id: token.clone(),
                    delta: BookDelta::Snapshot {
                        bids: book.bids.to_vec(),
                        asks: book.asks.to_vec(),
                    },
                    received_at: book.updated_at,
                };
                if tx.send(update).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(%token, error = %e, "Initial book fetch failed"),
        }
    }
}
