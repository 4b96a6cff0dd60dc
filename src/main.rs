//! Gateway binary.
//!
//! Wires the pieces together: authenticate, start the book engine and its
//! workers, expose the local fan-out server, connect the exchange feed, and
//! log pipeline stats until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use deribit_gateway::auth::Authenticator;
use deribit_gateway::config::GatewayConfig;
use deribit_gateway::feed::{FeedConfig, FeedSession};
use deribit_gateway::market::MarketData;
use deribit_gateway::orders::{OrderManager, OrderManagerConfig};
use deribit_gateway::server::{FanoutServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(about = "Deribit market-data and order-routing gateway")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: String,

    /// Instruments to subscribe to (defaults to the config's instrument)
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Local fan-out WebSocket port (overrides the config)
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between pipeline stats log lines
    #[arg(long, default_value = "30")]
    stats_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = GatewayConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config))?;
    config.apply_env();
    if let Some(port) = args.port {
        config.server.websocket_port = port;
    }

    let symbols = if args.symbols.is_empty() {
        vec![config.trading.default_instrument.clone()]
    } else {
        args.symbols.clone()
    };

    // Market data works without a token; order routing does not.
    let auth = Arc::new(Authenticator::new(
        config.base_url.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    ));
    if let Err(e) = auth.authenticate().await {
        warn!(error = %e, "authentication failed, order routing unavailable");
    }

    let engine = MarketData::new(config.engine_config());
    engine.start();

    let orders = OrderManager::new(
        config.base_url.clone(),
        Arc::clone(&auth),
        OrderManagerConfig::default(),
    );
    orders.start();

    let server = FanoutServer::new(ServerConfig {
        port: config.server.websocket_port,
        ..Default::default()
    });
    {
        let server = Arc::clone(&server);
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if let Err(e) = server.run(engine).await {
                warn!(error = %e, "fan-out server exited");
            }
        });
    }

    let feed = FeedSession::new(
        FeedConfig {
            ws_url: config.ws_url.clone(),
            symbols: symbols.clone(),
            ..Default::default()
        },
        Arc::clone(&engine),
    );
    let feed_task = tokio::spawn(Arc::clone(&feed).run());

    info!(?symbols, port = config.server.websocket_port, "gateway running");

    let mut stats_tick = tokio::time::interval(Duration::from_secs(args.stats_interval.max(1)));
    stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    stats_tick.tick().await;

    loop {
        tokio::select! {
            _ = stats_tick.tick() => {
                let stats = engine.stats().snapshot();
                let latency = engine.latency_summary();
                info!(
                    enqueued = stats.enqueued,
                    processed = stats.processed,
                    dropped = stats.dropped,
                    queue_len = engine.queue_len(),
                    e2e_p50_ns = latency.total.p50_ns,
                    e2e_p99_ns = latency.total.p99_ns,
                    "pipeline stats"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    feed.stop();
    feed_task.abort();
    orders.stop().await;
    engine.stop();

    Ok(())
}
