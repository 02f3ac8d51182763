//! Omnily POS: loyalty engine service for the point-of-sale counter.
//!
//! Main entry point that wires the store, mailer, and engine and starts the server.

use chrono::Utc;
use clap::Parser;
use omnily_api::ApiServer;
use omnily_channels::mailer_from_config;
use omnily_core::config::AppConfig;
use omnily_core::event_bus::{EventSink, TracingSink};
use omnily_loyalty::{InMemoryStore, LoyaltyEngine, LoyaltyStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "omnily-pos")]
#[command(about = "Loyalty points, tiers, and reward redemption for the POS counter")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "OMNILY__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "OMNILY__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "OMNILY__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Seed the in-memory store with a demo organization
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omnily_pos=info,omnily_loyalty=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Omnily POS starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        email_enabled = config.email.enabled,
        atomic_redemption = config.loyalty.atomic_redemption,
        "Configuration loaded"
    );

    let store: Arc<dyn LoyaltyStore> = if cli.seed_demo {
        Arc::new(InMemoryStore::with_demo_data())
    } else {
        Arc::new(InMemoryStore::new())
    };
    let mailer = mailer_from_config(&config.email)?;
    let events: Arc<dyn EventSink> = Arc::new(TracingSink);

    let engine = Arc::new(LoyaltyEngine::new(store, mailer, events, &config.loyalty));

    let api_server = ApiServer::new(config.clone(), engine.clone());

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Notification retention sweep
    let cleanup_engine = engine.clone();
    let cleanup_every = Duration::from_secs(config.loyalty.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        loop {
            interval.tick().await;
            if let Err(e) = cleanup_engine.cleanup(Utc::now()).await {
                warn!(error = %e, "Notification cleanup failed");
            }
        }
    });

    info!("Omnily POS is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
