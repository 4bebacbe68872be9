//! coffer server binary.

use anyhow::{Context, Result};
use clap::Parser;
use coffer_core::config::AppConfig;
use coffer_server::{AppState, IssuerKeys, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// coffer - single-use download links for streamed ZIP archives
#[derive(Parser, Debug)]
#[command(name = "cofferd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "COFFER_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from the optional TOML file and `COFFER_*` variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("COFFER_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("coffer v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    coffer_server::metrics::register_metrics();

    let storage = coffer_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend ready");

    let metadata = coffer_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let issuers = IssuerKeys::from_config(&config.issuer)?;
    let state = AppState::new(config.clone(), storage, metadata, issuers);

    if let Some(interval) = config.download.sweep_interval() {
        coffer_server::tokens::spawn_sweeper(state.tokens.clone(), interval);
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Expired token sweeper spawned"
        );
    } else {
        tracing::info!("Expired token sweeper disabled");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
