//! brickvault-meta - metadata reconciliation and caching service
//!
//! Enriches user-owned brick and minifig records with catalog metadata and
//! marketplace prices, caching both in SQLite.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use brickvault_common::config::RootFolderResolver;
use brickvault_common::events::EventBus;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brickvault_meta::config::{rate_limit_config, resolve_rebrickable_api_key, retry_options};
use brickvault_meta::services::{
    BrickLinkClient, EnrichmentService, EnrichmentTuning, MetadataCache, RateLimiter, RebrickableClient,
};
use brickvault_meta::AppState;

const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:5740";

/// Command-line arguments for brickvault-meta
#[derive(Parser, Debug)]
#[command(name = "brickvault-meta")]
#[command(about = "Metadata and price cache for BrickVault")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, env = "BRICKVAULT_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to listen on (overrides the TOML `listen_address`)
    #[arg(short, long)]
    listen: Option<String>,

    /// TOML config file (defaults to ~/.config/brickvault/brickvault-meta.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut resolver = RootFolderResolver::new("brickvault-meta").with_cli_arg(args.root_folder.clone());
    if let Some(path) = args.config.clone() {
        resolver = resolver.with_config_path(path);
    }
    let toml_config = resolver.load_config();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &toml_config.logging.level;
                format!("brickvault_meta={0},brickvault_common={0},tower_http=info", level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting brickvault-meta");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolver.resolve();
    let initializer = brickvault_common::config::RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = brickvault_meta::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let settings = &toml_config.enrichment;
    let api_key = match resolve_rebrickable_api_key(&db_pool, &toml_config).await {
        Ok(key) => key,
        Err(e) => {
            warn!("{}; catalog lookups will fail until a key is configured", e);
            String::new()
        }
    };

    let retry = retry_options(settings);
    let rate_limiter = Arc::new(RateLimiter::new(rate_limit_config(settings)));
    let catalog = Arc::new(
        RebrickableClient::new(api_key, settings.catalog_base_url.clone(), rate_limiter, retry)
            .context("Failed to build catalog client")?,
    );
    let marketplace = Arc::new(
        BrickLinkClient::new(settings.marketplace_base_url.clone(), retry)
            .context("Failed to build marketplace client")?,
    );

    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    let cache = Arc::new(MetadataCache::new(db_pool.clone()));
    let enrichment = Arc::new(EnrichmentService::new(
        cache,
        catalog,
        marketplace,
        event_bus.clone(),
        EnrichmentTuning::from(settings),
    ));

    let state = AppState::new(db_pool, event_bus, enrichment);
    let app = brickvault_meta::build_router(state);

    let listen = args
        .listen
        .or(toml_config.listen_address.clone())
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind to {}", listen))?;
    info!("Listening on http://{}", listen);
    info!("Health check: http://{}/health", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
