//! traffic-classifier - Traffic classification microservice
//!
//! Serves the rule-based classifier that traffic-ingest calls to enrich
//! events. Optionally opens the ingest database read-only so stored events
//! can be classified by id.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traffic_common::config::{self, TomlConfig};
use traffic_common::{EventStore, SqliteEventStore};
use traffic_classifier::{build_router, AppState};

const MODULE_NAME: &str = "traffic-classifier";
const DEFAULT_PORT: u16 = 8001;

/// Command-line arguments for traffic-classifier
#[derive(Parser, Debug)]
#[command(name = "traffic-classifier")]
#[command(about = "Traffic classification microservice")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "SMART_TRAFFIC_CLASSIFIER_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "SMART_TRAFFIC_CLASSIFIER_PORT")]
    port: Option<u16>,

    /// Ingest database to read events from (enables /classify_by_id lookups)
    #[arg(short, long, env = "SMART_TRAFFIC_DATABASE")]
    database: Option<PathBuf>,

    /// Explicit TOML config file (skips the default lookup)
    #[arg(short, long, env = "SMART_TRAFFIC_CLASSIFIER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_result = match &args.config {
        Some(path) => config::load_toml_config_from(path).map(|c| Some((path.clone(), c))),
        None => config::load_toml_config(MODULE_NAME),
    };
    let toml_config = match &toml_result {
        Ok(Some((_, config))) => config.clone(),
        _ => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", toml_config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting smart-traffic classifier (traffic-classifier) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &toml_result {
        Ok(Some((path, _))) => info!("Loaded config file: {}", path.display()),
        Ok(None) => info!("No config file found, using defaults"),
        Err(e) => warn!("Ignoring config file: {}", e),
    }

    let port = config::resolve(args.port, toml_config.port, DEFAULT_PORT);

    let database = args.database.or(toml_config.database_path.clone());
    let store: Option<Arc<dyn EventStore>> = match database {
        Some(db_path) => match traffic_common::db::connect_readonly(&db_path).await {
            Ok(pool) => {
                info!("✓ Connected to database (read-only): {}", db_path.display());
                let store: Arc<dyn EventStore> = Arc::new(SqliteEventStore::new(pool));
                Some(store)
            }
            Err(e) => {
                warn!(
                    "Database unavailable ({}): {}; lookups by event_id disabled",
                    db_path.display(),
                    e
                );
                None
            }
        },
        None => {
            info!("No database configured; lookups by event_id disabled");
            None
        }
    };

    let state = AppState::new(store);
    let startup_time = state.startup_time;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("traffic-classifier listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let uptime = chrono::Utc::now().signed_duration_since(startup_time);
    info!("Server shutdown complete (uptime {}s)", uptime.num_seconds());
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
            info!("Received SIGTERM, shutting down");
        },
    }
}
