//! traffic-ingest - Traffic sensor event ingestion microservice
//!
//! Stores incoming events, answers immediately with a provisional
//! classification and enriches each event in the background via
//! traffic-classifier. Runs fine with the classifier down: events simply keep
//! their provisional label.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traffic_common::config::{self, TomlConfig};
use traffic_common::{EventStore, MemoryEventStore, SqliteEventStore};
use traffic_ingest::services::classifier_client::{DEFAULT_CLASSIFIER_URL, DEFAULT_TIMEOUT_MS};
use traffic_ingest::services::ClassifierClient;
use traffic_ingest::{build_router, AppState};

const MODULE_NAME: &str = "traffic-ingest";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;

/// Command-line arguments for traffic-ingest
///
/// Unset options fall back to `traffic-ingest.toml`, then built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "traffic-ingest")]
#[command(about = "Traffic sensor event ingestion microservice")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "SMART_TRAFFIC_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "SMART_TRAFFIC_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "SMART_TRAFFIC_DATABASE")]
    database: Option<PathBuf>,

    /// Keep events in memory instead of SQLite
    #[arg(long, env = "SMART_TRAFFIC_IN_MEMORY")]
    in_memory: bool,

    /// Maximum events held by the in-memory store (oldest evicted first)
    #[arg(long, env = "SMART_TRAFFIC_MEMORY_CAPACITY")]
    memory_capacity: Option<usize>,

    /// Base URL of the classification service
    #[arg(long, env = "MCP_URL")]
    classifier_url: Option<String>,

    /// Timeout for one classification call, in milliseconds
    #[arg(long, env = "SMART_TRAFFIC_CLASSIFIER_TIMEOUT_MS")]
    classifier_timeout_ms: Option<u64>,

    /// How long shutdown waits for in-flight enrichment, in milliseconds
    #[arg(long, env = "SMART_TRAFFIC_SHUTDOWN_GRACE_MS")]
    shutdown_grace_ms: Option<u64>,

    /// Explicit TOML config file (skips the default lookup)
    #[arg(short, long, env = "SMART_TRAFFIC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing so its log level applies; outcome is
    // logged once tracing is up
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
        "Starting smart-traffic ingest (traffic-ingest) v{} [{}] built {} ({})",
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
    let in_memory = args.in_memory || toml_config.in_memory.unwrap_or(false);
    let classifier_url = config::resolve(
        args.classifier_url,
        toml_config.classifier_url.clone(),
        DEFAULT_CLASSIFIER_URL.to_string(),
    );
    let classifier_timeout = traffic_common::time::millis_to_duration(config::resolve(
        args.classifier_timeout_ms,
        toml_config.classifier_timeout_ms,
        DEFAULT_TIMEOUT_MS,
    ));
    let shutdown_grace = traffic_common::time::millis_to_duration(config::resolve(
        args.shutdown_grace_ms,
        toml_config.shutdown_grace_ms,
        DEFAULT_SHUTDOWN_GRACE_MS,
    ));

    let store: Arc<dyn EventStore> = if in_memory {
        match args.memory_capacity.or(toml_config.memory_capacity) {
            Some(capacity) => {
                info!("Using in-memory event store (capacity {})", capacity);
                Arc::new(MemoryEventStore::with_capacity(capacity))
            }
            None => {
                info!("Using in-memory event store (unbounded)");
                Arc::new(MemoryEventStore::new())
            }
        }
    } else {
        let db_path = config::resolve(
            args.database,
            toml_config.database_path.clone(),
            config::default_database_path(),
        );
        info!("Database path: {}", db_path.display());

        let pool = match traffic_common::db::init_database(&db_path).await {
            Ok(pool) => {
                info!("✓ Connected to database");
                pool
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                return Err(e).context("Failed to initialize database");
            }
        };
        Arc::new(SqliteEventStore::new(pool))
    };

    let classifier = ClassifierClient::new(classifier_url.clone(), classifier_timeout)
        .context("Failed to build classification client")?;
    info!(
        "Classification service: {} (timeout {:?})",
        classifier_url, classifier_timeout
    );

    let state = AppState::new(store, Arc::new(classifier));
    let worker = state.worker().clone();
    let startup_time = state.startup_time;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("traffic-ingest listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let pending = worker.in_flight();
    if pending > 0 {
        info!("Waiting up to {:?} for {} enrichment task(s)", shutdown_grace, pending);
    }
    if !worker.drain(shutdown_grace).await {
        warn!(
            "{} enrichment task(s) still running at shutdown; their events keep provisional labels",
            worker.in_flight()
        );
    }

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
