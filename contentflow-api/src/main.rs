//! contentflow-api: content repurposing service
//!
//! Accepts source URLs, drives extraction and generation through the AI
//! orchestrator, and serves results over REST and WebSocket.

use anyhow::{Context, Result};
use clap::Parser;
use contentflow_api::db;
use contentflow_api::services::{AiOrchestrator, HttpOrchestrator, UnconfiguredOrchestrator};
use contentflow_api::{build_router, AppState};
use contentflow_common::config::{LoggingSettings, Settings};
use contentflow_common::db::init_database_pool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "contentflow-api")]
#[command(about = "ContentFlow content repurposing API")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CONTENTFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(long, env = "CONTENTFLOW_HOST")]
    host: Option<String>,

    /// Listen port (overrides the config file)
    #[arg(short, long, env = "CONTENTFLOW_PORT")]
    port: Option<u16>,

    /// SQLite database URL, e.g. sqlite://contentflow.db
    #[arg(long, env = "CONTENTFLOW_DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        settings.app.host = host;
    }
    if let Some(port) = args.port {
        settings.app.port = port;
    }
    if let Some(url) = args.database_url {
        settings.database.url = url;
    }

    init_tracing(&settings.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        build_timestamp = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        environment = %settings.app.environment,
        "Starting contentflow-api"
    );

    settings.validate().context("Invalid configuration")?;

    let pool = init_database_pool(&settings.database.url, settings.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", settings.database.url))?;
    db::init_tables(&pool)
        .await
        .context("Failed to initialize database tables")?;

    let interrupted = db::jobs::fail_interrupted_jobs(&pool)
        .await
        .context("Failed to recover interrupted jobs")?;
    if interrupted > 0 {
        warn!(count = interrupted, "Marked jobs interrupted by the previous run as failed");
    }

    let orchestrator = build_orchestrator(&settings)?;
    info!(orchestrator = orchestrator.name(), "AI orchestrator ready");

    let addr = settings.bind_address();
    let state = AppState::new(pool.clone(), settings, orchestrator);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingSettings) -> Result<()> {
    let level = &logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "contentflow_api={level},contentflow_common={level},tower_http={level}"
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.context("Failed to initialize logging")
}

fn build_orchestrator(settings: &Settings) -> Result<Arc<dyn AiOrchestrator>> {
    match &settings.orchestrator.base_url {
        Some(base_url) => {
            let client = HttpOrchestrator::new(
                base_url,
                settings.orchestrator.api_key.clone(),
                Duration::from_secs(settings.processing.task_timeout_seconds),
            )?;
            Ok(Arc::new(client))
        }
        None => {
            warn!("No orchestrator.base_url configured; every job will fail until one is set");
            Ok(Arc::new(UnconfiguredOrchestrator))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
