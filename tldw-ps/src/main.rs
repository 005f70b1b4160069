//! tldw-ps - Media summarization pipeline service
//!
//! Turns a YouTube URL or an uploaded media file into a transcript or a
//! bounded-length summary, reporting progress over SSE.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tldw_ps::config::{Args, ServiceConfig};
use tldw_ps::services::DefaultPipelineFactory;
use tldw_ps::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tldw_ps=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    info!("Starting tldw-ps (pipeline service)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration: CLI/ENV → TOML → defaults
    let toml_config = tldw_common::config::load_service_config(args.config.as_deref(), "tldw-ps")
        .context("Failed to load config file")?;
    let config = ServiceConfig::resolve(&args, &toml_config).context("Invalid configuration")?;

    info!("Work dir: {}", config.work_dir.display());
    info!("Uploads dir: {}", config.uploads_dir.display());
    info!(
        "Admission: {} concurrent jobs, {}s request timeout",
        config.max_concurrent_jobs,
        config.request_timeout.as_secs()
    );

    tokio::fs::create_dir_all(&config.uploads_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.uploads_dir.display()))?;

    let factory = DefaultPipelineFactory::from_config(&config)
        .context("Failed to initialize pipeline collaborators")?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;

    let state = AppState::new(config, Arc::new(factory));

    // Safety net for admission entries whose release never fired
    let sweeper = Arc::clone(&state.queue).spawn_sweeper();

    let app = tldw_ps::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
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
