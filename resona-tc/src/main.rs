//! resona-tc - Main entry point
//!
//! Transcoder and streaming-artifact service: accepts transcode requests,
//! serves HLS/DASH artifacts, and runs the retention cleanup schedule.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resona_tc::api;
use resona_tc::cleanup;
use resona_tc::config::Config;
use resona_tc::encoder::FfmpegEncoder;
use resona_tc::pipeline::TranscodePipeline;

/// Command-line arguments for resona-tc
#[derive(Parser, Debug)]
#[command(name = "resona-tc")]
#[command(about = "Transcoder and streaming service for Resona")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "RESONA_TC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long, env = "RESONA_TC_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resona_tc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .await
            .context("Failed to load configuration")?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("Starting Resona transcoder on port {}", config.port);
    info!("HLS root: {}", config.hls_root.display());
    info!("DASH root: {}", config.dash_root.display());

    tokio::fs::create_dir_all(&config.hls_root)
        .await
        .context("Failed to create HLS root")?;
    tokio::fs::create_dir_all(&config.dash_root)
        .await
        .context("Failed to create DASH root")?;

    let config = Arc::new(config);
    let encoder = Arc::new(FfmpegEncoder::new(config.ffmpeg_binary.clone()));
    let pipeline = Arc::new(TranscodePipeline::new(encoder, Arc::clone(&config)));

    spawn_cleanup_schedule(Arc::clone(&config));

    let app = api::create_router(api::AppContext {
        config: Arc::clone(&config),
        pipeline,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodic retention sweep over both protocol roots
fn spawn_cleanup_schedule(config: Arc<Config>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.cleanup_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            for root in [&config.hls_root, &config.dash_root] {
                match cleanup::sweep_root(root.clone(), config.retention_window()).await {
                    Ok(stats) if stats.files_removed > 0 || stats.dirs_removed > 0 => {
                        info!(
                            root = %root.display(),
                            files = stats.files_removed,
                            dirs = stats.dirs_removed,
                            "cleanup sweep removed expired artifacts"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(root = %root.display(), error = %e, "cleanup sweep failed"),
                }
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
