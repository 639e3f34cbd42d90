//! Sherpa Relay - Entry Point
//!
//! Connects to the upstream node, serves subscribers and shuts down on signal.

use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sherpa::config::LogConfig;
use sherpa::upstream::RpcEventSource;
use sherpa::{Config, Sherpa};

#[tokio::main]
async fn main() -> sherpa::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config.log);
    info!("Starting Sherpa relay");

    let source = RpcEventSource::new(config.upstream.clone());
    let sherpa = Sherpa::start(&config, &source).await?;

    info!("Listening on port {}...", sherpa.port());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    sherpa.stop().await?;

    info!("Stopped gracefully");
    Ok(())
}

/// Initialize tracing from `RUST_LOG`, falling back to the configured level
fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sherpa={},tower_http=info", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
