//! API server using Axum

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::{DispatchConfig, ServerConfig};
use crate::dispatch::DispatchHandle;
use crate::error::{Result, SherpaError};

use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatch: DispatchHandle,
    pub subscriber_buffer: usize,
    pub delivery_timeout: Duration,
}

impl AppState {
    pub fn new(dispatch: DispatchHandle, config: &DispatchConfig) -> Self {
        Self {
            dispatch,
            subscriber_buffer: config.subscriber_buffer,
            delivery_timeout: config.delivery_timeout,
        }
    }
}

/// API server
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone(), &self.config.static_dir)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                SherpaError::InvalidConfig(format!(
                    "invalid server address {}:{}",
                    self.config.host, self.config.port
                ))
            })?;

        let listener = TcpListener::bind(addr).await?;
        info!("API server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Serve on an already bound listener until `shutdown` flips to true
    #[instrument(skip_all)]
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let router = self.build_router();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| SherpaError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
