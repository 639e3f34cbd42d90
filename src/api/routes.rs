//! API route definitions

use std::path::Path;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;

use super::handlers;
use super::middleware::require_local_origin;
use super::server::AppState;
use super::websocket;

/// Create the router with all routes; anything unmatched is served from `static_dir`
pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/ws",
            get(websocket::subscriber::subscriber_ws)
                .layer(middleware::from_fn(require_local_origin)),
        )
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}
