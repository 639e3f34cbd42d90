//! Localhost-only origin policy for subscriber upgrades

use axum::extract::Request;
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::SherpaError;

const ALLOWED_HOST: &str = "localhost";

/// True when the request's `Host` names `localhost`, on any port.
///
/// The `Origin` header is not consulted.
pub fn is_local_origin(headers: &HeaderMap) -> bool {
    headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(':').next())
        .map(|h| h == ALLOWED_HOST)
        .unwrap_or(false)
}

/// Reject requests whose origin is not `localhost` with 403
pub async fn require_local_origin(req: Request, next: Next) -> Response {
    if is_local_origin(req.headers()) {
        return next.run(req).await;
    }

    let origin = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<none>")
        .to_string();
    debug!("Rejecting subscriber from origin {}", origin);
    SherpaError::OriginRejected(origin).into_response()
}
