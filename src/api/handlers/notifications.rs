//! Recent-history endpoint

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::api::server::AppState;
use crate::models::EventRecord;

/// `GET /notifications`: cached events, oldest first.
///
/// 200 with a JSON array, 404 with an empty body when nothing is cached,
/// 500 with an empty body when encoding fails.
pub async fn list_notifications(State(state): State<AppState>) -> Response {
    match state.dispatch.history().await {
        Ok(records) => notifications_response(&records),
        Err(e) => e.into_response(),
    }
}

fn notifications_response(records: &[EventRecord]) -> Response {
    let body = match serde_json::to_string_pretty(records) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize notifications: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if records.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    ([(CONTENT_TYPE, "application/json")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::config::DispatchConfig;
    use crate::dispatch::{DispatchHandle, Dispatcher};
    use crate::models::FinalizationPayload;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::path::Path;
    use tower::ServiceExt;

    fn start_dispatcher(capacity: usize) -> DispatchHandle {
        let config = DispatchConfig {
            history_capacity: capacity,
            ..DispatchConfig::default()
        };
        let (dispatcher, handle) = Dispatcher::new(&config).unwrap();
        tokio::spawn(dispatcher.run());
        handle
    }

    async fn get_notifications(handle: DispatchHandle) -> (StatusCode, Vec<u8>) {
        let state = AppState::new(handle, &DispatchConfig::default());
        let app = create_router(state, Path::new("static"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/notifications")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_empty_history_is_404_with_empty_body() {
        let (status, body) = get_notifications(start_dispatcher(8)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_oldest_first() {
        let handle = start_dispatcher(8);
        for i in 1..=10 {
            handle
                .publish(FinalizationPayload {
                    vertex_hash: format!("e{}", i),
                    vertex_type: "tx".to_string(),
                    finalization_time: "1s".to_string(),
                })
                .await
                .unwrap();
        }

        let (status, body) = get_notifications(handle).await;
        assert_eq!(status, StatusCode::OK);

        let records: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        let hashes: Vec<_> = records
            .iter()
            .map(|r| r["vertex_hash"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            hashes,
            vec!["e3", "e4", "e5", "e6", "e7", "e8", "e9", "e10"]
        );
        assert_eq!(records[0]["vertex_type"], "tx");
        assert_eq!(records[0]["finalization_time"], "1s");
        assert!(records[0].get("sequence").is_none());
    }

    #[tokio::test]
    async fn test_stopped_dispatcher_is_unavailable() {
        let handle = start_dispatcher(8);
        handle.shutdown().await.unwrap().await.unwrap();

        let (status, _) = get_notifications(handle).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
