use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Sherpa relay
#[derive(Error, Debug)]
pub enum SherpaError {
    // Dispatch errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery to connection {connection} failed: {reason}")]
    Delivery { connection: String, reason: String },

    #[error("Dispatcher is not running")]
    DispatcherClosed,

    // Upstream errors
    #[error("Upstream connection failed: {0}")]
    UpstreamConnect(String),

    #[error("Upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("Upstream certificate error: {0}")]
    Certificate(String),

    // Subscriber errors
    #[error("Origin not allowed: {0}")]
    OriginRejected(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Sherpa operations
pub type Result<T> = std::result::Result<T, SherpaError>;

impl SherpaError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            SherpaError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            SherpaError::OriginRejected(_) => StatusCode::FORBIDDEN,

            // 502 Bad Gateway
            SherpaError::UpstreamConnect(_)
            | SherpaError::UpstreamProtocol(_)
            | SherpaError::Certificate(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            SherpaError::DispatcherClosed => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            SherpaError::Serialization(_)
            | SherpaError::Delivery { .. }
            | SherpaError::Io(_)
            | SherpaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for SherpaError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from websocket client errors
impl From<tokio_tungstenite::tungstenite::Error> for SherpaError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SherpaError::UpstreamConnect(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for SherpaError {
    fn from(err: url::ParseError) -> Self {
        SherpaError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            SherpaError::InvalidConfig("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SherpaError::OriginRejected("example.com".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            SherpaError::UpstreamConnect("refused".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            SherpaError::DispatcherClosed.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            SherpaError::Delivery {
                connection: "c1".to_string(),
                reason: "closed".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_client_server_helpers() {
        assert!(SherpaError::OriginRejected("x".to_string()).is_client_error());
        assert!(!SherpaError::OriginRejected("x".to_string()).is_server_error());

        assert!(SherpaError::DispatcherClosed.is_server_error());
        assert!(!SherpaError::DispatcherClosed.is_client_error());
    }

    #[test]
    fn test_url_error_is_config_error() {
        let err: SherpaError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, SherpaError::InvalidConfig(_)));
    }
}
