use crate::error::{Result, SherpaError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket server configuration
    pub server: ServerConfig,
    /// Dispatcher sizing and delivery policy
    pub dispatch: DispatchConfig,
    /// Upstream node connection
    pub upstream: UpstreamConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the server (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Directory holding the UI assets
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of recent events kept for `/notifications`
    pub history_capacity: usize,
    /// Bound of the dispatcher intake queue
    pub intake_capacity: usize,
    /// Bound of each subscriber's outbound queue
    pub subscriber_buffer: usize,
    /// Upper bound on a single socket write
    pub delivery_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            history_capacity: 8,
            intake_capacity: 256,
            subscriber_buffer: 256,
            delivery_timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Websocket endpoint of the node (ws:// or wss://)
    pub url: Url,
    /// Basic auth user
    pub user: String,
    /// Basic auth password
    pub password: String,
    /// PEM certificate to trust for wss connections
    pub cert_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server: ServerConfig {
                port: get_env_or("SHERPA_PORT", "3000").parse().map_err(|_| {
                    SherpaError::InvalidConfig("SHERPA_PORT must be a valid port number".into())
                })?,
                host: get_env_or("SHERPA_HOST", "0.0.0.0"),
                static_dir: PathBuf::from(get_env_or("STATIC_DIR", "static")),
            },
            dispatch: DispatchConfig {
                history_capacity: parse_positive("HISTORY_CAPACITY", "8")?,
                intake_capacity: parse_positive("INTAKE_CAPACITY", "256")?,
                subscriber_buffer: parse_positive("SUBSCRIBER_BUFFER", "256")?,
                delivery_timeout: Duration::from_millis(
                    parse_positive("DELIVERY_TIMEOUT_MS", "5000")? as u64,
                ),
            },
            upstream: UpstreamConfig {
                url: parse_upstream_url()?,
                user: get_env_or("UPSTREAM_USER", ""),
                password: get_env_or("UPSTREAM_PASS", ""),
                cert_path: env::var("UPSTREAM_CERT")
                    .ok()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_upstream_url() -> Result<Url> {
    let raw = get_env_or("UPSTREAM_URL", "wss://localhost:8334/ws");
    let url = Url::parse(raw.trim()).map_err(|e| {
        SherpaError::InvalidConfig(format!("UPSTREAM_URL must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(SherpaError::InvalidConfig(format!(
                "UPSTREAM_URL has unsupported scheme: {}",
                other
            )))
        }
    }

    if url.host_str().is_none() {
        return Err(SherpaError::InvalidConfig(
            "UPSTREAM_URL must include a host".into(),
        ));
    }

    Ok(url)
}

fn parse_positive(key: &str, default: &str) -> Result<usize> {
    match get_env_or(key, default).parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SherpaError::InvalidConfig(format!(
            "{} must be a positive number",
            key
        ))),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
