//! Relay lifecycle: dispatcher, upstream source and HTTP server together

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::dispatch::{Dispatcher, ShutdownCoordinator};
use crate::error::{Result, SherpaError};
use crate::upstream::EventSource;

/// Buffered in-loop error reports before new ones are dropped
const ERROR_BUFFER: usize = 64;

/// A running relay
pub struct Sherpa {
    port: u16,
    errors: Option<mpsc::Receiver<SherpaError>>,
    coordinator: ShutdownCoordinator,
    upstream_task: JoinHandle<()>,
    http_shutdown: watch::Sender<bool>,
    http_task: JoinHandle<Result<()>>,
}

impl Sherpa {
    /// Start the dispatcher, connect the upstream source and begin serving.
    ///
    /// Fails if the upstream cannot be reached or the listener cannot be bound.
    #[instrument(skip_all, fields(source = source.name()))]
    pub async fn start(config: &Config, source: &dyn EventSource) -> Result<Self> {
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_BUFFER);
        let (dispatcher, dispatch) = Dispatcher::new(&config.dispatch)?;
        let dispatcher_task = tokio::spawn(dispatcher.with_error_reporter(errors_tx).run());
        let coordinator = ShutdownCoordinator::new(dispatch.clone(), dispatcher_task);

        let upstream_task = match source.start(dispatch.clone()).await {
            Ok(task) => task,
            Err(e) => {
                coordinator.stop().await?;
                return Err(e);
            }
        };
        info!("Upstream event source connected");

        let server = ApiServer::new(
            config.server.clone(),
            AppState::new(dispatch, &config.dispatch),
        );
        let (listener, port) = match bind(&server).await {
            Ok(bound) => bound,
            Err(e) => {
                upstream_task.abort();
                coordinator.stop().await?;
                return Err(e);
            }
        };

        let (http_shutdown, shutdown_rx) = watch::channel(false);
        let http_task = tokio::spawn(server.serve(listener, shutdown_rx));

        Ok(Self {
            port,
            errors: Some(errors_rx),
            coordinator,
            upstream_task,
            http_shutdown,
            http_task,
        })
    }

    /// Port the HTTP server is bound to
    pub fn port(&self) -> u16 {
        self.port
    }

    /// In-loop errors reported by the dispatcher. Can be taken once.
    pub fn errors(&mut self) -> Option<mpsc::Receiver<SherpaError>> {
        self.errors.take()
    }

    /// Drain the dispatcher, then stop the upstream reader and the HTTP server
    #[instrument(skip_all)]
    pub async fn stop(self) -> Result<()> {
        self.coordinator.stop().await?;
        self.upstream_task.abort();

        let _ = self.http_shutdown.send(true);
        self.http_task
            .await
            .map_err(|e| SherpaError::Internal(format!("server task failed: {}", e)))??;

        info!("Relay stopped");
        Ok(())
    }
}

async fn bind(server: &ApiServer) -> Result<(tokio::net::TcpListener, u16)> {
    let listener = server.bind().await?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchConfig, LogConfig, ServerConfig, UpstreamConfig};
    use crate::dispatch::DispatchHandle;
    use crate::models::FinalizationPayload;
    use crate::upstream::ChannelEventSource;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
                static_dir: "static".into(),
            },
            dispatch: DispatchConfig::default(),
            upstream: UpstreamConfig {
                url: url::Url::parse("ws://localhost:8334/ws").unwrap(),
                user: String::new(),
                password: String::new(),
                cert_path: None,
            },
            log: LogConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    struct UnreachableSource;

    #[async_trait]
    impl EventSource for UnreachableSource {
        async fn start(&self, _sink: DispatchHandle) -> Result<JoinHandle<()>> {
            Err(SherpaError::UpstreamConnect("connection refused".into()))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts_start() {
        let result = Sherpa::start(&test_config(), &UnreachableSource).await;
        assert!(matches!(result, Err(SherpaError::UpstreamConnect(_))));
    }

    #[tokio::test]
    async fn test_zero_subscriber_buffer_fails_start() {
        let (source, _events) = ChannelEventSource::new(8);
        let mut config = test_config();
        config.dispatch.subscriber_buffer = 0;

        let result = Sherpa::start(&config, &source).await;
        assert!(matches!(result, Err(SherpaError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_until_stop() {
        let (source, events) = ChannelEventSource::new(8);
        let mut sherpa = Sherpa::start(&test_config(), &source).await.unwrap();
        assert!(sherpa.errors().is_some());
        assert!(sherpa.errors().is_none());

        let url = format!("ws://localhost:{}/ws", sherpa.port());
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        // The join is processed asynchronously; keep publishing until one arrives.
        let frame = timeout(Duration::from_secs(5), async {
            loop {
                events
                    .send(FinalizationPayload {
                        vertex_hash: "live".to_string(),
                        vertex_type: "tx".to_string(),
                        finalization_time: "1s".to_string(),
                    })
                    .await
                    .unwrap();
                if let Ok(Some(Ok(Message::Text(text)))) =
                    timeout(Duration::from_millis(100), client.next()).await
                {
                    return text.to_string();
                }
            }
        })
        .await
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["vertex_hash"], "live");

        sherpa.stop().await.unwrap();

        // Stopping closes subscriber connections.
        let closed = timeout(Duration::from_secs(5), async {
            while let Some(msg) = client.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }
}
