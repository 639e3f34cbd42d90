//! JSON-RPC websocket client for the upstream node
//!
//! After the handshake the client sends one `notifyavalanche` request and
//! waits for its reply. From then on every `avafinalization` notification
//! is turned into a `NewEvent`. Notification params carry one object:
//! `{"vertexhash": "...", "vertextype": "...", "latency": <nanoseconds>}`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures::{SinkExt, Stream, StreamExt};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, error, info, instrument, warn};

use super::EventSource;
use crate::config::UpstreamConfig;
use crate::dispatch::DispatchHandle;
use crate::error::{Result, SherpaError};
use crate::models::FinalizationPayload;

const SUBSCRIBE_METHOD: &str = "notifyavalanche";
const FINALIZATION_METHOD: &str = "avafinalization";
const SUBSCRIBE_ID: u64 = 1;
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One parsed upstream text frame
#[derive(Debug, PartialEq)]
enum Inbound {
    Reply { id: Option<u64>, error: Option<String> },
    Finalization(FinalizationPayload),
    Other,
}

#[derive(Debug, Deserialize)]
struct RpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct FinalizationParams {
    #[serde(rename = "vertexhash")]
    vertex_hash: String,
    #[serde(rename = "vertextype")]
    vertex_type: String,
    latency: u64,
}

fn classify(text: &str) -> Result<Inbound> {
    let msg: RpcMessage = serde_json::from_str(text)?;

    match msg.method.as_deref() {
        Some(FINALIZATION_METHOD) => {
            let raw = msg.params.into_iter().next().ok_or_else(|| {
                SherpaError::UpstreamProtocol("finalization without params".into())
            })?;
            let params: FinalizationParams = serde_json::from_value(raw)?;
            Ok(Inbound::Finalization(FinalizationPayload::new(
                params.vertex_hash,
                params.vertex_type,
                Duration::from_nanos(params.latency),
            )))
        }
        Some(_) => Ok(Inbound::Other),
        None => Ok(Inbound::Reply {
            id: msg.id.as_ref().and_then(Value::as_u64),
            error: msg
                .error
                .map(|e| format!("{} (code {})", e.message, e.code)),
        }),
    }
}

/// Event source backed by the upstream node's websocket RPC
pub struct RpcEventSource {
    config: UpstreamConfig,
}

impl RpcEventSource {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    fn request(&self) -> Result<Request> {
        let mut request = self.config.url.as_str().into_client_request()?;

        if !self.config.user.is_empty() {
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", self.config.user, self.config.password));
            let value = HeaderValue::from_str(&format!("Basic {}", token)).map_err(|e| {
                SherpaError::InvalidConfig(format!("invalid upstream credentials: {}", e))
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(request)
    }

    fn connector(&self) -> Result<Option<Connector>> {
        let trusted = match &self.config.cert_path {
            Some(path) => Some(load_certificates(path)?),
            None => None,
        };

        if self.config.url.scheme() != "wss" {
            return Ok(None);
        }

        let mut roots = RootCertStore::empty();
        match trusted {
            Some(certs) => {
                for cert in certs {
                    roots
                        .add(cert)
                        .map_err(|e| SherpaError::Certificate(e.to_string()))?;
                }
            }
            None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| SherpaError::Certificate(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Some(Connector::Rustls(Arc::new(config))))
    }
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path)
        .map_err(|e| SherpaError::Certificate(format!("{}: {}", path.display(), e)))?;

    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SherpaError::Certificate(format!("{}: {:?}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(SherpaError::Certificate(format!(
            "{}: no certificates found",
            path.display()
        )));
    }

    Ok(certs)
}

#[async_trait]
impl EventSource for RpcEventSource {
    #[instrument(skip(self, sink), fields(url = %self.config.url))]
    async fn start(&self, sink: DispatchHandle) -> Result<JoinHandle<()>> {
        let connector = self.connector()?;
        let request = self.request()?;

        let (ws, _) = connect_async_tls_with_config(request, None, false, connector).await?;
        let (mut write, mut read) = ws.split();

        let subscribe = json!({
            "jsonrpc": "1.0",
            "id": SUBSCRIBE_ID,
            "method": SUBSCRIBE_METHOD,
            "params": [],
        });
        write.send(Message::text(subscribe.to_string())).await?;

        timeout(SUBSCRIBE_TIMEOUT, await_subscription(&mut read))
            .await
            .map_err(|_| SherpaError::UpstreamConnect("subscription timed out".into()))??;

        info!("Subscribed to upstream finalization notifications");

        Ok(tokio::spawn(async move {
            // The write half must outlive the reader or the socket closes.
            let _write = write;
            forward_notifications(read, sink).await;
        }))
    }

    fn name(&self) -> &'static str {
        "rpc"
    }
}

async fn await_subscription<S>(read: &mut S) -> Result<()>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => match classify(text.as_str())? {
                Inbound::Reply {
                    id: Some(SUBSCRIBE_ID),
                    error,
                } => {
                    return match error {
                        None => Ok(()),
                        Some(e) => Err(SherpaError::UpstreamProtocol(format!(
                            "{} rejected: {}",
                            SUBSCRIBE_METHOD, e
                        ))),
                    };
                }
                other => debug!("Ignoring message before subscription reply: {:?}", other),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    Err(SherpaError::UpstreamConnect(
        "connection closed before subscription was confirmed".into(),
    ))
}

#[instrument(skip_all)]
async fn forward_notifications<S>(mut read: S, sink: DispatchHandle)
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match classify(text.as_str()) {
                Ok(Inbound::Finalization(payload)) => {
                    if sink.publish(payload).await.is_err() {
                        debug!("Dispatcher closed, stopping upstream reader");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring malformed upstream message: {}", e),
            },
            Ok(Message::Close(frame)) => {
                warn!("Upstream closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Upstream connection error: {}", e);
                break;
            }
        }
    }

    info!("Upstream reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::Dispatcher;
    use tokio::net::TcpListener;
    use url::Url;

    fn upstream_config(url: &str) -> UpstreamConfig {
        UpstreamConfig {
            url: Url::parse(url).unwrap(),
            user: "alice".to_string(),
            password: "letmein".to_string(),
            cert_path: None,
        }
    }

    #[test]
    fn test_classify_finalization() {
        let text = r#"{"jsonrpc":"1.0","method":"avafinalization","params":[{"vertexhash":"00ab","vertextype":"tx","latency":1500000000}]}"#;
        assert_eq!(
            classify(text).unwrap(),
            Inbound::Finalization(FinalizationPayload {
                vertex_hash: "00ab".to_string(),
                vertex_type: "tx".to_string(),
                finalization_time: "1.5s".to_string(),
            })
        );
    }

    #[test]
    fn test_classify_replies_and_other_methods() {
        assert_eq!(
            classify(r#"{"result":null,"error":null,"id":1}"#).unwrap(),
            Inbound::Reply {
                id: Some(1),
                error: None
            }
        );
        assert_eq!(
            classify(r#"{"result":null,"error":{"code":-32601,"message":"nope"},"id":1}"#)
                .unwrap(),
            Inbound::Reply {
                id: Some(1),
                error: Some("nope (code -32601)".to_string())
            }
        );
        assert_eq!(
            classify(r#"{"method":"blockconnected","params":[]}"#).unwrap(),
            Inbound::Other
        );
        assert!(classify(r#"{"method":"avafinalization","params":[]}"#).is_err());
        assert!(classify("not json").is_err());
    }

    #[test]
    fn test_request_carries_basic_auth() {
        let source = RpcEventSource::new(upstream_config("ws://localhost:8334/ws"));
        let request = source.request().unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Basic YWxpY2U6bGV0bWVpbg=="
        );
    }

    #[tokio::test]
    async fn test_missing_certificate_fails_startup() {
        let mut config = upstream_config("wss://localhost:8334/ws");
        config.cert_path = Some("/nonexistent/rpc.cert".into());
        let source = RpcEventSource::new(config);

        let (_dispatcher, handle) = Dispatcher::new(&DispatchConfig::default()).unwrap();
        assert!(matches!(
            source.start(handle).await,
            Err(SherpaError::Certificate(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_fails_startup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = RpcEventSource::new(upstream_config(&format!("ws://{}/ws", addr)));
        let (_dispatcher, handle) = Dispatcher::new(&DispatchConfig::default()).unwrap();
        assert!(matches!(
            source.start(handle).await,
            Err(SherpaError::UpstreamConnect(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribes_and_forwards_notifications() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let node = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let request = ws.next().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(request.to_text().unwrap()).unwrap();
            assert_eq!(request["method"], "notifyavalanche");

            ws.send(Message::text(r#"{"result":null,"error":null,"id":1}"#))
                .await
                .unwrap();
            ws.send(Message::text(
                r#"{"method":"avafinalization","params":[{"vertexhash":"v1","vertextype":"tx","latency":250000000}]}"#,
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        });

        let (dispatcher, handle) = Dispatcher::new(&DispatchConfig::default()).unwrap();
        let dispatcher_task = tokio::spawn(dispatcher.run());

        let source = RpcEventSource::new(upstream_config(&format!("ws://{}/ws", addr)));
        let reader = source.start(handle.clone()).await.unwrap();
        reader.await.unwrap();
        node.await.unwrap();

        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payload().vertex_hash, "v1");
        assert_eq!(history[0].payload().finalization_time, "250ms");

        drop(handle);
        dispatcher_task.await.unwrap();
    }
}
