//! In-process event source fed through an mpsc channel

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use super::EventSource;
use crate::dispatch::DispatchHandle;
use crate::error::{Result, SherpaError};
use crate::models::FinalizationPayload;

/// Forwards payloads sent on a channel. Can be started once.
pub struct ChannelEventSource {
    rx: Mutex<Option<mpsc::Receiver<FinalizationPayload>>>,
}

impl ChannelEventSource {
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<FinalizationPayload>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn start(&self, sink: DispatchHandle) -> Result<JoinHandle<()>> {
        let mut rx = self.rx.lock().await.take().ok_or_else(|| {
            SherpaError::UpstreamConnect("channel source already started".into())
        })?;

        Ok(tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if sink.publish(payload).await.is_err() {
                    debug!("Dispatcher closed, stopping channel source");
                    break;
                }
            }
        }))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
