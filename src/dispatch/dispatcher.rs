//! Serialized coordinator for subscribers and history
//!
//! The dispatcher task is the only owner of the history cache and the
//! connection registry. Everything else talks to it through a bounded
//! mpsc intake; producers wait when the intake is full. Each message is
//! processed to completion before the next one is received, and
//! processing never awaits subscriber I/O.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

use super::cache::HistoryCache;
use super::registry::{ConnectionId, ConnectionRegistry, Frame, SubscriberHandle};
use crate::config::DispatchConfig;
use crate::error::{Result, SherpaError};
use crate::models::{EventRecord, FinalizationPayload};

/// Messages accepted by the dispatcher
#[derive(Debug)]
pub enum Command {
    ConnectionJoined(SubscriberHandle),
    ConnectionLeft(ConnectionId),
    NewEvent(FinalizationPayload),
    /// Read the history; answered in any state before `Stopped`
    Snapshot(oneshot::Sender<Vec<EventRecord>>),
    /// Number of registered subscribers
    SubscriberCount(oneshot::Sender<usize>),
    /// Stop accepting joins and events; the sender is told once stopped
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    Draining,
    Stopped,
}

/// Turns a record into the text frame sent to subscribers
pub trait EventEncoder: Send + 'static {
    fn encode(&self, record: &EventRecord) -> Result<String>;
}

/// JSON text frames carrying the record's payload fields
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl EventEncoder for JsonEncoder {
    fn encode(&self, record: &EventRecord) -> Result<String> {
        Ok(serde_json::to_string(record)?)
    }
}

/// Producer side of the dispatcher intake
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Command>,
}

impl DispatchHandle {
    pub async fn join(&self, handle: SubscriberHandle) -> Result<()> {
        self.send(Command::ConnectionJoined(handle)).await
    }

    pub async fn leave(&self, id: ConnectionId) -> Result<()> {
        self.send(Command::ConnectionLeft(id)).await
    }

    pub async fn publish(&self, payload: FinalizationPayload) -> Result<()> {
        self.send(Command::NewEvent(payload)).await
    }

    /// Current history, oldest first
    pub async fn history(&self) -> Result<Vec<EventRecord>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| SherpaError::DispatcherClosed)
    }

    pub async fn subscriber_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SubscriberCount(tx)).await?;
        rx.await.map_err(|_| SherpaError::DispatcherClosed)
    }

    /// Request shutdown; the returned receiver resolves once the loop has stopped
    pub async fn shutdown(&self) -> Result<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx)).await?;
        Ok(rx)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| SherpaError::DispatcherClosed)
    }
}

/// The dispatcher loop and the state it owns
pub struct Dispatcher<E = JsonEncoder> {
    intake: mpsc::Receiver<Command>,
    cache: HistoryCache,
    registry: ConnectionRegistry,
    encoder: E,
    errors: Option<mpsc::Sender<SherpaError>>,
    state: DispatcherState,
    shutdown_acks: Vec<oneshot::Sender<()>>,
}

impl Dispatcher<JsonEncoder> {
    /// Create a dispatcher in the `Running` state plus the handle producers use.
    ///
    /// Every sizing knob in `config` must be positive, including the ones only
    /// the subscriber side uses, so a bad config fails here and not per connection.
    pub fn new(config: &DispatchConfig) -> Result<(Self, DispatchHandle)> {
        if config.intake_capacity == 0 {
            return Err(SherpaError::InvalidConfig(
                "intake capacity must be positive".into(),
            ));
        }
        if config.subscriber_buffer == 0 {
            return Err(SherpaError::InvalidConfig(
                "subscriber buffer must be positive".into(),
            ));
        }
        if config.delivery_timeout.is_zero() {
            return Err(SherpaError::InvalidConfig(
                "delivery timeout must be positive".into(),
            ));
        }

        let cache = HistoryCache::new(config.history_capacity)?;
        let (tx, rx) = mpsc::channel(config.intake_capacity);

        let dispatcher = Self {
            intake: rx,
            cache,
            registry: ConnectionRegistry::new(),
            encoder: JsonEncoder,
            errors: None,
            state: DispatcherState::Running,
            shutdown_acks: Vec::new(),
        };

        Ok((dispatcher, DispatchHandle { tx }))
    }
}

impl<E: EventEncoder> Dispatcher<E> {
    /// Replace the frame encoder
    pub fn with_encoder<E2: EventEncoder>(self, encoder: E2) -> Dispatcher<E2> {
        Dispatcher {
            intake: self.intake,
            cache: self.cache,
            registry: self.registry,
            encoder,
            errors: self.errors,
            state: self.state,
            shutdown_acks: self.shutdown_acks,
        }
    }

    /// Publish in-loop errors on this channel in addition to logging them
    pub fn with_error_reporter(mut self, errors: mpsc::Sender<SherpaError>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    /// Run until shut down or until every producer handle is gone
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!("Dispatcher running");

        while let Some(command) = self.intake.recv().await {
            self.process(command);
        }

        self.state = DispatcherState::Stopped;
        info!(
            subscribers = self.registry.len(),
            history = self.cache.len(),
            "Dispatcher stopped"
        );

        for ack in self.shutdown_acks.drain(..) {
            let _ = ack.send(());
        }
    }

    /// Apply one message to the owned state
    pub fn process(&mut self, command: Command) {
        match command {
            Command::ConnectionJoined(handle) => {
                if self.state == DispatcherState::Running {
                    debug!(connection = %handle.id(), "Subscriber joined");
                    self.registry.add(handle);
                } else {
                    debug!(connection = %handle.id(), "Dropping join while draining");
                }
            }
            Command::ConnectionLeft(id) => {
                if self.registry.remove(&id) {
                    debug!(connection = %id, "Subscriber left");
                }
            }
            Command::NewEvent(payload) => {
                if self.state == DispatcherState::Running {
                    self.broadcast(payload);
                } else {
                    warn!(vertex = %payload.vertex_hash, "Dropping event while draining");
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.cache.snapshot());
            }
            Command::SubscriberCount(reply) => {
                let _ = reply.send(self.registry.len());
            }
            Command::Shutdown(ack) => {
                if self.state == DispatcherState::Running {
                    info!("Dispatcher draining");
                    self.state = DispatcherState::Draining;
                    self.intake.close();
                }
                self.shutdown_acks.push(ack);
            }
        }
    }

    fn broadcast(&mut self, payload: FinalizationPayload) {
        let record = self.cache.insert(payload);

        let frame: Frame = match self.encoder.encode(&record) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                self.report(e);
                return;
            }
        };

        let mut failed = Vec::new();
        self.registry.for_each(|handle| {
            if let Err(e) = handle.deliver(frame.clone()) {
                warn!("{}", e);
                failed.push(handle.id());
            }
        });

        for id in &failed {
            self.registry.remove(id);
        }

        debug!(
            sequence = record.sequence(),
            delivered = self.registry.len(),
            dropped = failed.len(),
            "Broadcast event"
        );
    }

    fn report(&self, err: SherpaError) {
        error!("Dispatcher error: {}", err);
        if let Some(errors) = &self.errors {
            if errors.try_send(err).is_err() {
                debug!("Error channel full or closed, dropping report");
            }
        }
    }
}
