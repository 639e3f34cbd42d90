//! Live subscriber connections

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Result, SherpaError};

/// A serialized event, shared by every subscriber of one broadcast
pub type Frame = Arc<str>;

/// Identity of one subscriber connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write side of one subscriber connection.
///
/// Frames go into a bounded queue drained by the connection's writer task,
/// so delivering never waits on the socket.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
}

impl SubscriberHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Frame>) -> Self {
        Self { id, tx }
    }

    /// Create a handle together with the receiving end of its queue
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(ConnectionId::new(), tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting. A full or closed queue is a failed delivery.
    pub fn deliver(&self, frame: Frame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "outbound buffer full",
                mpsc::error::TrySendError::Closed(_) => "connection closed",
            };
            SherpaError::Delivery {
                connection: self.id.to_string(),
                reason: reason.to_string(),
            }
        })
    }
}

/// Set of live subscribers, unique by connection id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    live: HashMap<ConnectionId, SubscriberHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle. Adding an id that is already present is a no-op.
    pub fn add(&mut self, handle: SubscriberHandle) {
        self.live.entry(handle.id()).or_insert(handle);
    }

    /// Drop a handle. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        self.live.remove(id).is_some()
    }

    /// Visit every live handle, in no particular order
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&SubscriberHandle),
    {
        for handle in self.live.values() {
            f(handle);
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.live.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
