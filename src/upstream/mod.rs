//! Upstream event sources
//!
//! A source connects to whatever produces finalization events and forwards
//! each one to the dispatcher as a `NewEvent`.

pub mod channel;
pub mod rpc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::dispatch::DispatchHandle;
use crate::error::Result;

pub use channel::ChannelEventSource;
pub use rpc::RpcEventSource;

/// Producer of finalization events
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Establish the upstream connection and start forwarding into `sink`.
    ///
    /// An error means nothing was connected and startup should abort.
    async fn start(&self, sink: DispatchHandle) -> Result<JoinHandle<()>>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}
