//! Event dispatch and history
//!
//! A single dispatcher task owns the recent-event cache and the set of live
//! subscribers; connections and the upstream source only send it messages.

pub mod cache;
pub mod dispatcher;
pub mod registry;
pub mod shutdown;

pub use cache::HistoryCache;
pub use dispatcher::{
    Command, DispatchHandle, Dispatcher, DispatcherState, EventEncoder, JsonEncoder,
};
pub use registry::{ConnectionId, ConnectionRegistry, Frame, SubscriberHandle};
pub use shutdown::ShutdownCoordinator;
