//! HTTP and WebSocket surface
//!
//! Serves live subscriptions, the recent-history endpoint and the UI assets.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{ApiServer, AppState};
