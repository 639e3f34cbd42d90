//! Sherpa - Finalization Event Relay
//!
//! Relays finalization events from an upstream node to live WebSocket
//! subscribers and keeps a short history for polling clients.
//!
//! ## Features
//!
//! - Single dispatcher task owning subscriber and history state
//! - Bounded, non-blocking fan-out so a slow subscriber cannot stall others
//! - `GET /notifications` history endpoint and `/ws` live stream
//! - JSON-RPC websocket client for the upstream node

pub mod api;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod upstream;

pub use app::Sherpa;
pub use config::Config;
pub use error::{Result, SherpaError};
