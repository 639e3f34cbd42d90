//! WebSocket handlers
//!
//! Each subscriber gets its own bounded outbound queue; the dispatcher
//! fills it without waiting and a writer task drains it into the socket.

pub mod subscriber;
