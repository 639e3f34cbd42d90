//! Subscriber WebSocket handler
//!
//! Frames only flow server to client. Anything the client sends is read and
//! discarded; a read error or close ends the subscription.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::api::server::AppState;
use crate::dispatch::SubscriberHandle;

/// WebSocket handler for live finalization events
pub async fn subscriber_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscriber_ws(socket, state))
}

/// Handle one subscriber connection
async fn handle_subscriber_ws(socket: WebSocket, state: AppState) {
    let (handle, mut rx) = SubscriberHandle::channel(state.subscriber_buffer);
    let id = handle.id();

    if state.dispatch.join(handle).await.is_err() {
        debug!(connection = %id, "Dispatcher stopped, closing new subscriber");
        return;
    }

    info!(connection = %id, "Subscriber WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let delivery_timeout = state.delivery_timeout;

    // Drain the outbound queue; each socket write is bounded.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let write = sender.send(Message::Text(frame.to_string()));
            match timeout(delivery_timeout, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Subscriber write failed: {}", e);
                    break;
                }
                Err(_) => {
                    warn!("Subscriber write timed out after {:?}", delivery_timeout);
                    break;
                }
            }
        }
        let _ = timeout(delivery_timeout, sender.close()).await;
    });

    // Inbound frames are ignored; we only care about the connection ending.
    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("Subscriber WebSocket received close");
                    break;
                }
                Err(e) => {
                    debug!("Subscriber WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut receive_task => {}
    }

    send_task.abort();
    receive_task.abort();
    let _ = tokio::join!(send_task, receive_task);

    if state.dispatch.leave(id).await.is_err() {
        debug!(connection = %id, "Dispatcher already stopped");
    }

    info!(connection = %id, "Subscriber WebSocket disconnected");
}
