//! WebSocket endpoint bound to one hub connection.
//!
//! Clients send `{"type":"subscribe:job","jobId":"..."}` and
//! `{"type":"unsubscribe:job","jobId":"..."}`; the server pushes hub events
//! as JSON text frames for every job the socket is subscribed to.

use crate::state::AppState;
use adpulse_domain::ClientMessage;
use adpulse_hub::{ConnectionHandle, FanoutHub, TopicSubscriber};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<FanoutHub>) {
    let mut connection = hub.connect();
    let connection_id = connection.id();
    let handle = connection.handle().clone();
    let (mut sink, mut stream) = socket.split();
    info!(connection_id = %connection_id, "WebSocket connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = connection.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, event = event.name(), "Failed to encode hub event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => {
                    handle_client_message(&handle, &text);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let released = hub.disconnect(connection_id);
    info!(connection_id = %connection_id, released, "WebSocket disconnected");
}

/// Applies one control frame. Returns `false` for frames that were ignored.
pub fn handle_client_message(handle: &ConnectionHandle, text: &str) -> bool {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(connection_id = %handle.id(), error = %e, "Ignoring unrecognized frame");
            return false;
        }
    };

    match message {
        ClientMessage::Subscribe { job_id } if !job_id.is_blank() => {
            handle.subscribe(&job_id);
            true
        }
        ClientMessage::Unsubscribe { job_id } if !job_id.is_blank() => {
            handle.unsubscribe(&job_id);
            true
        }
        _ => false,
    }
}
