//! WebSocket change stream.
//!
//! Every connection receives an `INIT` snapshot first, then each change
//! event in the order the store applied it. A connection that falls behind
//! the broadcast buffer is re-attached and sent a fresh `INIT`.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::routes::AppState;
use crate::events::ChangeEvent;

pub async fn stream_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ChangeEvent,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(event = event.event_type(), "Failed to encode event: {}", e);
            return Ok(());
        }
    };
    tracing::trace!(
        event = event.event_type(),
        id = event.entity_id(),
        "Forwarding change event"
    );
    sender.send(Message::Text(json)).await
}

async fn handle_stream(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let attachment = state.control.attach().await;
    let mut rx = attachment.events;
    if send_event(&mut ws_sender, &ChangeEvent::Init(attachment.snapshot))
        .await
        .is_err()
    {
        tracing::debug!("Observer disconnected before receiving INIT");
        return;
    }
    tracing::info!(
        observers = state.control.observer_count(),
        "Observer connected"
    );

    // Observers are read-only; inbound frames only matter for close detection.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    let control = Arc::clone(&state.control);
    let mut stream_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if send_event(&mut ws_sender, &event).await.is_err() {
                        tracing::debug!("Observer disconnected from change stream");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Observer lagged by {} events, resending INIT", n);
                    let attachment = control.attach().await;
                    rx = attachment.events;
                    if send_event(&mut ws_sender, &ChangeEvent::Init(attachment.snapshot))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Change feed closed");
                    break;
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    tokio::select! {
        _ = &mut recv_task => {
            stream_task.abort();
        }
        _ = &mut stream_task => {
            recv_task.abort();
        }
    }
    tracing::info!("Observer disconnected");
}
