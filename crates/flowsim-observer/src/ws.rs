//! `WebSocket` transport for client sessions.
//!
//! Clients connect to `GET /ws`. The socket is split: a writer task drains
//! the session's bounded [`Outbound`] channel into the sink, and the read
//! half is mapped to [`InboundFrame`]s for [`run_session`]. Ping/pong is
//! answered by the transport.

use std::pin::pin;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::{InboundFrame, OUTBOUND_CAPACITY, Outbound, run_session};
use crate::state::AppState;

/// Upgrade `GET /ws` to a session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Frame(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    // The peer may already be gone.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let inbound = pin!(stream.filter_map(|msg| async move {
        match msg {
            Ok(Message::Text(text)) => Some(InboundFrame::Text(text.as_str().to_owned())),
            Ok(Message::Binary(_)) => Some(InboundFrame::Binary),
            Ok(Message::Close(_)) | Err(_) => Some(InboundFrame::Close),
            Ok(Message::Ping(_) | Message::Pong(_)) => None,
        }
    }));

    let summary = run_session(state, inbound, tx).await;
    if let Err(e) = writer.await {
        debug!(session = %summary.id, error = %e, "Writer task failed");
    }
}
