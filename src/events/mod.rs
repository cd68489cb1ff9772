//! Row-level change notifications.
//!
//! Mutating handlers publish a `ChangeEvent` carrying the identity of the row
//! they touched. Clients subscribe over WebSocket and patch the single row in
//! local state, refetching in full only when they cannot apply the patch.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::shared::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub row_id: Uuid,
    /// Set for chat_messages events so subscribers can patch the right thread.
    pub conversation_id: Option<Uuid>,
}

impl ChangeEvent {
    pub fn new(table: &str, kind: ChangeKind, row_id: Uuid) -> Self {
        Self {
            table: table.to_string(),
            kind,
            row_id,
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

/// Publish an event, ignoring the case where no subscriber is connected.
pub fn publish(state: &AppState, event: ChangeEvent) {
    if let Err(e) = state.events.send(event) {
        debug!("No event subscribers: {e}");
    }
}

/// Payload sent to a subscriber that fell behind the channel: patching is no
/// longer possible, so the client should refetch in full.
fn resync_hint(skipped: u64) -> String {
    serde_json::json!({ "resync": true, "skipped": skipped }).to_string()
}

pub async fn events_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.events.subscribe();
    ws.on_upgrade(move |socket| handle_events_connection(socket, rx))
}

async fn handle_events_connection(
    socket: WebSocket,
    mut rx: tokio::sync::broadcast::Receiver<ChangeEvent>,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    // The subscriber missed events past the channel capacity.
                    // Keep the connection and ask it to refetch.
                    warn!("Event subscriber lagged, {skipped} events dropped");
                    if sender.send(Message::Text(resync_hint(skipped))).await.is_err() {
                        break;
                    }
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let payload = match serde_json::to_string(&event) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Failed to serialize change event: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Drain the client side so close frames are observed; the stream is
    // server-to-client only.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

pub fn configure_events_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/events/ws", get(events_websocket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resync_hint_carries_the_skip_count() {
        let hint: serde_json::Value = serde_json::from_str(&resync_hint(12)).unwrap();
        assert_eq!(hint["resync"], true);
        assert_eq!(hint["skipped"], 12);
    }
}
