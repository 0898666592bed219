use crate::notify::PushEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::api::ServerState;

/// Messages clients may send over the push channel
#[derive(Debug, Deserialize)]
struct ClientMessage {
    event: String,
    #[serde(default)]
    channel: Value,
    #[serde(default)]
    data: Value,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_connection(socket, state))
}

async fn push_connection(socket: WebSocket, state: ServerState) {
    let client_id = Uuid::new_v4();
    // Subscribe before the greeting so no publish falls in between
    let mut events = state.bus.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("Push client {} connected", client_id);

    let greeting = PushEvent::slot_updates(&state.store.snapshot());
    if send_event(&mut sender, &greeting).await.is_err() {
        info!("Push client {} left before greeting", client_id);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Push client {} lagging, skipped {} events", client_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_message(client_id, &text) {
                        if send_event(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Push client {} socket error: {}", client_id, e);
                    break;
                }
            },
        }
    }

    info!("Push client {} disconnected", client_id);
}

async fn send_event<S>(sender: &mut S, event: &PushEvent) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let text = serde_json::to_string(event).map_err(|e| {
        warn!("Failed to serialize {} event: {}", event.event, e);
    })?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

/// Answer a client frame; only `subscribe` gets a reply
pub(crate) fn handle_client_message(client_id: Uuid, text: &str) -> Option<PushEvent> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring unparseable message from {}: {}", client_id, e);
            return None;
        }
    };

    if message.event != "subscribe" {
        debug!("Ignoring '{}' from push client {}", message.event, client_id);
        return None;
    }

    let channel = if message.channel.is_null() {
        message.data.get("channel").cloned().unwrap_or(Value::Null)
    } else {
        message.channel
    };

    info!("Push client {} subscribed to {}", client_id, channel);
    Some(PushEvent::subscribed(channel))
}
