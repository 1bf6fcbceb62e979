use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::SinkExt;
use futures::StreamExt;
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::state::AppState;

const STATUS_PUSH_INTERVAL: Duration = Duration::from_secs(1);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Streams dispatch events as they happen plus a scheduler status frame every
/// second, which is what keeps a client's countdown fresh.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.events_tx.subscribe());
    let mut ticker = tokio::time::interval(STATUS_PUSH_INTERVAL);

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                event = events.next() => match event {
                    Some(Ok(event)) => serde_json::to_string(&event),
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!(skipped, "websocket client lagging; events dropped");
                        continue;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let status = state.scheduler.status(Utc::now());
                    serde_json::to_string(&json!({
                        "type": "schedule_status",
                        "status": status,
                    }))
                }
            };

            let json = match payload {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize ws payload");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
