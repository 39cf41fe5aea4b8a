//! WebSocket lifecycle event streaming
//!
//! Pushes every call lifecycle event to connected collaborators
//! (notification center, dashboards) as JSON.

use crate::interface::api::router::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{sink::SinkExt, stream::StreamExt};
use tracing::{debug, info};

pub async fn events_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| stream_events(socket, state))
}

async fn stream_events(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.bus.subscribe();

    info!("lifecycle stream client connected");

    let mut send_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                debug!("lifecycle stream client went away");
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
                other => debug!("ignoring client message: {:?}", other),
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    info!("lifecycle stream client disconnected");
}
