use std::path::Path;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::state::ServerState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub connected_devices: u32,
    pub dashboard_clients: usize,
    pub uptime_secs: i64,
}

/// Browser-facing routes: health, the live update socket and the static site.
pub fn router(state: ServerState, site_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(upgrade))
        .fallback_service(ServeDir::new(site_dir))
        .with_state(state)
}

async fn health(State(state): State<ServerState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        connected_devices: state.connected_count().await,
        dashboard_clients: state.dashboard_count(),
        uptime_secs: state.uptime_secs().await,
    })
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| forward_updates(socket, state))
}

async fn forward_updates(socket: WebSocket, state: ServerState) {
    // Subscribe before sending the snapshot so no update falls in between.
    let mut updates = state.subscribe();
    let (mut sink, mut stream) = socket.split();

    info!("Dashboard client connected");

    let snapshot = state.latest().await;
    if send_json(&mut sink, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(update) => {
                        if send_json(&mut sink, &update).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dashboard client lagging, skipped updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Dashboard socket error");
                        break;
                    }
                }
            }
        }
    }

    info!("Dashboard client disconnected");
}

async fn send_json<S, T>(sink: &mut S, value: &T) -> Result<(), ()>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Failed to serialize dashboard update");
            return Err(());
        }
    };

    sink.send(Message::Text(text.into())).await.map_err(|e| {
        debug!(error = %e, "Dashboard client went away");
    })
}
