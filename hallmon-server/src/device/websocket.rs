use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use hallmon_core::ConnectionId;
use hallmon_edge::Sample;
use tokio::{io, net::TcpListener, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, field, info, instrument, warn};

use super::{DeviceEvent, DeviceReceiver};

#[derive(Debug, thiserror::Error)]
pub enum DeviceConnectionError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("Internal event channel closed")]
    ChannelClosed,
}

/// Accepts sensor devices over WebSocket and forwards their samples.
pub struct WebSocketDeviceReceiver {
    addr: SocketAddr,
    path: String,
}

impl WebSocketDeviceReceiver {
    pub fn new(addr: SocketAddr, path: impl Into<String>) -> Self {
        Self {
            addr,
            path: path.into(),
        }
    }
}

#[async_trait]
impl DeviceReceiver for WebSocketDeviceReceiver {
    type Error = io::Error;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<DeviceEvent>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);

        let listener = TcpListener::bind(self.addr).await?;
        let addr = listener.local_addr()?;
        info!(%addr, path = %self.path, "WebSocket device receiver started");

        let app = router(&self.path, tx, cancel.clone());

        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await;

            match result {
                Ok(()) => info!("Closing WebSocket device receiver"),
                Err(e) => error!(error = %e, "WebSocket device receiver failed"),
            }
        });

        Ok(rx)
    }
}

#[derive(Clone)]
struct DeviceRoute {
    tx: mpsc::Sender<DeviceEvent>,
    cancel: CancellationToken,
}

/// Router that upgrades device connections on `path`.
pub fn router(path: &str, tx: mpsc::Sender<DeviceEvent>, cancel: CancellationToken) -> Router {
    Router::new()
        .route(path, get(upgrade))
        .with_state(DeviceRoute { tx, cancel })
}

async fn upgrade(ws: WebSocketUpgrade, State(route): State<DeviceRoute>) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_device(socket, route.tx, route.cancel).await {
            error!(error = %e, "Device connection closed with error");
        }
    })
}

#[instrument(name = "device_handler", skip_all, fields(connection_id = field::Empty))]
async fn handle_device(
    mut socket: WebSocket,
    tx: mpsc::Sender<DeviceEvent>,
    cancel: CancellationToken,
) -> Result<(), DeviceConnectionError> {
    let id = ConnectionId::new();
    Span::current().record("connection_id", field::display(&id));
    info!("Device connected");

    tx.send(DeviceEvent::Connected(id))
        .await
        .map_err(|_| DeviceConnectionError::ChannelClosed)?;

    let result = receive_samples(&mut socket, id, &tx, &cancel).await;

    // Best effort: the collector may already be gone during shutdown.
    let _ = tx.send(DeviceEvent::Disconnected(id)).await;
    info!("Device disconnected");

    result
}

async fn receive_samples(
    socket: &mut WebSocket,
    id: ConnectionId,
    tx: &mpsc::Sender<DeviceEvent>,
    cancel: &CancellationToken,
) -> Result<(), DeviceConnectionError> {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown signal received");
                return Ok(());
            }
            message = socket.recv() => message,
        };

        let Some(message) = message else {
            return Ok(());
        };

        match message? {
            Message::Text(text) => {
                let sample = match Sample::decode(text.as_str()) {
                    Ok(sample) => sample,
                    Err(e) => {
                        warn!(error = ?e, text = %text.as_str(), "Discarding malformed sample");
                        continue;
                    }
                };

                debug!(analog = sample.analog, hall = sample.hall_mt, "Sample received");

                let event = DeviceEvent::Sample {
                    id,
                    sample,
                    received_at: jiff::Timestamp::now(),
                };
                tx.send(event)
                    .await
                    .map_err(|_| DeviceConnectionError::ChannelClosed)?;
            }
            Message::Binary(bytes) => {
                warn!(len = bytes.len(), "Ignoring binary message");
            }
            Message::Close(frame) => {
                debug!(?frame, "Device sent close");
                return Ok(());
            }
            // axum answers pings itself
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}
