pub mod mock;
pub mod websocket;

use async_trait::async_trait;
use hallmon_core::ConnectionId;
use hallmon_edge::Sample;
use jiff::Timestamp;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Events produced by device connections.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Connected(ConnectionId),
    Sample {
        id: ConnectionId,
        sample: Sample,
        received_at: Timestamp,
    },
    Disconnected(ConnectionId),
}

/// Trait for receiving telemetry from sensor devices.
///
/// Implementations spawn background tasks that push events into an mpsc
/// channel. The receiving end is returned from `start`.
#[async_trait]
pub trait DeviceReceiver: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start accepting device telemetry.
    ///
    /// The background tasks run until the cancellation token is cancelled.
    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<DeviceEvent>, Self::Error>;
}
