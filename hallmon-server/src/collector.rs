use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::device::DeviceEvent;
use crate::state::ServerState;

/// Drain device events into the shared state until cancelled or every
/// device sender is gone.
pub async fn run_collector(
    mut device_rx: mpsc::Receiver<DeviceEvent>,
    state: ServerState,
    cancel: CancellationToken,
) {
    info!("Collector started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Collector shutting down");
                break;
            }
            event = device_rx.recv() => {
                let Some(event) = event else {
                    info!("Device channel closed, collector shutting down");
                    break;
                };

                match event {
                    DeviceEvent::Connected(id) => {
                        state.device_connected(id).await;
                        info!(connection_id = %id, "Device registered");
                    }
                    DeviceEvent::Sample { id, sample, received_at } => {
                        let update = state.ingest(sample, received_at).await;
                        debug!(
                            connection_id = %id,
                            magnetic_field = update.magnetic_field,
                            rpm = update.rpm,
                            peak_rpm = update.peak_rpm,
                            "Sample ingested"
                        );
                    }
                    DeviceEvent::Disconnected(id) => {
                        state.device_disconnected(id).await;
                        info!(connection_id = %id, "Device removed");
                    }
                }
            }
        }
    }
}

/// Periodically zero the RPM once the rotor has stopped.
pub async fn run_watchdog(state: ServerState, interval: Duration, cancel: CancellationToken) {
    info!(
        interval_ms = interval.as_millis() as u64,
        "RPM watchdog started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("RPM watchdog shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Some(update) = state.check_timeout(jiff::Timestamp::now()).await {
                    debug!(peak_rpm = update.peak_rpm, "No peak within timeout, RPM zeroed");
                }
            }
        }
    }
}
