use std::f64::consts::TAU;
use std::time::Duration;

use async_trait::async_trait;
use hallmon_core::ConnectionId;
use hallmon_edge::Sample;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{DeviceEvent, DeviceReceiver};

/// Raw count at zero field for a 12-bit ADC.
const MIDPOINT: f64 = 2048.0;
/// Peak excursion as a fraction of half scale when the magnet passes.
const SWING: f64 = 0.8;

/// Mock device that simulates a magnet on a spinning shaft.
///
/// The field follows a cosine over each revolution, so the sample interval
/// must be well below one revolution for peaks to be seen.
pub struct MockDeviceReceiver {
    interval: Duration,
    rpm: f64,
}

impl MockDeviceReceiver {
    pub fn new(interval_ms: u64, rpm: f64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms.max(1)),
            rpm,
        }
    }
}

/// Raw hall reading `elapsed` into the rotation, with a little noise.
fn hall_count(rpm: f64, elapsed: Duration, rng: &mut impl Rng) -> u16 {
    let revolutions = elapsed.as_secs_f64() * rpm / 60.0;
    let noise: f64 = rng.random_range(-0.02..0.02);
    let level = SWING * (TAU * revolutions).cos() + noise;

    (MIDPOINT + level * (MIDPOINT - 1.0)).clamp(0.0, 4095.0) as u16
}

#[async_trait]
impl DeviceReceiver for MockDeviceReceiver {
    type Error = std::convert::Infallible;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<DeviceEvent>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);
        let interval = self.interval;
        let rpm = self.rpm;

        info!(
            interval_ms = interval.as_millis() as u64,
            rpm, "Starting mock device receiver"
        );

        tokio::spawn(async move {
            let id = ConnectionId::new();
            if tx.send(DeviceEvent::Connected(id)).await.is_err() {
                return;
            }

            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Mock device shutting down");
                        let _ = tx.send(DeviceEvent::Disconnected(id)).await;
                        break;
                    }
                    _ = ticker.tick() => {
                        let mut rng = rand::rng();
                        let sample = Sample {
                            analog: rng.random_range(0..4096),
                            hall_mt: hall_count(rpm, started.elapsed(), &mut rng),
                        };

                        let event = DeviceEvent::Sample {
                            id,
                            sample,
                            received_at: jiff::Timestamp::now(),
                        };
                        if tx.send(event).await.is_err() {
                            info!("Channel closed, mock device shutting down");
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
