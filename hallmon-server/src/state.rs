use std::collections::HashSet;
use std::sync::Arc;

use hallmon_core::{ConnectionId, DashboardUpdate, HallCalibration, RpmSettings, RpmTracker};
use hallmon_edge::Sample;
use jiff::Timestamp;
use tokio::sync::{Mutex, broadcast};

/// Updates buffered per dashboard client before it starts lagging.
const UPDATE_CAPACITY: usize = 64;

/// Shared state: the RPM tracker, the connected devices and the fan-out to
/// dashboard clients.
pub struct ServerState {
    inner: Arc<Mutex<Inner>>,
    updates: broadcast::Sender<DashboardUpdate>,
}

struct Inner {
    calibration: HallCalibration,
    tracker: RpmTracker,
    connected_devices: HashSet<ConnectionId>,
    last_field: f64,
    startup_time: Timestamp,
}

impl ServerState {
    pub fn new(calibration: HallCalibration, settings: RpmSettings) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        Self {
            inner: Arc::new(Mutex::new(Inner {
                calibration,
                tracker: RpmTracker::new(settings),
                connected_devices: HashSet::new(),
                last_field: 0.0,
                startup_time: Timestamp::now(),
            })),
            updates,
        }
    }

    /// Convert a device sample, feed the tracker and broadcast the result.
    pub async fn ingest(&self, sample: Sample, received_at: Timestamp) -> DashboardUpdate {
        let update = {
            let mut inner = self.inner.lock().await;
            let field = inner.calibration.millitesla(sample.hall_mt);
            inner.last_field = field;
            let reading = inner.tracker.update(field, received_at);
            DashboardUpdate::new(field, reading)
        };

        self.publish(update);
        update
    }

    /// Zero the RPM if the rotor stopped, broadcasting the zeroed values.
    pub async fn check_timeout(&self, now: Timestamp) -> Option<DashboardUpdate> {
        let update = {
            let mut inner = self.inner.lock().await;
            let reading = inner.tracker.check_timeout(now)?;
            DashboardUpdate::new(inner.last_field, reading)
        };

        self.publish(update);
        Some(update)
    }

    /// Most recent values, for clients that just connected.
    pub async fn latest(&self) -> DashboardUpdate {
        let inner = self.inner.lock().await;
        DashboardUpdate::new(inner.last_field, inner.tracker.reading())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.updates.subscribe()
    }

    pub async fn device_connected(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().await;
        inner.connected_devices.insert(id);
    }

    pub async fn device_disconnected(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().await;
        inner.connected_devices.remove(&id);
    }

    pub async fn connected_count(&self) -> u32 {
        let inner = self.inner.lock().await;
        inner.connected_devices.len() as u32
    }

    pub fn dashboard_count(&self) -> usize {
        self.updates.receiver_count()
    }

    pub async fn uptime_secs(&self) -> i64 {
        let inner = self.inner.lock().await;
        Timestamp::now().duration_since(inner.startup_time).as_secs()
    }

    fn publish(&self, update: DashboardUpdate) {
        // No subscribers is not an error: nobody has the dashboard open.
        let _ = self.updates.send(update);
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(HallCalibration::default(), RpmSettings::default())
    }
}

impl Clone for ServerState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            updates: self.updates.clone(),
        }
    }
}
