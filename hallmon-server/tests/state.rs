use std::time::Duration;

use hallmon_core::{ConnectionId, DashboardUpdate, HallCalibration, RpmSettings};
use hallmon_edge::Sample;
use hallmon_server::collector::{run_collector, run_watchdog};
use hallmon_server::{DeviceEvent, ServerState};
use jiff::Timestamp;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const STEP: Duration = Duration::from_secs(5);

/// Zero field with the default 5 V calibration.
const QUIET: u16 = 2047;
/// Roughly 80 mT.
const MAGNET: u16 = 3686;

fn at(ms: i64) -> Timestamp {
    Timestamp::from_millisecond(ms).unwrap()
}

fn hall(raw: u16) -> Sample {
    Sample {
        analog: 0,
        hall_mt: raw,
    }
}

#[tokio::test]
async fn ingest_converts_and_tracks_rpm() {
    let state = ServerState::default();

    let first = state.ingest(hall(MAGNET), at(0)).await;
    assert!((first.magnetic_field - 80.0).abs() < 0.1);
    assert_eq!(first.rpm, 0.0);

    let quiet = state.ingest(hall(QUIET), at(50)).await;
    assert!(quiet.magnetic_field.abs() < 0.1);

    // next peak 200ms later
    let update = state.ingest(hall(MAGNET), at(200)).await;
    assert_eq!(update.rpm, 300.0);
    assert_eq!(update.peak_rpm, 300.0);
}

#[tokio::test]
async fn subscribers_receive_every_update() {
    let state = ServerState::default();
    let mut first = state.subscribe();
    let mut second = state.subscribe();
    assert_eq!(state.dashboard_count(), 2);

    let sent = state.ingest(hall(QUIET), at(0)).await;

    assert_eq!(first.recv().await.unwrap(), sent);
    assert_eq!(second.recv().await.unwrap(), sent);
}

#[tokio::test]
async fn ingest_without_subscribers_is_fine() {
    let state = ServerState::default();
    state.ingest(hall(MAGNET), at(0)).await;
    assert_eq!(state.latest().await.rpm, 0.0);
}

#[tokio::test]
async fn timeout_broadcasts_zero_rpm() {
    let state = ServerState::default();

    for rev in 0..4 {
        state.ingest(hall(MAGNET), at(rev * 100)).await;
        state.ingest(hall(QUIET), at(rev * 100 + 20)).await;
    }
    assert_eq!(state.latest().await.rpm, 600.0);

    let mut updates = state.subscribe();

    assert!(state.check_timeout(at(1000)).await.is_none());

    let zeroed = state.check_timeout(at(2400)).await.unwrap();
    assert_eq!(zeroed.rpm, 0.0);
    assert_eq!(zeroed.peak_rpm, 600.0);
    assert_eq!(updates.recv().await.unwrap(), zeroed);
}

#[tokio::test]
async fn calibration_and_settings_are_applied() {
    let state = ServerState::new(
        HallCalibration {
            reference_voltage: 3.3,
            ..HallCalibration::default()
        },
        RpmSettings {
            peak_threshold: 20.0,
            ..RpmSettings::default()
        },
    );

    // 3.3 V full scale is 32 mT, enough for the lowered threshold
    let update = state.ingest(hall(4095), at(0)).await;
    assert!((update.magnetic_field - 32.0).abs() < 0.01);

    // 2.5 V on a 3.3 V scale
    state.ingest(hall(3102), at(10)).await;
    let update = state.ingest(hall(4095), at(100)).await;
    assert_eq!(update.rpm, 600.0);
}

#[tokio::test]
async fn device_tracking() {
    let state = ServerState::default();
    let a = ConnectionId::new();
    let b = ConnectionId::new();

    state.device_connected(a).await;
    state.device_connected(b).await;
    state.device_connected(a).await;
    assert_eq!(state.connected_count().await, 2);

    state.device_disconnected(a).await;
    assert_eq!(state.connected_count().await, 1);

    state.device_disconnected(a).await;
    assert_eq!(state.connected_count().await, 1);
}

#[tokio::test]
async fn collector_applies_device_events() {
    let state = ServerState::default();
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(16);
    let mut updates = state.subscribe();

    let handle = tokio::spawn(run_collector(rx, state.clone(), cancel.clone()));

    let id = ConnectionId::new();
    tx.send(DeviceEvent::Connected(id)).await.unwrap();
    tx.send(DeviceEvent::Sample {
        id,
        sample: hall(MAGNET),
        received_at: Timestamp::now(),
    })
    .await
    .unwrap();

    let update: DashboardUpdate = timeout(STEP, updates.recv()).await.unwrap().unwrap();
    assert!(update.magnetic_field > 50.0);
    assert_eq!(state.connected_count().await, 1);

    tx.send(DeviceEvent::Disconnected(id)).await.unwrap();
    drop(tx);

    // the collector stops once every sender is gone
    timeout(STEP, handle).await.unwrap().unwrap();
    assert_eq!(state.connected_count().await, 0);
}

#[tokio::test]
async fn watchdog_zeroes_stalled_rotor() {
    let state = ServerState::new(
        HallCalibration::default(),
        RpmSettings {
            timeout_ms: 50,
            ..RpmSettings::default()
        },
    );
    let cancel = CancellationToken::new();

    let now = Timestamp::now();
    let earlier = now - jiff::SignedDuration::from_millis(100);
    state.ingest(hall(MAGNET), earlier).await;
    state.ingest(hall(QUIET), earlier + jiff::SignedDuration::from_millis(10)).await;
    state.ingest(hall(MAGNET), now).await;
    assert_eq!(state.latest().await.rpm, 600.0);

    let mut updates = state.subscribe();
    let handle = tokio::spawn(run_watchdog(
        state.clone(),
        Duration::from_millis(10),
        cancel.clone(),
    ));

    let update = timeout(STEP, updates.recv()).await.unwrap().unwrap();
    assert_eq!(update.rpm, 0.0);
    assert_eq!(update.peak_rpm, 600.0);

    cancel.cancel();
    timeout(STEP, handle).await.unwrap().unwrap();
}
