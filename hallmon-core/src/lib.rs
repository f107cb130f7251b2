pub mod field;
pub mod rpm;

pub use field::HallCalibration;
pub use rpm::{RpmReading, RpmSettings, RpmTracker};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for one device or browser connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Ulid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message pushed to every dashboard client.
///
/// Serialized as `{"magneticField":12.34,"rpm":600.0,"peakRpm":900.0}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardUpdate {
    /// Field strength in millitesla, two decimals.
    pub magnetic_field: f64,
    /// Moving-average RPM, whole revolutions.
    pub rpm: f64,
    /// Highest RPM seen since start, whole revolutions.
    pub peak_rpm: f64,
}

impl DashboardUpdate {
    pub fn new(magnetic_field: f64, reading: RpmReading) -> Self {
        Self {
            magnetic_field: (magnetic_field * 100.0).round() / 100.0,
            rpm: reading.rpm.round(),
            peak_rpm: reading.peak_rpm.round(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_update_uses_browser_field_names() {
        let update = DashboardUpdate::new(
            12.3456,
            RpmReading {
                rpm: 599.6,
                peak_rpm: 900.2,
            },
        );

        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"magneticField":12.35,"rpm":600.0,"peakRpm":900.0}"#);
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
