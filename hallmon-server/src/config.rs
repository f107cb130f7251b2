use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use hallmon_core::{HallCalibration, RpmSettings};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub sensor: HallCalibration,
    #[serde(default)]
    pub rpm: RpmSettings,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeviceConfig {
    /// Devices connect over WebSocket.
    Websocket {
        addr: SocketAddr,
        /// Upgrade path devices request
        #[serde(default = "default_device_path")]
        path: String,
    },
    Mock {
        /// Interval in milliseconds between generated samples
        interval_ms: u64,
        /// Simulated rotation speed
        rpm: f64,
    },
}

fn default_device_path() -> String {
    "/".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct DashboardConfig {
    /// Address for the browser-facing HTTP server
    pub addr: SocketAddr,
    /// Directory with the static dashboard site
    pub site_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// How often the RPM timeout is checked, in milliseconds
    pub interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::Websocket {
                addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
                path: default_device_path(),
            },
            dashboard: DashboardConfig {
                addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
                site_dir: PathBuf::from("site"),
            },
            sensor: HallCalibration::default(),
            rpm: RpmSettings::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}
