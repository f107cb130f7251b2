pub mod collector;
pub mod config;
pub mod dashboard;
pub mod device;
pub mod state;

pub use config::{Config, DashboardConfig, DeviceConfig, WatchdogConfig};
pub use device::mock::MockDeviceReceiver;
pub use device::websocket::WebSocketDeviceReceiver;
pub use device::{DeviceEvent, DeviceReceiver};
pub use state::ServerState;
