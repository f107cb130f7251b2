use embassy_time::Duration;

use crate::ChannelId;
use crate::Endpoint;

/// How startup waits for the network to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationPolicy {
    /// Sleep between two unsuccessful status polls.
    pub poll_interval: Duration,
    /// Give up after this many unsuccessful polls. `None` waits forever.
    pub max_polls: Option<u32>,
}

impl AssociationPolicy {
    pub const UNBOUNDED: Self = Self {
        poll_interval: Duration::from_millis(500),
        max_polls: None,
    };
}

/// Build-time settings of the telemetry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub endpoint: Endpoint<'static>,
    pub analog_channel: ChannelId,
    pub hall_channel: ChannelId,
    /// Pause after each send.
    pub send_interval: Duration,
    pub association: AssociationPolicy,
}

impl TelemetryConfig {
    pub const DEFAULT: Self = Self {
        endpoint: Endpoint {
            host: "192.168.2.189",
            port: 8080,
            path: "/",
        },
        analog_channel: ChannelId(0),
        hall_channel: ChannelId(35),
        send_interval: Duration::from_secs(1),
        association: AssociationPolicy::UNBOUNDED,
    };
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
