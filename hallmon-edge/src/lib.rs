#![cfg_attr(not(test), no_std)]

// This must go first so the logging macros are visible to every module.
mod fmt;

pub mod config;
pub mod engine;
pub mod network;
pub mod sample;
pub mod transport;
pub mod ws;

pub use config::{AssociationPolicy, TelemetryConfig};
pub use engine::{Engine, Running, SendOutcome};
pub use network::{Credentials, Network};
pub use sample::{AnalogSource, ChannelId, MAX_PAYLOAD_SIZE, Sample, SensorError};
pub use transport::{Endpoint, LinkState, Socket, TcpLink, Transport, WebSocket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Association did not complete within the configured number of polls.
    AssociationTimeout { polls: u32 },
    /// The transport has no open connection to send on.
    NotConnected,
    UnableToSend,
    SerializationFailed,
    DeserializationFailed,
    InvalidEndpoint,
    ServerNotFound,
    Ws(ws::WsError),
}

impl From<ws::WsError> for Error {
    fn from(e: ws::WsError) -> Self {
        Error::Ws(e)
    }
}
