use crate::Error;

pub mod tcp;
pub mod websocket;

pub use tcp::TcpLink;
pub use websocket::*;

/// Remote end of the telemetry connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoint<'a> {
    /// IPv4 literal or DNS name.
    pub host: &'a str,
    pub port: u16,
    /// Request path of the upgrade, starting with `/`.
    pub path: &'a str,
}

impl Endpoint<'_> {
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.is_empty() || !self.path.starts_with('/') {
            return Err(Error::InvalidEndpoint);
        }
        Ok(())
    }
}

/// Message transport to the telemetry receiver.
pub trait Transport {
    /// Called once after network join. Records where to connect; the
    /// connection itself is driven by [`Transport::pump`].
    fn connect(&mut self, endpoint: Endpoint<'static>) -> impl Future<Output = Result<(), Error>>;

    /// Advance the connection state machine by one step. Must return promptly
    /// whatever the connection state is.
    fn pump(&mut self) -> impl Future<Output = ()>;

    /// Send a single text message.
    fn send_text(&mut self, text: &str) -> impl Future<Output = Result<(), Error>>;

    fn is_connected(&self) -> bool;
}

/// Byte stream a [`WebSocket`] runs over.
pub trait Socket {
    /// Resolve `endpoint` and open a stream to it.
    fn open(&mut self, endpoint: &Endpoint<'_>) -> impl Future<Output = Result<(), Error>>;

    /// Copy whatever has already arrived into `buf` without waiting for more.
    ///
    /// Returns `Ok(0)` when nothing is buffered and `Err(Error::NotConnected)`
    /// once the peer has gone away.
    fn read_available(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, Error>>;

    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), Error>>;

    /// Graceful close.
    fn close(&mut self);

    /// Drop the connection immediately so the socket can be opened again.
    fn abort(&mut self);
}
