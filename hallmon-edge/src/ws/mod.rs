//! Client side of RFC 6455, without any I/O.
//!
//! [`handshake`] builds the upgrade request and checks the server's reply,
//! [`frame`] encodes masked client frames and decodes server frames.

pub mod frame;
pub mod handshake;

pub use frame::{Frame, Opcode};
pub use handshake::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WsError {
    BufferTooSmall { needed: usize, available: usize },
    InvalidOpcode(u8),
    ReservedBits(u8),
    /// Servers must not mask frames.
    MaskedServerFrame,
    PayloadTooLarge(u64),
    MalformedResponse,
    UnexpectedStatus(u16),
    MissingAccept,
    AcceptMismatch,
    ResponseTooLarge,
}
