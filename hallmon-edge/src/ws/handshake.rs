use core::fmt::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

use super::WsError;
use crate::Endpoint;

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const KEY_LEN: usize = 24;
pub const ACCEPT_LEN: usize = 28;
pub const REQUEST_CAPACITY: usize = 256;
/// Responses with a longer header block are refused.
pub const MAX_RESPONSE_SIZE: usize = 1024;

/// `Sec-WebSocket-Key` value: base64 of a 16 byte nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn new(nonce: [u8; 16]) -> Self {
        let mut out = [0u8; KEY_LEN];
        // 16 input bytes always encode to exactly 24 characters.
        let written = STANDARD.encode_slice(nonce, &mut out).unwrap_or_default();
        debug_assert_eq!(written, KEY_LEN);
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or_default()
    }
}

/// The `Sec-WebSocket-Accept` value a server must answer `key` with.
pub fn accept_key(key: &str) -> [u8; ACCEPT_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID);
    let digest = hasher.finalize();

    let mut out = [0u8; ACCEPT_LEN];
    let written = STANDARD.encode_slice(digest, &mut out).unwrap_or_default();
    debug_assert_eq!(written, ACCEPT_LEN);
    out
}

/// Build the HTTP upgrade request for `endpoint`.
pub fn request(
    endpoint: &Endpoint<'_>,
    key: &Key,
) -> Result<heapless::String<REQUEST_CAPACITY>, WsError> {
    let mut req = heapless::String::new();

    write!(
        req,
        "GET {} HTTP/1.1\r\n\
         Host: {}:{}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        endpoint.path,
        endpoint.host,
        endpoint.port,
        key.as_str(),
    )
    .map_err(|_| WsError::BufferTooSmall {
        needed: REQUEST_CAPACITY + 1,
        available: REQUEST_CAPACITY,
    })?;

    Ok(req)
}

/// Check the server's reply to [`request`].
///
/// Returns `Ok(None)` while the header block is incomplete and the header
/// length (including the blank line) once the upgrade has been accepted.
/// Bytes past that length already belong to the first frame.
pub fn verify_response(buf: &[u8], key: &Key) -> Result<Option<usize>, WsError> {
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        if buf.len() >= MAX_RESPONSE_SIZE {
            return Err(WsError::ResponseTooLarge);
        }
        return Ok(None);
    };

    let head = core::str::from_utf8(&buf[..end]).map_err(|_| WsError::MalformedResponse)?;
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(WsError::MalformedResponse)?;

    if status != 101 {
        return Err(WsError::UnexpectedStatus(status));
    }

    let accept = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("sec-websocket-accept"))
        .map(|(_, value)| value.trim())
        .ok_or(WsError::MissingAccept)?;

    if accept.as_bytes() != accept_key(key.as_str()) {
        return Err(WsError::AcceptMismatch);
    }

    Ok(Some(end + 4))
}
