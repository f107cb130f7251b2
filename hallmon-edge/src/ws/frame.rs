use super::WsError;

// frame structure : flags+opcode(1) + mask+len(1) + ext len(0/2/8) + mask key(0/4) + payload

const FIN: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0F;
const MASKED: u8 = 0x80;
const LEN_MASK: u8 = 0x7F;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl TryFrom<u8> for Opcode {
    type Error = WsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            _ => Err(WsError::InvalidOpcode(value)),
        }
    }
}

impl Opcode {
    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

/// A decoded server frame borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: &'a [u8],
}

/// Number of bytes a masked client frame with `payload_len` bytes occupies.
pub const fn encoded_len(payload_len: usize) -> usize {
    header_len(payload_len) + payload_len
}

const fn header_len(payload_len: usize) -> usize {
    let ext = if payload_len <= 125 {
        0
    } else if payload_len <= u16::MAX as usize {
        2
    } else {
        8
    };

    2 + ext + 4
}

/// Write one final, masked frame into `buf` and return its length.
pub fn encode(
    opcode: Opcode,
    payload: &[u8],
    mask: [u8; 4],
    buf: &mut [u8],
) -> Result<usize, WsError> {
    let len = payload.len();
    let total = encoded_len(len);

    if buf.len() < total {
        return Err(WsError::BufferTooSmall {
            needed: total,
            available: buf.len(),
        });
    }

    buf[0] = FIN | opcode as u8;

    let mut pos = 2;
    if len <= 125 {
        buf[1] = MASKED | len as u8;
    } else if len <= u16::MAX as usize {
        buf[1] = MASKED | LEN_16;
        buf[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        pos += 2;
    } else {
        buf[1] = MASKED | LEN_64;
        buf[2..10].copy_from_slice(&(len as u64).to_be_bytes());
        pos += 8;
    }

    buf[pos..pos + 4].copy_from_slice(&mask);
    pos += 4;

    for (i, (out, byte)) in buf[pos..pos + len].iter_mut().zip(payload).enumerate() {
        *out = byte ^ mask[i & 3];
    }

    Ok(total)
}

/// Decode the frame at the start of `buf`.
///
/// Returns `Ok(None)` until the whole frame has arrived, otherwise the frame
/// and the number of bytes it consumed.
pub fn decode(buf: &[u8]) -> Result<Option<(Frame<'_>, usize)>, WsError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let rsv = buf[0] & RSV_MASK;
    if rsv != 0 {
        return Err(WsError::ReservedBits(rsv));
    }

    let fin = buf[0] & FIN != 0;
    let opcode = Opcode::try_from(buf[0] & OPCODE_MASK)?;

    if buf[1] & MASKED != 0 {
        return Err(WsError::MaskedServerFrame);
    }

    let (header, len) = match buf[1] & LEN_MASK {
        LEN_16 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (4, u16::from_be_bytes([buf[2], buf[3]]) as u64)
        }
        LEN_64 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            (10, u64::from_be_bytes(raw))
        }
        n => (2, n as u64),
    };

    let total = usize::try_from(len)
        .ok()
        .and_then(|n| n.checked_add(header))
        .ok_or(WsError::PayloadTooLarge(len))?;

    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some((
        Frame {
            fin,
            opcode,
            payload: &buf[header..total],
        },
        total,
    )))
}
