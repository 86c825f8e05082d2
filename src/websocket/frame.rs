//! WebSocket frame encoding and decoding (RFC 6455 §5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Masking-key (0 or 4 bytes)    |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! ```
//!
//! Server frames are written unmasked. Client frames arrive masked and are
//! decoded from an accumulating buffer; a short buffer is reported as
//! [`DecodeOutcome::Incomplete`], not as an error.

use bytes::{BufMut, Bytes, BytesMut};

use crate::websocket::error::FrameError;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0F;
const LENGTH_BITS: u8 = 0x7F;

const LENGTH_16: u8 = 126;
const LENGTH_64: u8 = 127;
const MAX_INLINE_LENGTH: usize = 125;

/// Frame type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpCode::Continuation => "continuation",
            OpCode::Text => "text",
            OpCode::Binary => "binary",
            OpCode::Close => "close",
            OpCode::Ping => "ping",
            OpCode::Pong => "pong",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(FrameError::InvalidOpCode(other)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(opcode: OpCode) -> Self {
        match opcode {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// A single WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Bytes,
}

/// Result of trying to decode a frame from the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A whole frame, plus the number of buffer bytes it occupied.
    Complete { frame: Frame, consumed: usize },
    /// The buffer holds only part of a frame; read more and retry.
    Incomplete,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            payload: payload.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(true, OpCode::Text, Bytes::from(text.into()))
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    pub fn close() -> Self {
        Self::new(true, OpCode::Close, Bytes::new())
    }

    /// Encode as a server frame (unmasked).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(header_len(self.payload.len(), false) + self.payload.len());
        self.put_header(&mut buf, false);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Encode as a client frame, masked with `mask`.
    pub fn encode_masked(&self, mask: [u8; 4]) -> Bytes {
        let mut buf = BytesMut::with_capacity(header_len(self.payload.len(), true) + self.payload.len());
        self.put_header(&mut buf, true);
        buf.put_slice(&mask);
        let start = buf.len();
        buf.put_slice(&self.payload);
        apply_mask(&mut buf[start..], mask);
        buf.freeze()
    }

    fn put_header(&self, buf: &mut BytesMut, masked: bool) {
        let first = (if self.fin { FIN_BIT } else { 0 }) | u8::from(self.opcode);
        let mask_bit = if masked { MASK_BIT } else { 0 };
        buf.put_u8(first);

        let len = self.payload.len();
        if len <= MAX_INLINE_LENGTH {
            buf.put_u8(mask_bit | len as u8);
        } else if let Ok(len) = u16::try_from(len) {
            buf.put_u8(mask_bit | LENGTH_16);
            buf.put_u16(len);
        } else {
            buf.put_u8(mask_bit | LENGTH_64);
            buf.put_u64(len as u64);
        }
    }
}

fn header_len(payload_len: usize, masked: bool) -> usize {
    let length_field = match payload_len {
        0..=MAX_INLINE_LENGTH => 0,
        126..=0xFFFF => 2,
        _ => 8,
    };
    2 + length_field + if masked { 4 } else { 0 }
}

/// XOR `buf` with the 4-byte masking key. Masking and unmasking are the same operation.
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Decode one frame from the front of `buf`.
pub fn decode(buf: &[u8]) -> Result<DecodeOutcome, FrameError> {
    if buf.len() < 2 {
        return Ok(DecodeOutcome::Incomplete);
    }

    let fin = buf[0] & FIN_BIT != 0;
    let opcode = OpCode::try_from(buf[0] & OPCODE_BITS)?;
    let masked = buf[1] & MASK_BIT != 0;
    let base_len = buf[1] & LENGTH_BITS;

    let mut offset = 2;
    let payload_len: u64 = match base_len {
        LENGTH_16 => {
            let Some(bytes) = buf.get(offset..offset + 2) else {
                return Ok(DecodeOutcome::Incomplete);
            };
            offset += 2;
            u64::from(u16::from_be_bytes([bytes[0], bytes[1]]))
        }
        LENGTH_64 => {
            let Some(bytes) = buf.get(offset..offset + 8) else {
                return Ok(DecodeOutcome::Incomplete);
            };
            offset += 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            u64::from_be_bytes(raw)
        }
        inline => u64::from(inline),
    };

    let mask = if masked {
        let Some(bytes) = buf.get(offset..offset + 4) else {
            return Ok(DecodeOutcome::Incomplete);
        };
        offset += 4;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    } else {
        None
    };

    let payload_len = usize::try_from(payload_len).map_err(|_| FrameError::PayloadTooLarge(payload_len))?;
    let consumed = offset
        .checked_add(payload_len)
        .ok_or(FrameError::PayloadTooLarge(payload_len as u64))?;
    if buf.len() < consumed {
        return Ok(DecodeOutcome::Incomplete);
    }

    let mut payload = BytesMut::from(&buf[offset..consumed]);
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(DecodeOutcome::Complete {
        frame: Frame {
            fin,
            opcode,
            payload: payload.freeze(),
        },
        consumed,
    })
}
