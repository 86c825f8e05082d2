//! WebSocket error types.

use thiserror::Error;

/// A frame header that cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("reserved opcode {0:#x}")]
    InvalidOpCode(u8),

    #[error("payload length {0} does not fit in memory")]
    PayloadTooLarge(u64),
}

/// An upgrade request that cannot be accepted. Answered with `400 Bad Request`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Upgrade header is not \"websocket\"")]
    NotWebSocket,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

/// Failure while talking to a connected client.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("socket failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection already closed")]
    Closed,

    #[error("message encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),
}
