//! Per-connection identity, lifetime tracking and request framing.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count live connection workers
//! - Read one complete HTTP request (head plus `Content-Length` body) off a
//!   socket, keeping any bytes that arrived after it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::http::request::{find_subslice, HEADER_DELIMITER};
use crate::http::ParseError;

/// Size of each socket read.
pub const READ_CHUNK: usize = 4096;

/// Source of connection IDs. Only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts connection workers that are still running.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Failure while reading a request off the socket.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("socket read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A request as received: head and body bytes, plus whatever followed them in
/// the same reads.
#[derive(Debug)]
pub struct RawRequest {
    pub bytes: Bytes,
    pub leftover: BytesMut,
}

/// Read until the header delimiter, then until `Content-Length` body bytes
/// have arrived or the peer stops sending.
///
/// Returns `None` if the peer closed before sending anything.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<RawRequest>, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);

    let head_end = loop {
        if let Some(pos) = find_subslice(&buffer, HEADER_DELIMITER) {
            break pos + HEADER_DELIMITER.len();
        }
        buffer.reserve(READ_CHUNK);
        if reader.read_buf(&mut buffer).await? == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            // Let the parser reject the truncated head.
            return Ok(Some(RawRequest {
                bytes: buffer.freeze(),
                leftover: BytesMut::new(),
            }));
        }
    };

    let body_len = content_length(&buffer[..head_end])?.unwrap_or(0);
    let request_end = head_end.saturating_add(body_len);

    while buffer.len() < request_end {
        buffer.reserve(READ_CHUNK.min(request_end - buffer.len()));
        if reader.read_buf(&mut buffer).await? == 0 {
            tracing::debug!(
                expected = request_end,
                received = buffer.len(),
                "Peer closed before full body arrived"
            );
            break;
        }
    }

    let split_at = request_end.min(buffer.len());
    let bytes = buffer.split_to(split_at).freeze();
    Ok(Some(RawRequest {
        bytes,
        leftover: buffer,
    }))
}

/// `Content-Length` from a request head, matched case-insensitively.
fn content_length(head: &[u8]) -> Result<Option<usize>, ParseError> {
    let head = String::from_utf8_lossy(head);
    for line in head.split("\r\n").skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            let value = value.trim();
            return value
                .parse::<usize>()
                .map(Some)
                .map_err(|_| ParseError::InvalidContentLength(value.to_string()));
        }
    }
    Ok(None)
}
