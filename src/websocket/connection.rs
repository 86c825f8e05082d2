//! A live WebSocket connection as seen by other workers.
//!
//! The worker that accepted the socket keeps the read half and the receive
//! buffer to itself. What is shared through the registry is this handle: the
//! write half behind an async mutex, the identity bound at handshake time, and
//! a closed flag that only ever goes from `false` to `true`.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::net::connection::ConnectionId;
use crate::websocket::error::WsError;
use crate::websocket::frame::Frame;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct WsConnection {
    id: ConnectionId,
    identity: Option<String>,
    closed: AtomicBool,
    writer: Mutex<BoxedWriter>,
}

impl WsConnection {
    pub fn new<W>(id: ConnectionId, identity: Option<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            identity,
            closed: AtomicBool::new(false),
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Identity bound at handshake time, `None` for guests.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Name shown to other users.
    pub fn display_name(&self) -> &str {
        self.identity().unwrap_or("guest")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(connection_id = %self.id, "WebSocket marked closed");
        }
    }

    /// Write pre-encoded frame bytes. Any write failure closes the connection.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), WsError> {
        if self.is_closed() {
            return Err(WsError::Closed);
        }

        let mut writer = self.writer.lock().await;
        let result = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::debug!(connection_id = %self.id, error = %e, "WebSocket write failed");
            self.mark_closed();
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn send_frame(&self, frame: &Frame) -> Result<(), WsError> {
        self.send_raw(&frame.encode()).await
    }

    pub async fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), WsError> {
        let text = serde_json::to_string(message)?;
        self.send_frame(&Frame::text(text)).await
    }

    pub async fn send_pong(&self, payload: Bytes) -> Result<(), WsError> {
        self.send_frame(&Frame::pong(payload)).await
    }

    /// Send a close frame; the connection is closed afterwards either way.
    pub async fn send_close(&self) -> Result<(), WsError> {
        let result = self.send_frame(&Frame::close()).await;
        self.mark_closed();
        result
    }

    /// Shut down the write half.
    pub async fn shutdown(&self) {
        self.mark_closed();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
