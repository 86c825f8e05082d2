//! The per-connection WebSocket worker.
//!
//! # Data Flow
//! ```text
//! upgrade request
//!     → handshake (400 and close on rejection)
//!     → 101 Switching Protocols
//!     → register, welcome, presence broadcast
//!     → receive loop: read → decode → advance → dispatch
//!     → unregister, presence broadcast
//! ```
//!
//! # Design Decisions
//! - The worker owns the read half and the receive buffer; only the write
//!   half is shared through the registry
//! - The buffer advances by exactly the byte count the decoder reports, for
//!   every frame, and decoding repeats until it reports incomplete
//! - Continuation frames are not reassembled; they are ignored like binary
//!   and pong frames

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::server::{write_response, AppState};
use crate::http::{Request, Response};
use crate::net::connection::{ConnectionId, READ_CHUNK};
use crate::observability::metrics;
use crate::websocket::connection::WsConnection;
use crate::websocket::error::WsError;
use crate::websocket::frame::{self, DecodeOutcome, Frame, OpCode};
use crate::websocket::handshake;
use crate::websocket::messages::{self, ServerMessage};

/// Cookie carrying the session token.
pub const AUTH_COOKIE: &str = "auth_token";

enum Flow {
    Continue,
    Stop,
}

/// Run the upgrade handshake and then serve the connection until it closes.
///
/// `leftover` holds bytes that arrived after the upgrade request and seeds
/// the receive buffer.
pub async fn run<S>(
    state: &AppState,
    id: ConnectionId,
    request: &Request,
    stream: S,
    leftover: BytesMut,
) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let key = match handshake::client_key(request) {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "WebSocket handshake rejected");
            write_response(&mut writer, Response::bad_request(e.to_string())).await?;
            return Ok(());
        }
    };

    let identity = request
        .cookie(AUTH_COOKIE)
        .and_then(|token| state.services.identity.resolve_identity(token));

    writer.write_all(&handshake::handshake_response(key)).await?;
    writer.flush().await?;

    let conn = Arc::new(WsConnection::new(id, identity, writer));
    state.registry.add(conn.clone());
    tracing::info!(
        connection_id = %id,
        username = conn.display_name(),
        connections = state.registry.len(),
        "WebSocket connection opened"
    );

    let welcome = ServerMessage::Welcome {
        username: conn.display_name(),
    };
    if let Err(e) = conn.send_json(&welcome).await {
        tracing::debug!(connection_id = %id, error = %e, "Welcome not delivered");
    }
    messages::broadcast_online_users(&state.registry).await;

    receive_loop(state, &conn, &mut reader, leftover).await;

    state.registry.remove(id);
    conn.shutdown().await;
    tracing::info!(connection_id = %id, username = conn.display_name(), "WebSocket connection closed");
    messages::broadcast_online_users(&state.registry).await;
    Ok(())
}

async fn receive_loop<R>(state: &AppState, conn: &WsConnection, reader: &mut R, mut buffer: BytesMut)
where
    R: AsyncRead + Unpin,
{
    loop {
        loop {
            match frame::decode(&buffer) {
                Ok(DecodeOutcome::Complete { frame, consumed }) => {
                    buffer.advance(consumed);
                    if let Flow::Stop = handle_frame(state, conn, frame).await {
                        return;
                    }
                }
                Ok(DecodeOutcome::Incomplete) => break,
                Err(e) => {
                    tracing::warn!(connection_id = %conn.id(), error = %e, "Undecodable frame");
                    conn.mark_closed();
                    return;
                }
            }
        }

        if conn.is_closed() {
            return;
        }

        buffer.reserve(READ_CHUNK);
        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                tracing::debug!(connection_id = %conn.id(), "Peer closed the socket");
                conn.mark_closed();
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "WebSocket read failed");
                conn.mark_closed();
                return;
            }
        }
    }
}

async fn handle_frame(state: &AppState, conn: &WsConnection, frame: Frame) -> Flow {
    metrics::record_ws_frame(frame.opcode.as_str());

    match frame.opcode {
        OpCode::Close => {
            if let Err(e) = conn.send_close().await {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Close reply not delivered");
            }
            Flow::Stop
        }
        OpCode::Ping => match conn.send_pong(frame.payload).await {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Stop,
        },
        OpCode::Text => {
            let Ok(text) = std::str::from_utf8(&frame.payload) else {
                tracing::warn!(connection_id = %conn.id(), "Text frame is not valid UTF-8");
                return Flow::Continue;
            };
            let result =
                messages::dispatch(conn, text, &state.registry, state.services.messages.as_ref()).await;
            if let Err(e) = result {
                tracing::warn!(connection_id = %conn.id(), error = %e, "Ignoring message");
            }
            Flow::Continue
        }
        OpCode::Binary | OpCode::Pong | OpCode::Continuation => {
            tracing::debug!(
                connection_id = %conn.id(),
                opcode = frame.opcode.as_str(),
                len = frame.payload.len(),
                "Ignoring frame"
            );
            Flow::Continue
        }
    }
}
