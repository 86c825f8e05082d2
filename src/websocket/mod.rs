//! WebSocket subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request with Upgrade: websocket
//!     → handshake.rs (accept key, 101 response)
//!     → session.rs (per-connection worker, receive loop)
//!     → frame.rs (decode client frames, encode server frames)
//!     → messages.rs (JSON envelope dispatch)
//!     → registry.rs (broadcast, presence, signal routing)
//! ```
//!
//! # Design Decisions
//! - Server frames are never masked; client frames are unmasked when a mask
//!   is present
//! - The registry is the only state shared between connection workers

pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod messages;
pub mod registry;
pub mod session;

pub use connection::WsConnection;
pub use error::{FrameError, HandshakeError, WsError};
pub use frame::{decode, DecodeOutcome, Frame, OpCode};
pub use handshake::accept_key;
pub use registry::ConnectionRegistry;
