//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → connection.rs (id, lifetime tracking, request framing)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - One worker task per accepted socket
//! - A request is framed by the header delimiter plus `Content-Length`

pub mod connection;
pub mod listener;

pub use connection::{read_request, ConnectionId, ConnectionTracker, RawRequest, ReadError};
pub use listener::{Listener, ListenerError};
