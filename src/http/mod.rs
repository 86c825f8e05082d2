//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, per-connection worker)
//!     → request.rs (parse request line, headers, cookies, query, body)
//!     → [upgrade requests leave for the WebSocket worker]
//!     → routing layer, static files, 404
//!     → response.rs (status line, headers, cookies, body)
//!     → Send to client, close
//! ```

pub mod error;
pub mod multipart;
pub mod request;
pub mod response;
pub mod server;

pub use error::ParseError;
pub use request::{QueryValue, Request};
pub use response::{reason_phrase, CookieOptions, Response};
pub use server::{AppState, HttpServer};
