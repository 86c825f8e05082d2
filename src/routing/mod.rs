//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed Request (method, path)
//!     → router.rs (first route by registration order)
//!     → matcher.rs (anchored pattern, capture path params)
//!     → middleware.rs (ordered stages, may short-circuit)
//!     → handler → Response
//!     → or NoMatch (caller falls back to static files)
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at registration, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins

pub mod matcher;
pub mod middleware;
pub mod router;

use thiserror::Error;

pub use matcher::PathMatcher;
pub use middleware::{Middleware, Next};
pub use router::{Handler, HandlerError, HandlerResult, Route, Router};

/// A route pattern that could not be compiled.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route pattern {pattern:?} repeats parameter {name:?}")]
    DuplicateParam { pattern: String, name: String },
}
