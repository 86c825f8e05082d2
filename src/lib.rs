//! Chat server library: HTTP/1.1 and WebSocket on raw TCP.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routes;
pub mod routing;
pub mod services;
pub mod websocket;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
