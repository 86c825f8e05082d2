//! HTTP server: accept loop and per-connection worker.
//!
//! # Responsibilities
//! - Accept connections until shutdown and spawn one worker per socket
//! - Read and parse one request per connection
//! - Hand upgrade requests to the WebSocket worker
//! - Dispatch everything else to the router, then static files, then 404
//! - Translate handler errors into a 500 and always close the socket
//!
//! # Design Decisions
//! - Handlers are synchronous and run on the blocking pool
//! - The worker is the only place errors become responses
//! - Every plain HTTP response carries `Connection: close`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::http::{Request, Response};
use crate::net::connection::{read_request, ConnectionTracker, ReadError};
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;
use crate::routing::{HandlerError, HandlerResult, Router};
use crate::services::{FileError, Services};
use crate::websocket::{session, ConnectionRegistry};

/// State shared by every connection worker.
pub struct AppState {
    pub router: Router,
    pub registry: ConnectionRegistry,
    pub services: Services,
    pub tracker: ConnectionTracker,
}

impl AppState {
    pub fn new(router: Router, registry: ConnectionRegistry, services: Services) -> Self {
        Self {
            router,
            registry,
            services,
            tracker: ConnectionTracker::new(),
        }
    }
}

/// The chat server's HTTP front end.
pub struct HttpServer {
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Accept connections until `shutdown` fires. Workers already running are
    /// left to finish on their own.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, routes = self.state.router.routes().len(), "HTTP server starting");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        metrics::record_connection_accepted();
                        let state = self.state.clone();
                        tokio::spawn(async move {
                            serve_connection(state, stream, peer_addr).await;
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        tracing::info!(
            active_connections = self.state.tracker.active_count(),
            "HTTP server stopped"
        );
        Ok(())
    }
}

/// Serve one accepted socket to completion.
pub async fn serve_connection<S>(state: Arc<AppState>, mut stream: S, peer_addr: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let guard = state.tracker.track();
    let connection_id = guard.id();

    let raw = match read_request(&mut stream).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return,
        Err(ReadError::Io(e)) => {
            tracing::debug!(%connection_id, %peer_addr, error = %e, "Request read failed");
            return;
        }
        Err(ReadError::Parse(e)) => {
            tracing::warn!(%connection_id, %peer_addr, error = %e, "Malformed request");
            let _ = write_response(&mut stream, Response::bad_request(e.to_string())).await;
            return;
        }
    };

    let request = match Request::parse(&raw.bytes) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(%connection_id, %peer_addr, error = %e, "Malformed request");
            let _ = write_response(&mut stream, Response::bad_request(e.to_string())).await;
            return;
        }
    };

    if request.is_websocket_upgrade() {
        tracing::debug!(%connection_id, %peer_addr, path = %request.path, "WebSocket upgrade requested");
        if let Err(e) = session::run(&state, connection_id, &request, stream, raw.leftover).await {
            tracing::debug!(%connection_id, error = %e, "WebSocket session ended with error");
        }
        return;
    }

    let start_time = Instant::now();
    let method = request.method.clone();
    let path = request.path.clone();

    let response = dispatch(state, request).await;
    let status = response.status();

    if let Err(e) = write_response(&mut stream, response).await {
        tracing::debug!(%connection_id, error = %e, "Response write failed");
    }

    metrics::record_request(&method, status, start_time);
    tracing::info!(%connection_id, %peer_addr, %method, %path, status, "Request handled");
}

/// Run the router on the blocking pool and turn any failure into a 500.
async fn dispatch(state: Arc<AppState>, request: Request) -> Response {
    let path = request.path.clone();
    match tokio::task::spawn_blocking(move || route_request(&state, request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(%path, error = %e, "Handler failed");
            Response::server_error("Internal Server Error")
        }
        Err(e) => {
            tracing::error!(%path, error = %e, "Handler panicked");
            Response::server_error("Internal Server Error")
        }
    }
}

/// Router first, then static files, then 404.
pub fn route_request(state: &AppState, mut request: Request) -> HandlerResult {
    if let Some(result) = state.router.route(&mut request) {
        return result;
    }

    match state.services.statics.serve_static_file(&request.path) {
        Ok(file) => {
            let mut response = Response::ok();
            response
                .set_header("Content-Type", file.content_type)
                .set_body(file.content.to_vec());
            Ok(response)
        }
        Err(FileError::NotFound | FileError::InvalidName) => Ok(Response::not_found("File not found")),
        Err(e) => Err(HandlerError::from(e)),
    }
}

/// Serialize a response with `Connection: close`, write it and shut the
/// write side down.
pub(crate) async fn write_response<W>(writer: &mut W, mut response: Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    response.set_header("Connection", "close");
    writer.write_all(&response.to_bytes()).await?;
    writer.flush().await?;
    writer.shutdown().await
}

#[cfg(test)]
impl AppState {
    /// State with default collaborators and no routes.
    pub(crate) fn for_tests() -> Self {
        use crate::config::ServerConfig;
        use crate::services::{FileStore, Storage};

        let config = ServerConfig::default();
        let storage = Arc::new(Storage::new(config.chat.max_message_len));
        let files = Arc::new(FileStore::new(&config.static_files, &config.uploads));
        Self::new(Router::new(), ConnectionRegistry::new(), Services::new(storage, files))
    }
}
