//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Open storage and wire services, routes and the connection registry
//! - Bind the listener and serve until shutdown
//! - Save the storage snapshot on the way out

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{validate_config, ConfigError, ServerConfig};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::net::{Listener, ListenerError};
use crate::routes::{build_router, RouteContext};
use crate::routing::RouteError;
use crate::services::{FileStore, Services, Storage, StoreError};
use crate::websocket::ConnectionRegistry;

/// Fatal errors before or while serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("storage: {0}")]
    Storage(#[from] StoreError),

    #[error("routes: {0}")]
    Routes(#[from] RouteError),

    #[error("listener: {0}")]
    Listener(#[from] ListenerError),
}

/// A bound server, ready to accept connections.
pub struct Server {
    http: HttpServer,
    listener: Listener,
    storage: Arc<Storage>,
}

impl Server {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<AppState> {
        self.http.state()
    }

    /// Serve until `shutdown` fires, then persist storage.
    pub async fn serve(self, shutdown: broadcast::Receiver<()>) -> Result<(), StartupError> {
        let served = self.http.run(self.listener, shutdown).await;
        let saved = self.storage.close();
        served?;
        saved?;
        Ok(())
    }
}

/// Build every subsystem and bind the listener.
pub async fn build_server(config: &ServerConfig) -> Result<Server, StartupError> {
    validate_config(config).map_err(ConfigError::Validation)?;

    let storage = Arc::new(Storage::open(&config.storage, &config.chat)?);
    let files = Arc::new(FileStore::new(&config.static_files, &config.uploads));
    let registry = ConnectionRegistry::new();
    let services = Services::new(storage.clone(), files.clone());

    let router = build_router(&RouteContext {
        storage: storage.clone(),
        files,
        services: services.clone(),
        registry: registry.clone(),
        auth: config.auth.clone(),
    })?;
    tracing::info!(
        routes = router.routes().len(),
        users = storage.user_count(),
        messages = storage.message_count(),
        "Subsystems initialized"
    );

    let listener = Listener::bind(&config.listener).await?;
    Ok(Server {
        http: HttpServer::new(AppState::new(router, registry, services)),
        listener,
        storage,
    })
}

/// Run the server until SIGINT or SIGTERM.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let server = build_server(&config).await?;
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(signals::wait_for_signal(shutdown));

    server.serve(receiver).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
