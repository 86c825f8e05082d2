//! Route registration and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Find the first route whose method and full path match
//! - Bind path parameters and run the route's pipeline
//!
//! # Design Decisions
//! - Explicit no-match (`None`) so the caller can fall back to static files
//! - Handlers return `Result`; errors propagate to the connection worker,
//!   which turns them into a 500

use std::sync::Arc;

use thiserror::Error;

use crate::http::{Request, Response};
use crate::routing::matcher::PathMatcher;
use crate::routing::middleware::{Middleware, Next};
use crate::routing::RouteError;
use crate::services::{FileError, StoreError};

/// Failure raised by a route handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("file failure: {0}")]
    File(#[from] FileError),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

pub type HandlerResult = Result<Response, HandlerError>;

/// A route endpoint.
pub trait Handler: Send + Sync {
    fn call(&self, request: &mut Request) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut Request) -> HandlerResult + Send + Sync,
{
    fn call(&self, request: &mut Request) -> HandlerResult {
        self(request)
    }
}

/// A registered route.
pub struct Route {
    method: String,
    matcher: PathMatcher,
    stages: Vec<Arc<dyn Middleware>>,
    handler: Box<dyn Handler>,
}

impl Route {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.matcher.pattern())
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// Ordered route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler with no middleware.
    pub fn register<H>(&mut self, method: &str, pattern: &str, handler: H) -> Result<&mut Self, RouteError>
    where
        H: Handler + 'static,
    {
        self.register_with(method, pattern, Vec::new(), handler)
    }

    /// Register a handler behind an ordered list of middleware stages.
    pub fn register_with<H>(
        &mut self,
        method: &str,
        pattern: &str,
        stages: Vec<Arc<dyn Middleware>>,
        handler: H,
    ) -> Result<&mut Self, RouteError>
    where
        H: Handler + 'static,
    {
        let matcher = PathMatcher::compile(pattern)?;
        tracing::debug!(method, pattern, stages = stages.len(), "Route registered");
        self.routes.push(Route {
            method: method.to_string(),
            matcher,
            stages,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    pub fn get<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register("GET", pattern, handler)
    }

    pub fn post<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register("POST", pattern, handler)
    }

    pub fn put<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register("PUT", pattern, handler)
    }

    pub fn delete<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register("DELETE", pattern, handler)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Dispatch to the first matching route. `None` when nothing matched.
    pub fn route(&self, request: &mut Request) -> Option<HandlerResult> {
        self.routes.iter().find_map(|route| {
            if route.method != request.method {
                return None;
            }
            let params = route.matcher.captures(&request.path)?;
            request.path_params = params;
            Some(Next::new(&route.stages, route.handler.as_ref()).run(request))
        })
    }
}
