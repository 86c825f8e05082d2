//! Middleware pipeline.
//!
//! Stages are composed per route at registration time. Each stage either
//! short-circuits with its own response (401, 403, ...) or hands the request
//! to the rest of the chain, which ends in the route handler.

use std::sync::Arc;

use crate::http::Request;
use crate::routing::router::{Handler, HandlerResult};

/// A pipeline stage.
pub trait Middleware: Send + Sync {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> HandlerResult;
}

/// The remainder of a pipeline.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Middleware>], handler: &'a dyn Handler) -> Self {
        Self { stages, handler }
    }

    /// Run the next stage, or the handler once the stages are exhausted.
    pub fn run(self, request: &mut Request) -> HandlerResult {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(request, Next::new(rest, self.handler)),
            None => self.handler.call(request),
        }
    }
}
