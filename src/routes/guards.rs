//! Authentication and XSRF stages for route pipelines.

use std::sync::Arc;

use crate::http::{Request, Response};
use crate::routing::{HandlerResult, Middleware, Next};
use crate::services::{IdentityResolver, XsrfValidator};
use crate::websocket::session::AUTH_COOKIE;

/// Form field carrying the XSRF token.
pub const XSRF_FIELD: &str = "xsrf_token";

fn reject(status: u16, message: &str) -> HandlerResult {
    let mut response = Response::new(status);
    response.text(message);
    Ok(response)
}

/// Rejects requests without a valid session with `401`; binds the identity
/// otherwise.
pub struct RequireAuth {
    identity: Arc<dyn IdentityResolver>,
}

impl RequireAuth {
    pub fn new(identity: Arc<dyn IdentityResolver>) -> Self {
        Self { identity }
    }
}

impl Middleware for RequireAuth {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> HandlerResult {
        let Some(token) = request.cookie(AUTH_COOKIE) else {
            return reject(401, "Authentication required");
        };
        let Some(user) = self.identity.resolve_identity(token) else {
            return reject(401, "Invalid or expired token");
        };
        request.user = Some(user);
        next.run(request)
    }
}

/// Binds the identity when the session resolves; never rejects.
pub struct OptionalAuth {
    identity: Arc<dyn IdentityResolver>,
}

impl OptionalAuth {
    pub fn new(identity: Arc<dyn IdentityResolver>) -> Self {
        Self { identity }
    }
}

impl Middleware for OptionalAuth {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> HandlerResult {
        request.user = request
            .cookie(AUTH_COOKIE)
            .and_then(|token| self.identity.resolve_identity(token));
        next.run(request)
    }
}

/// For authenticated requests, requires the form field `xsrf_token` to match
/// the user's token; `403` otherwise. Anonymous requests pass through.
pub struct RequireXsrf {
    validator: Arc<dyn XsrfValidator>,
}

impl RequireXsrf {
    pub fn new(validator: Arc<dyn XsrfValidator>) -> Self {
        Self { validator }
    }
}

impl Middleware for RequireXsrf {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> HandlerResult {
        let Some(user) = request.user.clone() else {
            return next.run(request);
        };

        let form = request.form_data();
        let Some(token) = form.get(XSRF_FIELD) else {
            return reject(403, "XSRF token required");
        };
        if !self.validator.validate_cross_site_token(&user, token) {
            tracing::warn!(username = %user, path = %request.path, "XSRF token rejected");
            return reject(403, "Invalid XSRF token");
        }
        next.run(request)
    }
}
