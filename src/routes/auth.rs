//! Registration, login and logout.

use std::sync::Arc;

use serde_json::json;

use crate::config::AuthConfig;
use crate::http::{CookieOptions, Request, Response};
use crate::routes::{store_failure, text};
use crate::routing::{HandlerError, HandlerResult};
use crate::services::{Storage, StoreError};
use crate::websocket::session::AUTH_COOKIE;

/// Cookie telling the browser a session exists. Readable by scripts.
pub const AUTH_FLAG_COOKIE: &str = "auth";

fn credentials(request: &Request) -> Option<(String, String)> {
    let mut form = request.form_data();
    let username = form.remove("username")?;
    let password = form.remove("password")?;
    Some((username, password))
}

/// `POST /register`
pub fn register(storage: Arc<Storage>) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |request: &mut Request| {
        let Some((username, password)) = credentials(request) else {
            return Ok(text(400, "Username and password required"));
        };
        match storage.register_user(&username, &password) {
            Ok(()) => Ok(text(201, "User created successfully")),
            Err(e) => store_failure(e),
        }
    }
}

/// `POST /login`
pub fn login(
    storage: Arc<Storage>,
    auth: AuthConfig,
) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |request: &mut Request| {
        let Some((username, password)) = credentials(request) else {
            return Ok(text(400, "Username and password required"));
        };

        let tokens = match storage.login(&username, &password) {
            Ok(tokens) => tokens,
            Err(StoreError::InvalidCredentials) => return Ok(text(401, "Invalid credentials")),
            Err(e) => return store_failure(e),
        };

        let mut response = text(200, "Login successful");
        response
            .set_cookie(
                AUTH_COOKIE,
                &tokens.auth_token,
                CookieOptions {
                    http_only: true,
                    secure: auth.secure_cookies,
                    max_age: Some(auth.session_max_age_secs),
                },
            )
            .set_cookie(
                AUTH_FLAG_COOKIE,
                "true",
                CookieOptions {
                    max_age: Some(auth.session_max_age_secs),
                    ..Default::default()
                },
            );
        Ok(response)
    }
}

/// `POST /logout`, behind `RequireAuth`.
pub fn logout(storage: Arc<Storage>) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |request: &mut Request| {
        if let Some(token) = request.cookie(AUTH_COOKIE) {
            storage.logout(token);
        }
        tracing::info!(username = request.user.as_deref().unwrap_or_default(), "Logged out");

        let mut response = Response::new(302);
        response
            .delete_cookie(AUTH_COOKIE)
            .delete_cookie(AUTH_FLAG_COOKIE)
            .redirect("/");
        Ok(response)
    }
}

/// `GET /xsrf-token`, behind `RequireAuth`.
pub fn xsrf_token(storage: Arc<Storage>) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |request: &mut Request| {
        let user = request
            .user
            .as_deref()
            .ok_or_else(|| HandlerError::Internal("xsrf-token route reached without identity".into()))?;
        let Some(token) = storage.xsrf_token_for(user) else {
            return Ok(Response::not_found("XSRF token not found"));
        };
        let mut response = Response::ok();
        response.json(&json!({ "xsrf_token": token }))?;
        Ok(response)
    }
}
