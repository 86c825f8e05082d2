//! Application routes.
//!
//! # Routes
//! | Method | Path                  | Stages                    |
//! |--------|-----------------------|---------------------------|
//! | POST   | /register             |                           |
//! | POST   | /login                |                           |
//! | POST   | /logout               | RequireAuth               |
//! | GET    | /xsrf-token           | RequireAuth               |
//! | GET    | /chat-messages        |                           |
//! | POST   | /chat-messages        | OptionalAuth, RequireXsrf |
//! | DELETE | /chat-messages/{id}   | RequireAuth               |
//! | POST   | /upload-file          | RequireAuth               |
//! | GET    | /uploads/{filename}   |                           |
//!
//! WebSocket upgrades never reach the router; the connection worker takes
//! them on any path.

pub mod auth;
pub mod chat;
pub mod files;
pub mod guards;

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::http::Response;
use crate::routing::{HandlerResult, Middleware, RouteError, Router};
use crate::services::{FileStore, Services, Storage, StoreError};
use crate::websocket::ConnectionRegistry;

pub use guards::{OptionalAuth, RequireAuth, RequireXsrf};

/// Everything route handlers close over.
#[derive(Clone)]
pub struct RouteContext {
    pub storage: Arc<Storage>,
    pub files: Arc<FileStore>,
    pub services: Services,
    pub registry: ConnectionRegistry,
    pub auth: AuthConfig,
}

/// Register every application route.
pub fn build_router(ctx: &RouteContext) -> Result<Router, RouteError> {
    let require_auth: Arc<dyn Middleware> = Arc::new(RequireAuth::new(ctx.services.identity.clone()));
    let optional_auth: Arc<dyn Middleware> = Arc::new(OptionalAuth::new(ctx.services.identity.clone()));
    let require_xsrf: Arc<dyn Middleware> = Arc::new(RequireXsrf::new(ctx.services.xsrf.clone()));

    let mut router = Router::new();
    router
        .post("/register", auth::register(ctx.storage.clone()))?
        .post("/login", auth::login(ctx.storage.clone(), ctx.auth.clone()))?
        .register_with(
            "POST",
            "/logout",
            vec![require_auth.clone()],
            auth::logout(ctx.storage.clone()),
        )?
        .register_with(
            "GET",
            "/xsrf-token",
            vec![require_auth.clone()],
            auth::xsrf_token(ctx.storage.clone()),
        )?
        .get("/chat-messages", chat::list(ctx.services.messages.clone()))?
        .register_with(
            "POST",
            "/chat-messages",
            vec![optional_auth, require_xsrf],
            chat::post(ctx.services.messages.clone(), ctx.registry.clone()),
        )?
        .register_with(
            "DELETE",
            "/chat-messages/{id}",
            vec![require_auth.clone()],
            chat::delete(ctx.services.messages.clone()),
        )?
        .register_with(
            "POST",
            "/upload-file",
            vec![require_auth],
            files::upload(ctx.files.clone()),
        )?
        .get("/uploads/{filename}", files::download(ctx.files.clone()))?;

    Ok(router)
}

pub(crate) fn text(status: u16, body: &str) -> Response {
    let mut response = Response::new(status);
    response.text(body);
    response
}

/// Rejected writes become `400` with the reason; storage faults propagate.
pub(crate) fn store_failure(error: StoreError) -> HandlerResult {
    if error.is_rejection() {
        Ok(text(400, &error.to_string()))
    } else {
        Err(error.into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::config::ServerConfig;
    use crate::http::Request;

    fn context() -> RouteContext {
        let config = ServerConfig::default();
        let storage = Arc::new(Storage::new(config.chat.max_message_len));
        let files = Arc::new(FileStore::new(&config.static_files, &config.uploads));
        RouteContext {
            services: Services::new(storage.clone(), files.clone()),
            storage,
            files,
            registry: ConnectionRegistry::new(),
            auth: config.auth,
        }
    }

    fn call(router: &Router, raw: String) -> Response {
        let mut request = Request::parse(raw.as_bytes()).unwrap();
        router.route(&mut request).expect("route matched").unwrap()
    }

    fn form(method: &str, path: &str, headers: &str, body: &str) -> String {
        format!(
            "{method} {path} HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: {}\r\n{headers}\r\n{body}",
            body.len()
        )
    }

    fn cookie_value(set_cookie: &str) -> &str {
        let pair = set_cookie.split(';').next().unwrap_or_default();
        pair.split_once('=').map(|(_, v)| v).unwrap_or_default()
    }

    #[test]
    fn registers_every_route() {
        let router = build_router(&context()).unwrap();
        let table: Vec<_> = router.routes().iter().map(|r| (r.method(), r.pattern())).collect();
        assert_eq!(table.len(), 9);
        assert!(table.contains(&("DELETE", "/chat-messages/{id}")));
        assert!(table.contains(&("GET", "/uploads/{filename}")));
    }

    #[test]
    fn register_login_and_post() {
        let ctx = context();
        let router = build_router(&ctx).unwrap();

        let created = call(&router, form("POST", "/register", "", "username=alice&password=Secret1%21"));
        assert_eq!(created.status(), 201);

        let weak = call(&router, form("POST", "/register", "", "username=bob&password=weak"));
        assert_eq!(weak.status(), 400);

        let bad = call(&router, form("POST", "/login", "", "username=alice&password=nope"));
        assert_eq!(bad.status(), 401);

        let login = call(&router, form("POST", "/login", "", "username=alice&password=Secret1%21"));
        assert_eq!(login.status(), 200);
        let auth_cookie = login.cookie("auth_token").unwrap();
        assert!(auth_cookie.contains("HttpOnly"));
        assert!(auth_cookie.contains("Secure"));
        assert!(auth_cookie.contains("Max-Age=3600"));
        assert!(login.cookie("auth").unwrap().starts_with("auth=true"));
        let token = cookie_value(auth_cookie).to_string();

        let cookie = format!("Cookie: auth_token={token}\r\n");
        let xsrf = call(&router, format!("GET /xsrf-token HTTP/1.1\r\n{cookie}\r\n"));
        let xsrf: Value = serde_json::from_slice(xsrf.body()).unwrap();
        let xsrf = xsrf["xsrf_token"].as_str().unwrap().to_string();

        let forbidden = call(&router, form("POST", "/chat-messages", &cookie, "message=hi"));
        assert_eq!(forbidden.status(), 403);

        let posted = call(
            &router,
            form("POST", "/chat-messages", &cookie, &format!("message=hi&xsrf_token={xsrf}")),
        );
        assert_eq!(posted.status(), 201);
        let record: Value = serde_json::from_slice(posted.body()).unwrap();
        assert_eq!(record["username"], "alice");

        let id = record["id"].as_str().unwrap();
        let deleted = call(&router, format!("DELETE /chat-messages/{id} HTTP/1.1\r\n{cookie}\r\n"));
        assert_eq!(deleted.status(), 204);

        let logout = call(&router, format!("POST /logout HTTP/1.1\r\n{cookie}\r\n"));
        assert_eq!(logout.status(), 302);
        assert_eq!(logout.header("Location"), Some("/"));
        assert!(logout.cookie("auth_token").unwrap().contains("Max-Age=0"));
        assert!(ctx.services.identity.resolve_identity(&token).is_none());
    }

    #[test]
    fn guest_posts_json_or_form() {
        let ctx = context();
        let router = build_router(&ctx).unwrap();

        let json_body = r#"{"message":"from json"}"#;
        let raw = format!(
            "POST /chat-messages HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{json_body}",
            json_body.len()
        );
        let posted = call(&router, raw);
        assert_eq!(posted.status(), 201);

        let posted = call(&router, form("POST", "/chat-messages", "", "message=from+form"));
        assert_eq!(posted.status(), 201);

        let empty = call(&router, form("POST", "/chat-messages", "", "message="));
        assert_eq!(empty.status(), 400);

        let list = call(&router, "GET /chat-messages HTTP/1.1\r\n\r\n".to_string());
        let list: Vec<Value> = serde_json::from_slice(list.body()).unwrap();
        let texts: Vec<_> = list.iter().map(|m| m["message"].as_str().unwrap()).collect();
        assert_eq!(texts, vec!["from json", "from form"]);
        assert!(list.iter().all(|m| m["username"] == "guest"));
    }

    #[test]
    fn delete_requires_owner() {
        let ctx = context();
        let router = build_router(&ctx).unwrap();
        ctx.storage.register_user("bob", "Secret1!").unwrap();
        let bob = ctx.storage.login("bob", "Secret1!").unwrap();
        let record = ctx.services.messages.persist_message("alice", "mine", None).unwrap();

        let cookie = format!("Cookie: auth_token={}\r\n", bob.auth_token);
        let forbidden = call(&router, format!("DELETE /chat-messages/{} HTTP/1.1\r\n{cookie}\r\n", record.id));
        assert_eq!(forbidden.status(), 403);

        let missing = call(&router, format!("DELETE /chat-messages/nope HTTP/1.1\r\n{cookie}\r\n"));
        assert_eq!(missing.status(), 404);

        let anonymous = call(&router, format!("DELETE /chat-messages/{} HTTP/1.1\r\n\r\n", record.id));
        assert_eq!(anonymous.status(), 401);
    }

    #[test]
    fn upload_requires_multipart() {
        let ctx = context();
        let router = build_router(&ctx).unwrap();
        ctx.storage.register_user("alice", "Secret1!").unwrap();
        let tokens = ctx.storage.login("alice", "Secret1!").unwrap();
        let cookie = format!("Cookie: auth_token={}\r\n", tokens.auth_token);

        let plain = call(&router, form("POST", "/upload-file", &cookie, "file=x"));
        assert_eq!(plain.status(), 400);
        assert_eq!(plain.body(), b"Expected multipart/form-data");

        let traversal = call(&router, "GET /uploads/..secret HTTP/1.1\r\n\r\n".to_string());
        assert_eq!(traversal.status(), 400);
    }
}
