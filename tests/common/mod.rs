//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chat_server::config::ServerConfig;
use chat_server::lifecycle::{build_server, Shutdown};

pub const INDEX_HTML: &str = "<!doctype html><title>chat</title>";
pub const PASSWORD: &str = "Secret1!";

/// A server on an ephemeral port with its own static and upload directories.
pub struct TestServer {
    pub addr: SocketAddr,
    pub root: PathBuf,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
        let _ = fs::remove_dir_all(&self.root);
    }
}

pub async fn start_server() -> TestServer {
    let root = std::env::temp_dir().join(format!("chat-server-test-{}", uuid::Uuid::new_v4()));
    let public = root.join("public");
    fs::create_dir_all(&public).unwrap();
    fs::write(public.join("index.html"), INDEX_HTML).unwrap();
    fs::write(public.join("style.css"), "body { margin: 0 }").unwrap();

    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.static_files.root = public.to_string_lossy().into_owned();
    config.uploads.dir = root.join("uploads").to_string_lossy().into_owned();

    let server = build_server(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(server.serve(shutdown.subscribe()));

    TestServer { addr, root, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Value of a `Set-Cookie` header for `name`.
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| {
            let pair = v.split(';').next()?;
            let (n, value) = pair.split_once('=')?;
            (n == name).then(|| value.to_string())
        })
}

/// Tokens for a freshly registered, signed-in user.
pub struct Session {
    pub auth_token: String,
    pub xsrf_token: String,
}

impl Session {
    pub fn cookie(&self) -> String {
        format!("auth_token={}", self.auth_token)
    }
}

pub async fn sign_up(server: &TestServer, username: &str) -> Session {
    let http = client();
    let form = [("username", username), ("password", PASSWORD)];

    let registered = http.post(server.url("/register")).form(&form).send().await.unwrap();
    assert_eq!(registered.status(), 201);

    let login = http.post(server.url("/login")).form(&form).send().await.unwrap();
    assert_eq!(login.status(), 200);
    let auth_token = set_cookie(&login, "auth_token").unwrap();

    let xsrf: serde_json::Value = http
        .get(server.url("/xsrf-token"))
        .header("Cookie", format!("auth_token={auth_token}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    Session {
        auth_token,
        xsrf_token: xsrf["xsrf_token"].as_str().unwrap().to_string(),
    }
}
