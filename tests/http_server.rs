//! End-to-end HTTP tests against a live server.

mod common;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{client, set_cookie, sign_up, start_server, INDEX_HTML, PASSWORD};

async fn raw_exchange(addr: std::net::SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    String::from_utf8_lossy(&reply).into_owned()
}

#[tokio::test]
async fn serves_static_files() {
    let server = start_server().await;
    let http = client();

    let index = http.get(server.url("/")).send().await.unwrap();
    assert_eq!(index.status(), 200);
    assert_eq!(index.headers()["content-type"], "text/html");
    assert_eq!(index.headers()["x-content-type-options"], "nosniff");
    assert_eq!(index.text().await.unwrap(), INDEX_HTML);

    let css = http.get(server.url("/style.css")).send().await.unwrap();
    assert_eq!(css.headers()["content-type"], "text/css");

    let missing = http.get(server.url("/nope.html")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn every_response_closes_the_connection() {
    let server = start_server().await;
    let reply = raw_exchange(server.addr, b"GET /chat-messages HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(reply.contains("Connection: close\r\n"));
    assert!(reply.ends_with("\r\n\r\n[]"));
}

#[tokio::test]
async fn malformed_request_line_is_400() {
    let server = start_server().await;
    let reply = raw_exchange(server.addr, b"NONSENSE\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn register_rejects_duplicates_and_weak_passwords() {
    let server = start_server().await;
    let http = client();
    let form = [("username", "alice"), ("password", PASSWORD)];

    let first = http.post(server.url("/register")).form(&form).send().await.unwrap();
    assert_eq!(first.status(), 201);

    let again = http.post(server.url("/register")).form(&form).send().await.unwrap();
    assert_eq!(again.status(), 400);

    let weak = http
        .post(server.url("/register"))
        .form(&[("username", "bob"), ("password", "password")])
        .send()
        .await
        .unwrap();
    assert_eq!(weak.status(), 400);

    let missing = http
        .post(server.url("/register"))
        .form(&[("username", "carol")])
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);
}

#[tokio::test]
async fn login_sets_session_cookies_and_logout_clears_them() {
    let server = start_server().await;
    let http = client();
    let session = sign_up(&server, "alice").await;

    let login = http
        .post(server.url("/login"))
        .form(&[("username", "alice"), ("password", PASSWORD)])
        .send()
        .await
        .unwrap();
    assert_eq!(set_cookie(&login, "auth").as_deref(), Some("true"));
    let raw_cookie = login
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("auth_token="))
        .unwrap()
        .to_string();
    assert!(raw_cookie.contains("HttpOnly"));
    assert!(raw_cookie.contains("Max-Age=3600"));

    let logout = http
        .post(server.url("/logout"))
        .header("Cookie", session.cookie())
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), 302);
    assert_eq!(logout.headers()["location"], "/");
    assert_eq!(set_cookie(&logout, "auth_token").as_deref(), Some(""));

    let after = http
        .get(server.url("/xsrf-token"))
        .header("Cookie", session.cookie())
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), 401);
}

#[tokio::test]
async fn authenticated_post_requires_xsrf_token() {
    let server = start_server().await;
    let http = client();
    let session = sign_up(&server, "alice").await;

    let without = http
        .post(server.url("/chat-messages"))
        .header("Cookie", session.cookie())
        .form(&[("message", "hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(without.status(), 403);

    let posted = http
        .post(server.url("/chat-messages"))
        .header("Cookie", session.cookie())
        .form(&[("message", "<b>hello</b>"), ("xsrf_token", session.xsrf_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), 201);
    let record: Value = posted.json().await.unwrap();
    assert_eq!(record["username"], "alice");
    assert_eq!(record["message"], "&lt;b&gt;hello&lt;/b&gt;");

    let history: Vec<Value> = http
        .get(server.url("/chat-messages"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history, vec![record]);
}

#[tokio::test]
async fn guests_post_as_guest() {
    let server = start_server().await;
    let http = client();

    let posted = http
        .post(server.url("/chat-messages"))
        .json(&serde_json::json!({ "message": "hi there" }))
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), 201);
    let record: Value = posted.json().await.unwrap();
    assert_eq!(record["username"], "guest");

    let empty = http
        .post(server.url("/chat-messages"))
        .json(&serde_json::json!({ "message": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
}

#[tokio::test]
async fn only_the_author_deletes_a_message() {
    let server = start_server().await;
    let http = client();
    let alice = sign_up(&server, "alice").await;
    let bob = sign_up(&server, "bob").await;

    let record: Value = http
        .post(server.url("/chat-messages"))
        .header("Cookie", alice.cookie())
        .form(&[("message", "mine"), ("xsrf_token", alice.xsrf_token.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let path = format!("/chat-messages/{}", record["id"].as_str().unwrap());

    let by_bob = http.delete(server.url(&path)).header("Cookie", bob.cookie()).send().await.unwrap();
    assert_eq!(by_bob.status(), 403);

    let anonymous = http.delete(server.url(&path)).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);

    let by_alice = http.delete(server.url(&path)).header("Cookie", alice.cookie()).send().await.unwrap();
    assert_eq!(by_alice.status(), 204);

    let gone = http.delete(server.url(&path)).header("Cookie", alice.cookie()).send().await.unwrap();
    assert_eq!(gone.status(), 404);
}

fn multipart_body(boundary: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n").as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn upload_and_download() {
    let server = start_server().await;
    let http = client();
    let session = sign_up(&server, "alice").await;
    let boundary = "----chat-test-boundary";
    let png = b"\x89PNG\r\n\x1a\n0000IHDR".to_vec();

    let anonymous = http
        .post(server.url("/upload-file"))
        .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
        .body(multipart_body(boundary, "cat.png", &png))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    let uploaded = http
        .post(server.url("/upload-file"))
        .header("Cookie", session.cookie())
        .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
        .body(multipart_body(boundary, "cat.png", &png))
        .send()
        .await
        .unwrap();
    assert_eq!(uploaded.status(), 201);
    let stored: Value = uploaded.json().await.unwrap();
    assert_eq!(stored["mime_type"], "image/png");
    assert_eq!(stored["original_filename"], "cat.png");
    assert_eq!(stored["uploaded_by"], "alice");
    assert!(stored["filename"].as_str().unwrap().ends_with(".png"));

    let download = http.get(server.url(stored["url"].as_str().unwrap())).send().await.unwrap();
    assert_eq!(download.status(), 200);
    assert_eq!(download.headers()["content-type"], "image/png");
    assert_eq!(download.headers()["cache-control"], "public, max-age=31536000");
    assert_eq!(download.bytes().await.unwrap().as_ref(), png.as_slice());

    let text_file = http
        .post(server.url("/upload-file"))
        .header("Cookie", session.cookie())
        .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
        .body(multipart_body(boundary, "notes.txt", b"just some text"))
        .send()
        .await
        .unwrap();
    assert_eq!(text_file.status(), 400);

    let missing = http.get(server.url("/uploads/absent.png")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}
