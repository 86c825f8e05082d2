//! WebSocket opening handshake (RFC 6455 §4.2).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};

use crate::http::Request;
use crate::websocket::error::HandshakeError;

/// GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(SHA-1(key ++ GUID))`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The `101 Switching Protocols` reply for a client key.
pub fn handshake_response(client_key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(client_key)
    )
    .into_bytes()
}

/// Check an upgrade request and return its `Sec-WebSocket-Key`.
pub fn client_key(request: &Request) -> Result<&str, HandshakeError> {
    if !request.is_websocket_upgrade() {
        return Err(HandshakeError::NotWebSocket);
    }
    request
        .header("sec-websocket-key")
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(HandshakeError::MissingKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_accept_key_vector() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn response_has_no_body() {
        let response = String::from_utf8(handshake_response("dGhlIHNhbXBsZSBub25jZQ==")).unwrap();
        assert_eq!(
            response,
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
        );
    }

    #[test]
    fn requires_upgrade_and_key() {
        let ok = Request::parse(
            b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Key: abc==\r\n\r\n",
        )
        .unwrap();
        assert_eq!(client_key(&ok), Ok("abc=="));

        let no_key = Request::parse(b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\n\r\n").unwrap();
        assert_eq!(client_key(&no_key), Err(HandshakeError::MissingKey));

        let no_upgrade = Request::parse(b"GET /ws HTTP/1.1\r\nSec-WebSocket-Key: abc==\r\n\r\n").unwrap();
        assert_eq!(client_key(&no_upgrade), Err(HandshakeError::NotWebSocket));
    }
}
