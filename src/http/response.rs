//! Response building and serialization.
//!
//! # Responsibilities
//! - Status code and reason phrase
//! - Insertion-ordered headers and `Set-Cookie` assembly
//! - Text, HTML, JSON and raw bodies
//! - Wire serialization
//!
//! # Design Decisions
//! - Header names are replaced case-insensitively so a name appears once
//! - `Content-Length` and `X-Content-Type-Options` are recomputed on every
//!   serialization, overriding anything set earlier

use serde::Serialize;

/// Reason phrase for a status code, `"Unknown"` when unlisted.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Attributes appended after `NAME=VALUE; Path=/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub max_age: Option<i64>,
}

/// An HTTP response under construction.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: &'static str,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: reason_phrase(status),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Response with a status and a raw body, no content type.
    pub fn with_body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let mut response = Self::new(status);
        response.body = body.into();
        response
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn bad_request(body: impl Into<Vec<u8>>) -> Self {
        Self::with_body(400, body)
    }

    pub fn not_found(body: impl Into<Vec<u8>>) -> Self {
        Self::with_body(404, body)
    }

    pub fn server_error(body: impl Into<Vec<u8>>) -> Self {
        Self::with_body(500, body)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &'static str {
        self.reason
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Assembled `Set-Cookie` value for a cookie name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self.reason = reason_phrase(status);
        self
    }

    /// Set a header, replacing an existing one of the same name in place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(slot) => *slot = (name, value),
            None => self.headers.push((name, value)),
        }
        self
    }

    pub fn set_cookie(&mut self, name: &str, value: &str, options: CookieOptions) -> &mut Self {
        let mut assembled = format!("{name}={value}; Path=/");
        if options.http_only {
            assembled.push_str("; HttpOnly");
        }
        if options.secure {
            assembled.push_str("; Secure");
        }
        if let Some(max_age) = options.max_age {
            assembled.push_str(&format!("; Max-Age={max_age}"));
        }

        match self.cookies.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = assembled,
            None => self.cookies.push((name.to_string(), assembled)),
        }
        self
    }

    pub fn delete_cookie(&mut self, name: &str) -> &mut Self {
        self.set_cookie(
            name,
            "",
            CookieOptions {
                max_age: Some(0),
                ..Default::default()
            },
        )
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        self.body = text.as_bytes().to_vec();
        self.set_header("Content-Type", "text/plain; charset=utf-8")
    }

    pub fn html(&mut self, html: &str) -> &mut Self {
        self.body = html.as_bytes().to_vec();
        self.set_header("Content-Type", "text/html; charset=utf-8")
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<&mut Self, serde_json::Error> {
        self.body = serde_json::to_vec(data)?;
        Ok(self.set_header("Content-Type", "application/json; charset=utf-8"))
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn redirect(&mut self, location: &str) -> &mut Self {
        self.set_status(302).set_header("Location", location)
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&mut self) -> Vec<u8> {
        let length = self.body.len().to_string();
        self.set_header("Content-Length", length);
        self.set_header("X-Content-Type-Options", "nosniff");

        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        for (_, cookie) in &self.cookies {
            head.push_str(&format!("Set-Cookie: {cookie}\r\n"));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}
