//! Request parsing.
//!
//! # Responsibilities
//! - Split the raw message at the header/body delimiter
//! - Parse the request line, headers, cookies and query string
//! - Expose case-insensitive header lookup and body decoders
//!
//! # Design Decisions
//! - Header keys are stored lowercased; duplicates keep the last value
//! - Header lines without `": "` are skipped rather than rejected
//! - Body decoders never fail: bad JSON is an empty object, bad forms are empty

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::http::error::ParseError;

/// Separator between the header block and the body.
pub const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";

/// A query parameter value. Keys repeated in the query string collapse into
/// `Multiple`, keys seen once stay `Single`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    /// First value for the key.
    pub fn first(&self) -> &str {
        match self {
            QueryValue::Single(v) => v,
            QueryValue::Multiple(vs) => vs.first().map(String::as_str).unwrap_or_default(),
        }
    }
}

/// A parsed HTTP request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    /// Path with the query string removed.
    pub path: String,
    pub version: String,
    /// Header map keyed by lowercased name.
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub query: HashMap<String, QueryValue>,
    /// Filled by the router when a route matches.
    pub path_params: HashMap<String, String>,
    pub body: Bytes,
    /// Identity bound by an authentication stage.
    pub user: Option<String>,
}

impl Request {
    /// Parse a complete HTTP message (headers plus an already fully read body).
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let delimiter_at = find_subslice(raw, HEADER_DELIMITER).ok_or(ParseError::MissingDelimiter)?;

        let head = std::str::from_utf8(&raw[..delimiter_at]).map_err(|_| ParseError::InvalidEncoding)?;
        let body = Bytes::copy_from_slice(&raw[delimiter_at + HEADER_DELIMITER.len()..]);

        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let parts: Vec<&str> = request_line.split(' ').collect();
        let [method, target, version] = parts.as_slice() else {
            return Err(ParseError::MalformedRequestLine(request_line.to_string()));
        };
        if method.is_empty() || target.is_empty() || version.is_empty() {
            return Err(ParseError::MalformedRequestLine(request_line.to_string()));
        }

        let mut request = Request {
            method: method.to_string(),
            version: version.to_string(),
            body,
            ..Default::default()
        };

        match target.split_once('?') {
            Some((path, query)) => {
                request.path = path.to_string();
                request.query = parse_query(query);
            }
            None => request.path = target.to_string(),
        }

        for line in lines {
            let Some((name, value)) = line.split_once(": ") else {
                continue;
            };
            if name.eq_ignore_ascii_case("cookie") {
                request.parse_cookies(value);
            }
            request.headers.insert(name.to_ascii_lowercase(), value.to_string());
        }

        Ok(request)
    }

    fn parse_cookies(&mut self, value: &str) {
        for cookie in value.split("; ") {
            let Some((name, value)) = cookie.split_once('=') else {
                continue;
            };
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            self.cookies.insert(name.trim().to_string(), value.to_string());
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Case-insensitive header lookup with a fallback.
    pub fn header_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.header(name).unwrap_or(default)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(QueryValue::first)
    }

    /// True when the client asked to switch to the WebSocket protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }

    /// Decode the body as JSON. Any failure yields an empty object.
    pub fn json(&self) -> Value {
        if self.body.is_empty() {
            return Value::Object(Map::new());
        }
        std::str::from_utf8(&self.body)
            .ok()
            .and_then(|text| serde_json::from_str(text).ok())
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Decode the body as `application/x-www-form-urlencoded`.
    ///
    /// Only the first value of a repeated key is kept.
    pub fn form_data(&self) -> HashMap<String, String> {
        let mut form = HashMap::new();
        if std::str::from_utf8(&self.body).is_err() {
            return form;
        }
        for (key, value) in form_urlencoded::parse(&self.body) {
            if value.is_empty() {
                continue;
            }
            form.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        form
    }
}

fn parse_query(query: &str) -> HashMap<String, QueryValue> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into_owned()),
            None => grouped.push((key.into_owned(), vec![value.into_owned()])),
        }
    }

    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                QueryValue::Single(values.remove(0))
            } else {
                QueryValue::Multiple(values)
            };
            (key, value)
        })
        .collect()
}

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
