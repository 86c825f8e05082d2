//! `multipart/form-data` body parsing.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use crate::http::request::{find_subslice, HEADER_DELIMITER};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("expected multipart/form-data")]
    NotMultipart,

    #[error("missing boundary in Content-Type")]
    MissingBoundary,
}

/// One part of a multipart body.
#[derive(Debug, Clone)]
pub struct Part {
    pub headers: HashMap<String, String>,
    pub name: Option<String>,
    pub filename: Option<String>,
    pub content: Bytes,
}

#[derive(Debug, Clone)]
pub struct Multipart {
    pub boundary: String,
    pub parts: Vec<Part>,
}

impl Multipart {
    /// First part carrying both the given field name and a filename.
    pub fn file(&self, field: &str) -> Option<&Part> {
        self.parts
            .iter()
            .find(|p| p.name.as_deref() == Some(field) && p.filename.is_some())
    }
}

/// Extract the boundary parameter from a `Content-Type` value.
pub fn boundary(content_type: &str) -> Result<String, MultipartError> {
    if !content_type.starts_with("multipart/form-data") {
        return Err(MultipartError::NotMultipart);
    }
    let (_, rest) = content_type
        .split_once("boundary=")
        .ok_or(MultipartError::MissingBoundary)?;
    let value = rest.split(';').next().unwrap_or_default().trim().trim_matches('"');
    if value.is_empty() {
        return Err(MultipartError::MissingBoundary);
    }
    Ok(value.to_string())
}

/// Split a multipart body into its parts.
pub fn parse(body: &[u8], content_type: &str) -> Result<Multipart, MultipartError> {
    let boundary = boundary(content_type)?;
    let delimiter = format!("--{boundary}").into_bytes();

    let mut chunks = Vec::new();
    let mut rest = body;
    while let Some(at) = find_subslice(rest, &delimiter) {
        chunks.push(&rest[..at]);
        rest = &rest[at + delimiter.len()..];
    }
    chunks.push(rest);

    // Everything before the first delimiter is preamble; everything after the
    // closing `--boundary--` is epilogue.
    let parts = if chunks.len() > 2 {
        chunks[1..chunks.len() - 1].iter().map(|c| parse_part(c)).collect()
    } else {
        Vec::new()
    };

    Ok(Multipart { boundary, parts })
}

fn parse_part(chunk: &[u8]) -> Part {
    let chunk = chunk.strip_prefix(b"\r\n").unwrap_or(chunk);
    let chunk = chunk.strip_suffix(b"\r\n").unwrap_or(chunk);

    let (head, content) = match find_subslice(chunk, HEADER_DELIMITER) {
        Some(at) => (&chunk[..at], &chunk[at + HEADER_DELIMITER.len()..]),
        None => (chunk, &[][..]),
    };

    let mut part = Part {
        headers: HashMap::new(),
        name: None,
        filename: None,
        content: Bytes::copy_from_slice(content),
    };

    for line in String::from_utf8_lossy(head).split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        if key.eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').map(str::trim) {
                if let Some(name) = param.strip_prefix("name=") {
                    part.name = Some(name.trim_matches('"').to_string());
                } else if let Some(filename) = param.strip_prefix("filename=") {
                    part.filename = Some(filename.trim_matches('"').to_string());
                }
            }
        }
        part.headers.insert(key.to_string(), value.to_string());
    }

    part
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPE: &str = "multipart/form-data; boundary=----XYZ";

    fn body() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"------XYZ\r\n");
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"caption\"\r\n\r\n");
        body.extend_from_slice(b"a cat\r\n");
        body.extend_from_slice(b"------XYZ\r\n");
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\n");
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(b"\x89PNG\r\n\x1a\n\x00\x01");
        body.extend_from_slice(b"\r\n------XYZ--\r\n");
        body
    }

    #[test]
    fn extracts_boundary() {
        assert_eq!(boundary(CONTENT_TYPE).unwrap(), "----XYZ");
        assert_eq!(boundary("multipart/form-data; boundary=\"abc\"").unwrap(), "abc");
        assert_eq!(boundary("text/plain"), Err(MultipartError::NotMultipart));
        assert_eq!(boundary("multipart/form-data"), Err(MultipartError::MissingBoundary));
    }

    #[test]
    fn splits_fields_and_files() {
        let multipart = parse(&body(), CONTENT_TYPE).unwrap();
        assert_eq!(multipart.parts.len(), 2);

        let caption = &multipart.parts[0];
        assert_eq!(caption.name.as_deref(), Some("caption"));
        assert_eq!(caption.filename, None);
        assert_eq!(&caption.content[..], b"a cat");

        let file = multipart.file("file").unwrap();
        assert_eq!(file.filename.as_deref(), Some("cat.png"));
        assert_eq!(file.headers.get("Content-Type").map(String::as_str), Some("image/png"));
        // binary content keeps its embedded CRLF
        assert_eq!(&file.content[..], b"\x89PNG\r\n\x1a\n\x00\x01");
    }

    #[test]
    fn body_without_delimiters_has_no_parts() {
        let multipart = parse(b"nothing here", CONTENT_TYPE).unwrap();
        assert!(multipart.parts.is_empty());
    }
}
