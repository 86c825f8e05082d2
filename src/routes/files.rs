//! File upload and download.

use std::sync::Arc;

use crate::http::multipart::{self, MultipartError};
use crate::http::{Request, Response};
use crate::routes::text;
use crate::routing::HandlerResult;
use crate::services::{FileError, FileStore};

/// `POST /upload-file`, behind `RequireAuth`.
pub fn upload(files: Arc<FileStore>) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |request: &mut Request| {
        let content_type = request.header_or("content-type", "");
        let form = match multipart::parse(&request.body, content_type) {
            Ok(form) => form,
            Err(MultipartError::NotMultipart) => return Ok(text(400, "Expected multipart/form-data")),
            Err(MultipartError::MissingBoundary) => {
                return Ok(text(400, "Missing boundary in Content-Type"))
            }
        };

        let Some(part) = form.file("file") else {
            return Ok(text(400, "No file provided"));
        };
        let original = part.filename.as_deref().unwrap_or_default();
        let uploader = request.user.as_deref().unwrap_or_default();

        match files.save_upload(&part.content, original, uploader) {
            Ok(stored) => {
                let mut response = Response::new(201);
                response.json(&stored)?;
                Ok(response)
            }
            Err(e @ FileError::TooLarge { .. }) => Ok(text(413, &e.to_string())),
            Err(e @ FileError::UnsupportedType) => Ok(text(400, &e.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// `GET /uploads/{filename}`
pub fn download(files: Arc<FileStore>) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |request: &mut Request| {
        let filename = request.path_param("filename").unwrap_or_default();
        match files.read_upload(filename) {
            Ok(file) => {
                let mut response = Response::ok();
                response
                    .set_header("Content-Type", file.content_type)
                    .set_header("Cache-Control", "public, max-age=31536000")
                    .set_body(file.content.to_vec());
                Ok(response)
            }
            Err(FileError::InvalidName) => Ok(text(400, "Invalid filename")),
            Err(FileError::NotFound) => Ok(Response::not_found("File not found")),
            Err(e) => Err(e.into()),
        }
    }
}
