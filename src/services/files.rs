//! Static asset serving and upload storage.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{StaticFilesConfig, UploadConfig};
use crate::services::{FileError, StaticFile, StaticFiles};

const OCTET_STREAM: (&str, &str) = ("application/octet-stream", ".bin");

/// Upload types that are accepted.
const ALLOWED_UPLOAD_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "video/mp4"];

/// Metadata returned for a stored upload.
#[derive(Debug, Clone, Serialize)]
pub struct StoredUpload {
    pub id: String,
    pub filename: String,
    pub original_filename: String,
    pub mime_type: &'static str,
    pub size: usize,
    pub url: String,
    pub uploaded_by: String,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    static_root: PathBuf,
    index_file: String,
    upload_dir: PathBuf,
    max_file_size: usize,
}

impl FileStore {
    pub fn new(static_files: &StaticFilesConfig, uploads: &UploadConfig) -> Self {
        Self {
            static_root: PathBuf::from(&static_files.root),
            index_file: static_files.index_file.clone(),
            upload_dir: PathBuf::from(&uploads.dir),
            max_file_size: uploads.max_file_size,
        }
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Validate and store an uploaded file under a fresh name.
    pub fn save_upload(
        &self,
        content: &[u8],
        original_filename: &str,
        uploaded_by: &str,
    ) -> Result<StoredUpload, FileError> {
        if content.len() > self.max_file_size {
            return Err(FileError::TooLarge {
                max: self.max_file_size,
            });
        }

        let (mime_type, extension) = sniff_mime(content);
        if !ALLOWED_UPLOAD_TYPES.contains(&mime_type) {
            return Err(FileError::UnsupportedType);
        }

        fs::create_dir_all(&self.upload_dir)?;
        let id = Uuid::new_v4().to_string();
        let filename = format!("{id}{extension}");
        fs::write(self.upload_dir.join(&filename), content)?;

        tracing::info!(%filename, mime_type, size = content.len(), uploaded_by, "Upload stored");

        Ok(StoredUpload {
            url: format!("/uploads/{filename}"),
            id,
            filename,
            original_filename: original_filename.to_string(),
            mime_type,
            size: content.len(),
            uploaded_by: uploaded_by.to_string(),
        })
    }

    /// Read a stored upload by its file name.
    pub fn read_upload(&self, filename: &str) -> Result<StaticFile, FileError> {
        if filename.is_empty() {
            return Err(FileError::NotFound);
        }
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            return Err(FileError::InvalidName);
        }

        let content = read_file(&self.upload_dir.join(filename))?;
        Ok(StaticFile {
            content_type: sniff_mime(&content).0,
            content,
        })
    }
}

impl StaticFiles for FileStore {
    fn serve_static_file(&self, path: &str) -> Result<StaticFile, FileError> {
        let relative = match path.trim_start_matches('/') {
            "" => self.index_file.as_str(),
            rest => rest,
        };
        if relative.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(FileError::NotFound);
        }

        let full = self.static_root.join(relative);
        if !full.is_file() {
            return Err(FileError::NotFound);
        }

        Ok(StaticFile {
            content: read_file(&full)?,
            content_type: content_type_for_path(relative),
        })
    }
}

fn read_file(path: &Path) -> Result<Bytes, FileError> {
    match fs::read(path) {
        Ok(content) => Ok(Bytes::from(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(FileError::NotFound),
        Err(e) => Err(e.into()),
    }
}

/// Identify JPEG, PNG, GIF and MP4 by their leading bytes. Returns the MIME
/// type and the extension stored files get.
pub fn sniff_mime(data: &[u8]) -> (&'static str, &'static str) {
    if data.len() < 4 {
        return OCTET_STREAM;
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return ("image/jpeg", ".jpg");
    }
    if data.starts_with(b"\x89PNG") {
        return ("image/png", ".png");
    }
    if data.starts_with(b"GIF8") {
        return ("image/gif", ".gif");
    }
    if data.len() >= 12 && data.starts_with(&[0, 0, 0]) && &data[4..8] == b"ftyp" {
        return ("video/mp4", ".mp4");
    }
    OCTET_STREAM
}

/// Content type for a static asset, by extension. Unknown extensions are
/// served as HTML.
pub fn content_type_for_path(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "text/html",
    }
}
