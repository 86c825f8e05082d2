//! Collaborators consumed by the protocol core.
//!
//! # Responsibilities
//! - Define the narrow interfaces the router, WebSocket worker and
//!   middleware call into (identity lookup, message persistence, XSRF
//!   validation, static files)
//! - Provide the default implementations: [`Storage`] for users, sessions and
//!   messages, [`FileStore`] for static assets and uploads
//!
//! # Design Decisions
//! - Interfaces are synchronous; HTTP handlers run on the blocking pool
//! - [`Storage`] is constructed once at startup and passed explicitly to every
//!   component that needs it, then closed at shutdown

pub mod files;
pub mod storage;

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use files::{sniff_mime, FileStore, StoredUpload};
pub use storage::{escape_html, validate_password, LoginTokens, Storage};

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub username: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<serde_json::Value>,
}

/// A static asset ready to be sent.
#[derive(Debug, Clone)]
pub struct StaticFile {
    pub content: Bytes,
    pub content_type: &'static str,
}

/// Storage failures and rejected writes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Username already exists")]
    UsernameTaken,

    #[error(
        "Password must be at least 8 characters with uppercase, lowercase, number, \
         and special character (!@#$%^&()-_=)"
    )]
    WeakPassword,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message too long (max {max} characters)")]
    MessageTooLong { max: usize },

    #[error("Message not found")]
    MessageNotFound,

    #[error("Forbidden: You can only delete your own messages")]
    NotOwner,

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the error is a rejected request rather than a storage fault.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, StoreError::Io(_) | StoreError::Snapshot(_))
    }
}

/// File serving and upload failures.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("File not found")]
    NotFound,

    #[error("Invalid filename")]
    InvalidName,

    #[error("File size exceeds {max} byte limit")]
    TooLarge { max: usize },

    #[error("File type not allowed. Only images (JPEG, PNG, GIF) and MP4 videos are permitted.")]
    UnsupportedType,

    #[error("file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps an opaque session token to an identity.
pub trait IdentityResolver: Send + Sync {
    fn resolve_identity(&self, token: &str) -> Option<String>;
}

/// Chat message persistence.
pub trait MessageStore: Send + Sync {
    fn persist_message(
        &self,
        username: &str,
        text: &str,
        media: Option<serde_json::Value>,
    ) -> Result<MessageRecord, StoreError>;

    fn list_messages(&self) -> Vec<MessageRecord>;

    /// Delete a message owned by `username`.
    fn delete_message(&self, id: &str, username: &str) -> Result<(), StoreError>;
}

/// Cross-site request token check for state-changing requests.
pub trait XsrfValidator: Send + Sync {
    fn validate_cross_site_token(&self, identity: &str, token: &str) -> bool;
}

/// Fallback file serving when no route matches.
pub trait StaticFiles: Send + Sync {
    fn serve_static_file(&self, path: &str) -> Result<StaticFile, FileError>;
}

/// The collaborators shared by every connection worker.
#[derive(Clone)]
pub struct Services {
    pub identity: Arc<dyn IdentityResolver>,
    pub messages: Arc<dyn MessageStore>,
    pub xsrf: Arc<dyn XsrfValidator>,
    pub statics: Arc<dyn StaticFiles>,
}

impl Services {
    /// Wire every interface to the default implementations.
    pub fn new(storage: Arc<Storage>, files: Arc<FileStore>) -> Self {
        Self {
            identity: storage.clone(),
            messages: storage.clone(),
            xsrf: storage,
            statics: files,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
