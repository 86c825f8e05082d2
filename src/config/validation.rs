//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.static_files.root.trim().is_empty() {
        errors.push(ValidationError::new("static_files.root", "must not be empty"));
    }

    let index = &config.static_files.index_file;
    if index.is_empty() || index.contains("..") || index.starts_with('/') {
        errors.push(ValidationError::new(
            "static_files.index_file",
            "must be a relative file name inside the static root",
        ));
    }

    if config.uploads.dir.trim().is_empty() {
        errors.push(ValidationError::new("uploads.dir", "must not be empty"));
    }

    if config.uploads.max_file_size == 0 {
        errors.push(ValidationError::new("uploads.max_file_size", "must be greater than 0"));
    }

    if config.auth.session_max_age_secs <= 0 {
        errors.push(ValidationError::new(
            "auth.session_max_age_secs",
            "must be greater than 0",
        ));
    }

    if config.chat.max_message_len == 0 {
        errors.push(ValidationError::new("chat.max_message_len", "must be greater than 0"));
    }

    if let Some(path) = &config.storage.snapshot_path {
        if path.trim().is_empty() {
            errors.push(ValidationError::new("storage.snapshot_path", "must not be empty when set"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
