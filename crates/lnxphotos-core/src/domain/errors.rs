//! Domain error types
//!
//! Errors raised while constructing or validating domain values. Transport
//! and engine failures live in [`crate::error::SyncError`]; this module only
//! covers data that is malformed before any I/O happens.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid asset identifier
    #[error("Invalid asset id: {0}")]
    InvalidAssetId(String),

    /// Invalid album identifier
    #[error("Invalid album id: {0}")]
    InvalidAlbumId(String),

    /// Invalid library identifier
    #[error("Invalid library id: {0}")]
    InvalidLibraryId(String),

    /// Invalid account username (Apple ID)
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Rendition data that cannot be represented
    #[error("Invalid rendition: {0}")]
    InvalidRendition(String),

    /// Folder structure template that cannot be parsed
    #[error("Invalid folder template: {0}")]
    InvalidTemplate(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
