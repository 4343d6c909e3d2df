//! Error taxonomy for the synchronization engine
//!
//! Every failure that can cross a component boundary is a [`SyncError`]
//! variant; the sync loop never inspects error strings. Each variant maps to
//! exactly one [`ErrorClass`], which is what the loop's state machine and the
//! per-asset error handling branch on.
//!
//! Adapters (transport, filesystem) convert their native errors at the
//! boundary; exceptions-as-control-flow never enter the engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification driving loop and per-asset decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; retry the operation with backoff
    Retryable,
    /// Session invalid; re-authenticate, then retry the pass
    Reauth,
    /// Throttled; retry with a longer backoff
    RateLimited,
    /// Affects only the current asset; log and continue the pass
    Skip,
    /// Unrecoverable for this configuration
    Fatal,
    /// Cooperative shutdown in progress
    Cancelled,
}

/// Engine-wide error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The service session is no longer valid
    #[error("authentication session expired")]
    AuthExpired,

    /// Sign-in was rejected
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// A two-factor code is required but none could be obtained
    #[error("two-factor authentication required")]
    MfaRequired,

    /// The submitted two-factor code was rejected
    #[error("two-factor verification failed: {0}")]
    MfaFailed(String),

    /// The service is temporarily unreachable or returned a 5xx
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service throttled us
    #[error("rate limited by service")]
    RateLimited {
        /// Server-suggested wait before retrying, when provided
        retry_after: Option<Duration>,
    },

    /// The requested resource disappeared (e.g. signed URL of a deleted asset)
    #[error("not found: {0}")]
    NotFound(String),

    /// Downloaded byte count disagrees with the rendition's declared length
    #[error("length mismatch: expected {expected_len} bytes, got {got_len}")]
    IntegrityMismatch { expected_len: u64, got_len: u64 },

    /// Local filesystem failure
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        /// True when the failure is on the output directory root itself
        fatal: bool,
    },

    /// Invalid configuration; raised before any pass begins
    #[error("configuration error: {0}")]
    Config(String),

    /// Response the client has no handling for (unexpected 4xx, malformed
    /// body); fatal because retrying cannot help
    #[error("unexpected service response: {0}")]
    Unexpected(String),

    /// Cooperative cancellation
    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    /// Filesystem error scoped to a single asset's path.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.into(),
            source,
            fatal: false,
        }
    }

    /// Filesystem error on the output directory root; fatal for the pass.
    pub fn filesystem_fatal(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.into(),
            source,
            fatal: true,
        }
    }

    /// Maps the variant to its loop-level classification.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::AuthExpired => ErrorClass::Reauth,
            SyncError::AuthFailed { .. } | SyncError::MfaRequired | SyncError::MfaFailed(_) => {
                ErrorClass::Fatal
            }
            SyncError::ServiceUnavailable(_) => ErrorClass::Retryable,
            SyncError::RateLimited { .. } => ErrorClass::RateLimited,
            SyncError::NotFound(_) | SyncError::IntegrityMismatch { .. } => ErrorClass::Skip,
            SyncError::Filesystem { fatal, .. } => {
                if *fatal {
                    ErrorClass::Fatal
                } else {
                    ErrorClass::Skip
                }
            }
            SyncError::Config(_) | SyncError::Unexpected(_) => ErrorClass::Fatal,
            SyncError::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// Returns true for errors the caller should retry with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Retryable | ErrorClass::RateLimited
        )
    }

    /// Returns true for errors that invalidate the session.
    #[must_use]
    pub fn requires_reauth(&self) -> bool {
        self.class() == ErrorClass::Reauth
    }

    /// Returns true for errors that only affect the current asset.
    #[must_use]
    pub fn is_per_asset(&self) -> bool {
        self.class() == ErrorClass::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(SyncError::AuthExpired.class(), ErrorClass::Reauth);
        assert_eq!(
            SyncError::AuthFailed {
                reason: "bad password".into()
            }
            .class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            SyncError::ServiceUnavailable("503".into()).class(),
            ErrorClass::Retryable
        );
        assert_eq!(
            SyncError::RateLimited { retry_after: None }.class(),
            ErrorClass::RateLimited
        );
        assert_eq!(
            SyncError::NotFound("gone".into()).class(),
            ErrorClass::Skip
        );
        assert_eq!(
            SyncError::IntegrityMismatch {
                expected_len: 10,
                got_len: 9
            }
            .class(),
            ErrorClass::Skip
        );
        assert_eq!(SyncError::Config("bad".into()).class(), ErrorClass::Fatal);
        assert_eq!(SyncError::Cancelled.class(), ErrorClass::Cancelled);
    }

    #[test]
    fn test_filesystem_scope() {
        let per_asset = SyncError::filesystem(
            "/out/2025/01/a.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(per_asset.is_per_asset());

        let fatal = SyncError::filesystem_fatal(
            "/out",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(fatal.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_retryable_includes_rate_limit() {
        assert!(SyncError::RateLimited { retry_after: None }.is_retryable());
        assert!(SyncError::ServiceUnavailable("x".into()).is_retryable());
        assert!(!SyncError::AuthExpired.is_retryable());
        assert!(SyncError::AuthExpired.requires_reauth());
    }

    #[test]
    fn test_display() {
        let err = SyncError::IntegrityMismatch {
            expected_len: 1000,
            got_len: 600,
        };
        assert_eq!(
            err.to_string(),
            "length mismatch: expected 1000 bytes, got 600"
        );
    }
}
