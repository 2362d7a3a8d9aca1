//! Error types for murmur.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
///
/// Every fallible operation in the workspace surfaces one of these variants;
/// remote failures are caught at the call site and returned as values, never
/// allowed to panic a caller.
#[derive(Debug, Error)]
pub enum AppError {
    // === Caller Errors ===
    #[error("Sign-in required")]
    AuthRequired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Remote Errors ===
    #[error("Backend rejected the request ({status}): {message}")]
    RemoteRejected {
        /// HTTP status the backend answered with.
        status: u16,
        /// Message extracted from the backend error body.
        message: String,
    },

    #[error("Backend unreachable: {0}")]
    RemoteUnavailable(String),

    #[error("Upload of {name} failed: {reason}")]
    Upload {
        /// Original file name of the failed upload.
        name: String,
        /// Why this file failed; other files in the batch may have succeeded.
        reason: String,
    },

    // === Local Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Map an HTTP status from the backend to the matching error variant.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::AuthRequired,
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            _ => Self::RemoteRejected { status, message },
        }
    }

    /// Whether this error is a uniqueness/concurrency conflict.
    ///
    /// Conflicts on relationship inserts and bucket creation mean the
    /// desired state already exists and are treated as success by callers.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether this error reports an absent row or object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_remote_error(&self) -> bool {
        matches!(
            self,
            Self::RemoteRejected { .. } | Self::RemoteUnavailable(_) | Self::Internal(_)
        )
    }
}

// === From implementations ===

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::RemoteUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::Internal(format!("Malformed backend response: {err}"))
        } else {
            Self::RemoteUnavailable(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("Invalid URL: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("Serialization error: {err}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_auth_and_conflict() {
        assert!(matches!(
            AppError::from_status(401, "jwt".into()),
            AppError::AuthRequired
        ));
        assert!(AppError::from_status(409, "dup".into()).is_conflict());
        assert!(AppError::from_status(404, "gone".into()).is_not_found());
    }

    #[test]
    fn test_from_status_other_is_remote_rejected() {
        match AppError::from_status(500, "boom".into()) {
            AppError::RemoteRejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
