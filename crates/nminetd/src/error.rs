//! Error types for the network manager.
//!
//! Nothing in the redundancy core is fatal: these errors surface at the
//! edges (configuration, snapshot decoding, request queue) and are logged
//! or reported back to the requester.

use std::io;
use thiserror::Error;

/// Result type alias for network manager operations.
pub type Result<T> = std::result::Result<T, NetMgrError>;

/// Errors that can occur in the network manager.
#[derive(Debug, Error)]
pub enum NetMgrError {
    /// Configuration validation or parse error.
    #[error("Invalid configuration for {field}: {message}")]
    Config {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot could not be decoded.
    #[error("Invalid interface snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Worker queue is gone; the worker has stopped.
    #[error("Request queue closed")]
    QueueClosed,

    /// Request was dequeued but not processed.
    #[error("Request '{request}' failed: {message}")]
    RequestFailed {
        /// Request kind.
        request: String,
        /// Error message.
        message: String,
    },

    /// Notification delivery failed.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl NetMgrError {
    /// Creates an invalid configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a failed request error.
    pub fn request_failed(request: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            request: request.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the same request may succeed when resubmitted.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetMgrError::RequestFailed { .. } | NetMgrError::Delivery(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetMgrError::config("platform.chassis", "must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for platform.chassis: must not be empty"
        );
    }

    #[test]
    fn test_request_failed() {
        let err = NetMgrError::request_failed("update_interfaces", "worker stopping");
        assert_eq!(
            err.to_string(),
            "Request 'update_interfaces' failed: worker stopping"
        );
    }

    #[test]
    fn test_snapshot_error_from_json() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: NetMgrError = json_err.into();
        assert!(err.to_string().starts_with("Invalid interface snapshot"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(NetMgrError::request_failed("stop", "x").is_retryable());
        assert!(NetMgrError::Delivery("pipe closed".into()).is_retryable());
        assert!(!NetMgrError::QueueClosed.is_retryable());
        assert!(!NetMgrError::internal("bug").is_retryable());
    }
}
