//! Error types for webhook delivery operations.
//!
//! Most failures that happen during an attempt are captured in the
//! `DeliveryRun` rather than returned. These variants still describe them,
//! so the recorded `error_message` and the log fields use the same wording.

use std::{fmt, time::Duration};

use gdc_core::CoreError;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for webhook delivery operations.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Event type outside the supported set.
    #[error("Unknown event_type: {event_type}")]
    InvalidEventType {
        /// The rejected name
        event_type: String,
    },

    /// Delivery cannot proceed with the current configuration.
    #[error("{message}")]
    ConfigurationError {
        /// What is misconfigured
        message: String,
    },

    /// Connection-level failure before a response was received.
    #[error("transport error: {message}")]
    TransportError {
        /// Error message describing the failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured per-request timeout in milliseconds
        timeout_ms: u64,
    },

    /// The endpoint answered with a non-2xx status.
    #[error("remote rejected delivery: HTTP {status_code}")]
    RemoteRejection {
        /// HTTP status code
        status_code: u16,
    },

    /// Run ledger or audit sink failure.
    #[error("storage error: {message}")]
    StorageError {
        /// Storage error message
        message: String,
    },

    /// Unexpected internal error.
    #[error("internal delivery error: {message}")]
    InternalError {
        /// Internal error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates an invalid event type error.
    pub fn invalid_event_type(event_type: impl Into<String>) -> Self {
        Self::InvalidEventType { event_type: event_type.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates a transport error from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX) }
    }

    /// Creates a remote rejection for a non-2xx status.
    pub fn remote_rejection(status_code: u16) -> Self {
        Self::RemoteRejection { status_code }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError { message: message.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Whether another attempt could succeed.
    ///
    /// Transport failures, timeouts and remote rejections are transient.
    /// Configuration problems and unknown event types are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportError { .. } | Self::Timeout { .. } | Self::RemoteRejection { .. } => {
                true
            },

            Self::InvalidEventType { .. }
            | Self::ConfigurationError { .. }
            | Self::StorageError { .. }
            | Self::InternalError { .. } => false,
        }
    }
}

impl From<CoreError> for DeliveryError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidEventType(event_type) => Self::InvalidEventType { event_type },
            other => Self::storage(other.to_string()),
        }
    }
}

/// Category of delivery error for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller passed something unsupported.
    Validation,
    /// Configuration problems.
    Configuration,
    /// Network connectivity issues.
    Network,
    /// Non-2xx answers.
    Remote,
    /// Ledger or audit persistence.
    Storage,
    /// Internal system errors.
    Internal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::InvalidEventType { .. } => Self::Validation,
            DeliveryError::ConfigurationError { .. } => Self::Configuration,
            DeliveryError::TransportError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::RemoteRejection { .. } => Self::Remote,
            DeliveryError::StorageError { .. } => Self::Storage,
            DeliveryError::InternalError { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Configuration => write!(f, "configuration"),
            Self::Network => write!(f, "network"),
            Self::Remote => write!(f, "remote"),
            Self::Storage => write!(f, "storage"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
