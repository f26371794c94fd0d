//! Error types for openpipe
//!
//! [`CompletionError`] is the caller-facing error of a completion call. Its
//! variants decide how the interceptor reports a failure (see
//! [`CompletionError::kind`]). [`AppError`] covers configuration and setup.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

/// Error raised by a completion call
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Error returned by the wrapped provider, with its HTTP status and body
    #[error("{message}")]
    Provider {
        status: u16,
        body: Option<Value>,
        message: String,
    },

    /// Non-success status from the OpenPipe API
    #[error("OpenPipe API returned unexpected status {status}")]
    UnexpectedStatus { status: u16, content: Bytes },

    /// Error surfaced to callers after an OpenPipe API failure was reported
    ///
    /// Only the message extracted from the response body survives.
    #[error("{0}")]
    Routed(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Classification of a [`CompletionError`] used for reporting decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reported with full fidelity, re-raised unchanged
    Provider,
    /// Reported, then re-raised as [`CompletionError::Routed`]
    BackendStatus,
    /// Already converted from a backend status error
    Routed,
    /// Propagated without reporting
    Unclassified,
}

impl CompletionError {
    /// Reporting class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider { .. } => ErrorKind::Provider,
            Self::UnexpectedStatus { .. } => ErrorKind::BackendStatus,
            Self::Routed(_) => ErrorKind::Routed,
            Self::Transport(_) | Self::Decode(_) | Self::Stream(_) | Self::InvalidRequest(_) => {
                ErrorKind::Unclassified
            }
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } | Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Structured provider error body, if any
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Provider { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// Convenience alias for completion results
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Setup and configuration errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
