//! Unified error handling for the crosspost crate
//!
//! Domain-specific errors ([`PublishError`], [`MediaError`],
//! [`SubmitError`]) stay close to their modules; this module wraps them
//! into a single [`Error`] enum for use across module boundaries, with a
//! category classification for handling strategies.

use std::io;
use thiserror::Error;

pub use crate::media::MediaError;
pub use crate::platforms::PublishError;
pub use crate::publisher::SubmitError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network and transport errors (HTTP, timeout, rate limit)
    Network,
    /// Remote platform rejections and processing failures
    Platform,
    /// Request validation failures
    Validation,
    /// Storage and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the crosspost crate
#[derive(Error, Debug)]
pub enum Error {
    /// Platform adapter errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Media validation errors
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Request submission rejections
    #[error("Submit error: {0}")]
    Submit(#[from] SubmitError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Publish(e) => match e {
                PublishError::RateLimited | PublishError::Timeout | PublishError::Http(_) => {
                    ErrorCategory::Network
                }
                PublishError::CredentialsMissing => ErrorCategory::Validation,
                _ => ErrorCategory::Platform,
            },
            Self::Media(_) | Self::Http(_) => ErrorCategory::Network,
            Self::Submit(_) => ErrorCategory::Validation,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Publish(e) => e.is_recoverable(),
            Self::Media(_) => true,
            Self::Submit(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
