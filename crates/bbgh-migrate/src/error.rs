//! Error types for migration operations.

use thiserror::Error;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Failed to authenticate with a forge.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found on a forge.
    #[error("Not found: {0}")]
    NotFound(String),

    /// API request failed with a non-success status.
    #[error("API request failed ({status}): {message}")]
    ApiError {
        /// HTTP status code returned by the forge.
        status: u16,
        /// Response body or decoding failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimitExceeded(u64),

    /// Network error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A source identity has no usable target account (strict mode).
    #[error("Unresolved identity: {identity}")]
    UnresolvedIdentity {
        /// The Bitbucket nickname that could not be mapped.
        identity: String,
    },

    /// A source entity is missing a required field.
    #[error("Malformed source entity {reference}: {reason}")]
    MalformedSourceEntity {
        /// Marker-style reference of the entity, e.g. `issue#12`.
        reference: String,
        /// Why the entity could not be decoded.
        reason: String,
    },

    /// Publishing an attachment to the blob host failed.
    #[error("Attachment upload failed: {0}")]
    AttachmentUploadFailed(String),

    /// Failed to clone repository.
    #[error("Git clone failed: {0}")]
    GitCloneFailed(String),

    /// Failed to push repository.
    #[error("Git push failed: {0}")]
    GitPushFailed(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl MigrationError {
    /// Whether the retry layer should try the request again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ApiError { status, .. } => *status >= 500 || *status == 429,
            Self::RateLimitExceeded(_) | Self::NetworkError(_) => true,
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Short category used in the run summary.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "auth",
            Self::NotFound(_) => "not-found",
            Self::ApiError { .. } | Self::RateLimitExceeded(_) => "api",
            Self::NetworkError(_) | Self::HttpError(_) => "network",
            Self::InvalidConfig(_) | Self::YamlError(_) => "config",
            Self::UnresolvedIdentity { .. } => "identity",
            Self::MalformedSourceEntity { .. } | Self::JsonError(_) => "malformed",
            Self::AttachmentUploadFailed(_) => "attachment",
            Self::GitCloneFailed(_) | Self::GitPushFailed(_) | Self::IoError(_) => "git",
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
