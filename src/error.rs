//! Error types for bookgen-client
//!
//! This module provides the error taxonomy for the library:
//! - Collaborator (JSON API) failures with the HTTP status and server-provided detail
//! - Status stream failures delivered to subscription handlers
//! - Artifact download failures, split into transient and terminal outcomes
//! - Title store failures (translation fan-out, alignment checks)

use thiserror::Error;

/// Result type alias for bookgen-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bookgen-client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// A JSON API call was answered with a failure
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Artifact download error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// The translation collaborator failed during custom-title insertion
    #[error("translation failed: {0}")]
    Translation(String),

    /// Candidate title sequences have diverging lengths
    #[error("title sequences are misaligned: {language} has {actual} entries, expected {expected}")]
    AlignmentViolation {
        /// Language whose sequence length differs
        language: String,
        /// Length found for that language
        actual: usize,
        /// Common length shared by the other sequences
        expected: usize,
    },

    /// Caller-side validation failed before any request was made
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No job is being tracked, or the tracked job is not in the required state
    #[error("job not ready: {0}")]
    JobNotReady(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed URL (base URL or endpoint)
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Artifact sink rejected the downloaded bytes
    #[error("failed to save artifact {filename}: {reason}")]
    SaveFailed {
        /// Filename the artifact was being saved under
        filename: String,
        /// The reason the sink gave
        reason: String,
    },
}

/// Failure reported by a JSON collaborator endpoint
///
/// `status` is 0 when the request never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status})")]
pub struct ApiError {
    /// HTTP status code, or 0 for transport failures
    pub status: u16,
    /// Message taken from the response `detail`/`message` fields
    pub message: String,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// User-facing text for this error, see [`crate::user_message::friendly_message`]
    pub fn friendly_message(&self) -> String {
        crate::user_message::friendly_message(self.status, &self.message)
    }
}

/// Artifact download errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// Server answered with a status that is worth retrying (still processing)
    #[error("server returned {status}: {message}")]
    TransientStatus {
        /// HTTP status code
        status: u16,
        /// Best-effort message derived from the response body
        message: String,
    },

    /// Server answered with a terminal failure status
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Best-effort message derived from the response body
        message: String,
    },

    /// Server answered with success but sent no bytes
    #[error("downloaded file is empty, please try again")]
    EmptyArtifact,
}

impl DownloadError {
    /// HTTP status code attached to this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            DownloadError::TransientStatus { status, .. } | DownloadError::Status { status, .. } => {
                Some(*status)
            }
            DownloadError::EmptyArtifact => None,
        }
    }

    /// The message a user should see for this failure
    pub fn message(&self) -> String {
        match self {
            DownloadError::TransientStatus { message, .. } | DownloadError::Status { message, .. } => {
                message.clone()
            }
            DownloadError::EmptyArtifact => self.to_string(),
        }
    }
}

/// Errors delivered to a status subscription's error handler
///
/// Parse failures never appear here: malformed frames are logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream could not be opened or dropped before a terminal frame
    #[error("connection error: {message}")]
    Connection {
        /// HTTP status code when the server rejected the request
        status: Option<u16>,
        /// Human-readable cause
        message: String,
    },

    /// The server sent an explicit error frame
    #[error("{0}")]
    ServerReported(String),
}

impl StreamError {
    /// The bare message, without the classification prefix
    pub fn message(&self) -> &str {
        match self {
            StreamError::Connection { message, .. } => message,
            StreamError::ServerReported(message) => message,
        }
    }
}
