//! Error types for Audiocine
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (network, download, storage, playback, etc.)
//! so callers can decide between recording a terminal state and surfacing a
//! transient message.
//!
//! ## Error Taxonomy
//!
//! ### Transient network/storage errors
//! - `NetworkError`, `UnexpectedStatusCode`, `Timeout`, `FileSizeMismatch`
//! - Recorded on the download row as FAILED; never retried automatically
//!
//! ### Playback errors
//! - `PlaybackError` - decoder or streaming failures reported by the player
//! - Surfaced to the active UI surface, session is not restarted
//!
//! ### Data-integrity errors
//! - `ContentNotFound` - a stored ContentRef no longer exists in the catalog
//! - `CatalogUnavailable` - the catalog could not be loaded at all
//!
//! ### Storage errors
//! - `SqlxError` (via `#[from]`), `MigrationFailed`, `InvalidDatabaseEntity`

use thiserror::Error;

/// Result type alias using our AudiocineError type
pub type Result<T> = std::result::Result<T, AudiocineError>;

/// Main error type for Audiocine
///
/// Each variant includes a descriptive message and the context needed to
/// present it to the user.
#[derive(Error, Debug)]
pub enum AudiocineError {
    // ===== Network Errors =====

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server returned a non-2xx status code
    #[error("Server responded with unexpected status code: {status_code}")]
    UnexpectedStatusCode {
        status_code: u16,
        url: String,
    },

    /// Invalid download URL format or protocol
    #[error("Invalid download URL: {0}")]
    InvalidDownloadUrl(String),

    /// Operation timed out
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // ===== Download Errors =====

    /// Body length did not match the advertised content length
    #[error("Download file size mismatch: expected {expected} bytes, got {actual} bytes")]
    FileSizeMismatch {
        expected: u64,
        actual: u64,
    },

    // ===== File/Storage Errors =====

    /// Generic file I/O error
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// External tool (ffprobe) missing from PATH
    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    // ===== Database Errors =====

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database record not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Row could not be converted into a valid entity
    #[error("Could not load a valid {entity_type} from database: {reason}")]
    InvalidDatabaseEntity {
        entity_type: String,
        reason: String,
    },

    // ===== Content Errors =====

    /// Content referenced by a stored ContentRef is missing from the catalog
    #[error("Content not found: {content_type} '{content_id}'")]
    ContentNotFound {
        content_id: String,
        content_type: String,
    },

    /// Catalog could not be loaded
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    // ===== Playback Errors =====

    /// Player reported a decode or streaming failure
    #[error("Playback error: {message}")]
    PlaybackError {
        message: String,
        /// Display form of the ContentRef that was playing, if known
        content: Option<String>,
    },

    /// Playlist construction produced no playable units
    #[error("Nothing to play for '{0}'")]
    EmptyPlaylist(String),

    /// Session was already released
    #[error("Media session has been released")]
    SessionReleased,

    // ===== Configuration/State Errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Application state is invalid for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration is invalid or incomplete
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ===== General Errors =====

    /// Operation was cancelled by user or system
    #[error("Operation cancelled")]
    Cancelled,

    /// A background task or channel went away
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("Configuration parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JNI bridge error (Android only)
    #[error("JNI error: {0}")]
    #[cfg(target_os = "android")]
    JniError(String),
}

impl From<std::num::ParseIntError> for AudiocineError {
    fn from(err: std::num::ParseIntError) -> Self {
        AudiocineError::InvalidInput(format!("Failed to parse integer: {}", err))
    }
}

// Helper methods for creating common errors
impl AudiocineError {
    /// Create a RecordNotFound error with a resource name
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AudiocineError::RecordNotFound(resource.into())
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        AudiocineError::InvalidInput(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        AudiocineError::InternalError(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        AudiocineError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create a PlaybackError
    pub fn playback_error<S: Into<String>>(message: S, content: Option<String>) -> Self {
        AudiocineError::PlaybackError {
            message: message.into(),
            content,
        }
    }

    /// Create an InvalidDatabaseEntity error
    pub fn invalid_entity<S: Into<String>, R: Into<String>>(entity_type: S, reason: R) -> Self {
        AudiocineError::InvalidDatabaseEntity {
            entity_type: entity_type.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is transient (the user may retry by re-enqueueing)
    ///
    /// Nothing in this crate retries automatically; this only drives how the
    /// failure is presented.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AudiocineError::NetworkError { is_transient: true, .. }
                | AudiocineError::Timeout(_)
                | AudiocineError::UnexpectedStatusCode { status_code: 500..=599, .. }
                | AudiocineError::FileSizeMismatch { .. }
                | AudiocineError::ReqwestError(_)
        )
    }

    /// Check if error means "the thing you asked for does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AudiocineError::RecordNotFound(_) | AudiocineError::ContentNotFound { .. }
        )
    }

    /// Get user-friendly error message suitable for display
    ///
    /// Download failures store this text on the FAILED row, so it must stay
    /// meaningful without the surrounding log context.
    pub fn user_message(&self) -> String {
        match self {
            AudiocineError::NetworkError { message, .. } => {
                format!("Network problem: {}. Check your connection and try again.", message)
            }
            AudiocineError::UnexpectedStatusCode { status_code, .. } => match status_code {
                401 | 403 => "The server refused access to this file. Please sign in again.".to_string(),
                404 => "This file is no longer available on the server.".to_string(),
                500..=599 => format!("The server is having trouble (HTTP {}). Please try again later.", status_code),
                _ => format!("The server responded with HTTP {}.", status_code),
            },
            AudiocineError::Timeout(seconds) => {
                format!("The server did not respond within {} seconds.", seconds)
            }
            AudiocineError::FileSizeMismatch { expected, actual } => {
                format!(
                    "Download incomplete (expected {} bytes, received {}). Please try again.",
                    expected, actual
                )
            }
            AudiocineError::ContentNotFound { .. } => {
                "This title is no longer in the catalog.".to_string()
            }
            AudiocineError::CatalogUnavailable(_) => {
                "The catalog could not be loaded. Please try again.".to_string()
            }
            AudiocineError::PlaybackError { message, .. } => {
                format!("Playback failed: {}", message)
            }
            AudiocineError::Cancelled => "Download cancelled".to_string(),
            AudiocineError::IoError(err) => match err.kind() {
                std::io::ErrorKind::StorageFull => {
                    "Not enough storage space to save this file.".to_string()
                }
                std::io::ErrorKind::PermissionDenied => {
                    "The download folder is not writable.".to_string()
                }
                _ => format!("Could not write the file: {}", err),
            },
            AudiocineError::ReqwestError(err) => {
                if err.is_timeout() {
                    "The server took too long to respond.".to_string()
                } else if err.is_connect() {
                    "Could not connect to the server. Check your connection.".to_string()
                } else {
                    format!("Network problem: {}", err)
                }
            }
            _ => self.to_string(),
        }
    }
}

// ===== IMPLEMENTATION NOTES =====
//
// - Return Result<T> = std::result::Result<T, AudiocineError> from all fallible
//   functions and propagate with `?`.
// - Background work (download workers, the session loop) never lets an error
//   escape: it is either written to a FAILED row or published on the sync bus
//   as a PLAYBACK_ERROR message, using `user_message()` for the text.
// - `anyhow` is only used by the desktop CLI.
