//! Error types for usenet-relay
//!
//! The taxonomy follows the transfer engine's failure model:
//! - precondition failures (unreadable source file) are fatal to one job,
//! - transport failures and application-level rejections are retryable,
//! - integrity failures trigger a bounded whole-attempt retry,
//! - resource failures (temp file, rename) are fatal,
//! - exhausting a retry bound is a distinct terminal error naming the
//!   operation and the number of attempts spent.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for usenet-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for usenet-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "API_TOKEN")
        key: Option<String>,
    },

    /// Upload source file could not be opened or read (precondition, never retried)
    #[error("cannot read upload source {path}: {source}")]
    SourceFile {
        /// Path of the file that was about to be uploaded
        path: PathBuf,
        /// The underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// I/O error (temp file creation, positioned writes, rename)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network/transport error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be parsed
    #[error("malformed response: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote endpoint answered with a non-success HTTP status
    #[error("{operation} returned HTTP {status}")]
    Status {
        /// The operation that received the status (e.g., "upload")
        operation: &'static str,
        /// The HTTP status code
        status: u16,
    },

    /// Remote service rejected the request at the application layer (`success: false`)
    #[error("{operation} rejected by remote service: {detail}")]
    Rejected {
        /// The operation the service rejected
        operation: &'static str,
        /// The `detail` field of the response envelope
        detail: String,
    },

    /// Assembled download failed size or digest verification
    #[error("integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    /// A retried operation failed on every attempt
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// The operation that was retried
        operation: String,
        /// How many attempts were made before giving up
        attempts: u32,
        /// The error returned by the final attempt
        #[source]
        last: Box<Error>,
    },

    /// No remote item/file matched the lookup query
    #[error("no matching remote item: {0}")]
    NotFound(String),

    /// Folder watching error
    #[error("folder watch error: {0}")]
    FolderWatch(String),

    /// Notification server error
    #[error("notification server error: {0}")]
    Server(String),
}

/// Integrity verification failures for an assembled download
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Assembled file size differs from the size the metadata promised
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size reported by the remote metadata
        expected: u64,
        /// Size of the assembled temp file
        actual: u64,
    },

    /// Assembled file digest differs from the digest the metadata promised
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Hex MD5 reported by the remote metadata
        expected: String,
        /// Hex MD5 of the assembled temp file
        actual: String,
    },
}
