//! Error types for vocab-fetch
//!
//! This module provides the error taxonomy for the library:
//! - [`FetchError`] - per-request failures raised at the HTTP boundary
//! - [`SinkError`] - batch persistence and final combine failures
//! - [`Error`] - the crate-wide error returned by public operations
//!
//! Retryable fetch failures never leave the fetch client; they surface to the
//! pipeline only as a terminal [`FetchError::RetriesExhausted`].

use crate::types::StatusClass;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vocab-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vocab-fetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrency")
        key: Option<String>,
    },

    /// Fetch failure that escaped the retry loop
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Batch persistence or combine failure
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Word list file is structurally invalid
    #[error("invalid word list {path}: {reason}")]
    InvalidWordList {
        /// File that failed validation
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Catalog configuration is missing or malformed
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Audio decode or resample failure
    #[error("audio error: {0}")]
    Audio(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WAV encoding error
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Pipeline worker task panicked or was aborted
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Failures of a single fetch attempt
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Timeout, connection reset, DNS failure and similar
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Remote service answered with a throttling status
    #[error("rate limited (HTTP {status})")]
    RateLimited {
        /// The throttling status code (e.g. 403, 429)
        status: u16,
    },

    /// Non-success status outside the throttle set
    #[error("unexpected HTTP status {status}")]
    HttpStatus {
        /// The status code returned
        status: u16,
    },

    /// Body could not be decoded into the expected schema
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Every attempt failed; terminal outcome for the item
    #[error("giving up on '{key}' after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Item key (the word)
        key: String,
        /// Number of attempts made
        attempts: u32,
        /// Description of the final failure
        last_error: String,
    },
}

impl FetchError {
    /// True for throttling responses
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    /// How a failed attempt is classified
    pub fn status_class(&self) -> StatusClass {
        match self {
            FetchError::RateLimited { .. } => StatusClass::RateLimited,
            FetchError::TransientNetwork(_)
            | FetchError::HttpStatus { .. }
            | FetchError::MalformedResponse(_) => StatusClass::TransientError,
            FetchError::RetriesExhausted { .. } => StatusClass::FatalError,
        }
    }
}

/// Sink and encoder failures; always fatal to the run
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing a batch part failed
    #[error("failed to persist batch {seq}: {reason}")]
    Persist {
        /// Batch sequence number
        seq: usize,
        /// The reason persisting failed
        reason: String,
    },

    /// Combining the parts into the final artifact failed
    #[error("failed to combine {parts} parts into {output}: {reason}")]
    Combine {
        /// Number of parts being combined
        parts: usize,
        /// Destination artifact
        output: PathBuf,
        /// The reason combining failed
        reason: String,
    },

    /// Encoding a batch payload failed (decode, resample or WAV write)
    #[error("failed to encode batch {seq}: {reason}")]
    Encode {
        /// Batch sequence number
        seq: usize,
        /// The reason encoding failed
        reason: String,
    },

    /// The run produced nothing to write
    #[error("no output produced: {0}")]
    Empty(String),
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_helper_records_key() {
        let err = Error::config("max_concurrency", "must be at least 1");
        match err {
            Error::Config { message, key } => {
                assert_eq!(message, "must be at least 1");
                assert_eq!(key.as_deref(), Some("max_concurrency"));
            }
            other => panic!("expected Config, got {other:?}"),
        }
    }

    #[test]
    fn retries_exhausted_message_names_the_key() {
        let err = FetchError::RetriesExhausted {
            key: "abandon".into(),
            attempts: 3,
            last_error: "rate limited (HTTP 429)".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'abandon'"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn only_throttling_counts_as_rate_limited() {
        assert!(FetchError::RateLimited { status: 429 }.is_rate_limited());
        assert!(!FetchError::HttpStatus { status: 500 }.is_rate_limited());
        assert!(!FetchError::TransientNetwork("reset".into()).is_rate_limited());
    }

    #[test]
    fn attempts_are_classified_by_cause() {
        assert_eq!(
            FetchError::RateLimited { status: 403 }.status_class(),
            StatusClass::RateLimited
        );
        assert_eq!(
            FetchError::HttpStatus { status: 502 }.status_class(),
            StatusClass::TransientError
        );
        assert_eq!(
            FetchError::MalformedResponse("html".into()).status_class(),
            StatusClass::TransientError
        );
        let exhausted = FetchError::RetriesExhausted {
            key: "a".into(),
            attempts: 3,
            last_error: "x".into(),
        };
        assert_eq!(exhausted.status_class(), StatusClass::FatalError);
    }

    #[test]
    fn fetch_error_converts_into_crate_error() {
        let err: Error = FetchError::MalformedResponse("eof".into()).into();
        assert!(matches!(err, Error::Fetch(FetchError::MalformedResponse(_))));
    }

    #[test]
    fn sink_error_display_includes_context() {
        let err = SinkError::Combine {
            parts: 3,
            output: PathBuf::from("out.mp3"),
            reason: "ffmpeg exited with status 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to combine 3 parts into out.mp3: ffmpeg exited with status 1"
        );
    }
}
