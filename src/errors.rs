/*!
 * Error types for the subtrans application.
 *
 * Every provider call resolves to a tagged outcome: a payload, or one of the
 * `ProviderError` variants below. Callers branch on the variant instead of
 * inspecting messages.
 */

use thiserror::Error;

/// Classified failure of a single provider call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Quota exhausted or service temporarily unavailable, safe to resubmit
    #[error("Retriable provider error: {0}")]
    Retriable(String),

    /// Any other provider failure
    #[error("Fatal provider error: {0}")]
    Fatal(String),

    /// The provider answered but the payload does not have the expected structure
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the identical request may be resubmitted
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }

    /// Turn a retriable error into a fatal one once retrying is not allowed
    pub fn into_fatal(self, reason: &str) -> Self {
        match self {
            Self::Retriable(message) => Self::Fatal(format!("{} after: {}", reason, message)),
            other => other,
        }
    }

    /// Classify an HTTP status code and provider status string.
    ///
    /// 429 / `RESOURCE_EXHAUSTED` and 503 / `UNAVAILABLE` are transient,
    /// everything else is fatal.
    pub fn from_status(status_code: u16, status: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let transient = matches!(status_code, 429 | 503)
            || matches!(status, "RESOURCE_EXHAUSTED" | "UNAVAILABLE");
        if transient {
            Self::Retriable(format!("{} {} - {}", status_code, status, message))
        } else {
            Self::Fatal(format!("{} {} - {}", status_code, status, message))
        }
    }
}

/// Errors raised by the admission controller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdmissionError {
    /// The request alone costs more than the tokens-per-minute quota
    #[error("Request of {cost} tokens can never fit a quota of {quota} tokens per window")]
    ExceedsQuota {
        /// Estimated request cost
        cost: u64,
        /// Configured tokens-per-minute quota
        quota: u64,
    },
}

impl From<AdmissionError> for ProviderError {
    fn from(error: AdmissionError) -> Self {
        Self::Fatal(error.to_string())
    }
}

/// Errors that end the translation of one file
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// Non-retriable provider failure
    #[error("{request_id}: {source}")]
    Provider {
        /// Request that failed
        request_id: String,
        /// Underlying provider error
        source: ProviderError,
    },

    /// Malformed response at the minimum sub-batch size
    #[error("{request_id}: malformed response at minimum request size: {message}")]
    Malformed {
        /// Request that failed
        request_id: String,
        /// What was wrong with the payload
        message: String,
    },

    /// Too many chunks came back with the wrong line count to correct
    #[error("{filename}: translation does not match original structure ({misaligned} misaligned chunks, at most {limit} can be corrected)")]
    Misalignment {
        /// File being translated
        filename: String,
        /// Number of misaligned chunks
        misaligned: usize,
        /// Correction threshold
        limit: usize,
    },
}

/// Errors raised while reading or rebuilding a subtitle document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// The input does not look like the expected subtitle format
    #[error("Invalid {format} format: {message}")]
    InvalidFormat {
        /// Format name
        format: &'static str,
        /// Reason
        message: String,
    },

    /// Reassembly received a different number of lines than were extracted
    #[error("Lines count mismatch: expected {expected}, got {actual}")]
    LineCountMismatch {
        /// Extracted dialogue line count
        expected: usize,
        /// Received line count
        actual: usize,
    },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a document
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
