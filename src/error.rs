//! Unified error type for the clipforge service.
//!
//! Every failure mode funnels into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in clipforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied job id failed path-safety validation.
    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "artifact").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// An operation option was malformed or out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A trim or timestamp range was out of bounds.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// A remote input could not be fetched (non-2xx, timeout, oversized).
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// An inline payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// ffmpeg/ffprobe exited non-zero; `message` carries the stderr tail.
    #[error("Execution failed [{op}]: {message}")]
    Execution {
        /// The operation that was running.
        op: String,
        /// Diagnostic text captured from the tool.
        message: String,
    },

    /// An operation exceeded its wall-clock budget.
    #[error("Operation timed out [{op}] after {secs}s")]
    Timeout {
        /// The operation that was running.
        op: String,
        /// The budget that was exceeded, in seconds.
        secs: u64,
    },

    /// An I/O operation failed (includes disk-full).
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidJobId(_) => 400,
            Error::NotFound { .. } => 404,
            Error::InvalidParameter(_) => 400,
            Error::InvalidRange(_) => 400,
            Error::Fetch(_) => 502,
            Error::Decode(_) => 400,
            Error::Execution { .. } => 500,
            Error::Timeout { .. } => 504,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidJobId(_) => "invalid_job_id",
            Error::NotFound { .. } => "not_found",
            Error::InvalidParameter(_) => "invalid_parameter",
            Error::InvalidRange(_) => "invalid_range",
            Error::Fetch(_) => "fetch_failed",
            Error::Decode(_) => "decode_failed",
            Error::Execution { .. } => "execution_failed",
            Error::Timeout { .. } => "timeout",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::InvalidParameter`].
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Error::InvalidParameter(message.into())
    }

    /// Convenience constructor for [`Error::Execution`].
    pub fn execution(op: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution {
            op: op.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
