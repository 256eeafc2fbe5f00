//! Unified error handling for spycraft
//!
//! A single error type covers everything from a garbled datagram to an
//! unreadable capture file. Per-message errors are always recoverable: the
//! message is dropped and the stream continues.

use thiserror::Error;

/// Unified error type for spycraft operations
#[derive(Debug, Error)]
pub enum SpycraftError {
    /// Payload is not a SIP message (section counts, start line, ...)
    #[error("Malformed SIP message: {reason}")]
    Malformed { reason: &'static str },

    /// A bounded split ran out of room
    #[error("Capacity exhausted: {what} exceeds {limit}")]
    Capacity { what: &'static str, limit: usize },

    /// SIP message without a Call-ID header
    #[error("Missing Call-ID header")]
    MissingCallId,

    /// Response status code is not an unsigned decimal
    #[error("Invalid response status {status:?}")]
    InvalidStatus { status: String },

    /// Capture file could not be read or decoded
    #[error("Capture error on {path}: {reason}")]
    Capture { path: String, reason: String },

    /// Invalid or missing configuration
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// A pipeline stage disappeared before end of stream
    #[error("Pipeline stage {stage} closed unexpectedly")]
    ChannelClosed { stage: &'static str },

    /// Input/output error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpycraftError {
    /// Create a malformed message error
    pub fn malformed(reason: &'static str) -> Self {
        SpycraftError::Malformed { reason }
    }

    /// Create a capacity exhaustion error
    pub fn capacity(what: &'static str, limit: usize) -> Self {
        SpycraftError::Capacity { what, limit }
    }

    /// Create a capture error
    pub fn capture(path: impl Into<String>, reason: impl ToString) -> Self {
        SpycraftError::Capture {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        SpycraftError::Config {
            reason: reason.into(),
        }
    }

    /// Check if processing can continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            SpycraftError::Malformed { .. }
            | SpycraftError::Capacity { .. }
            | SpycraftError::MissingCallId
            | SpycraftError::InvalidStatus { .. } => true,
            SpycraftError::Capture { .. }
            | SpycraftError::Config { .. }
            | SpycraftError::ChannelClosed { .. }
            | SpycraftError::Io(_) => false,
        }
    }

    /// Per-message rejections that are dropped without an error log
    pub fn is_silent(&self) -> bool {
        self.is_recoverable() && !matches!(self, SpycraftError::InvalidStatus { .. })
    }

    /// Get error category for diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            SpycraftError::Malformed { .. } | SpycraftError::MissingCallId => "parsing",
            SpycraftError::InvalidStatus { .. } => "status",
            SpycraftError::Capacity { .. } => "capacity",
            SpycraftError::Capture { .. } | SpycraftError::Io(_) => "capture",
            SpycraftError::Config { .. } => "config",
            SpycraftError::ChannelClosed { .. } => "pipeline",
        }
    }
}

/// Result type for spycraft operations
pub type SpycraftResult<T> = Result<T, SpycraftError>;
