//! Error types for the pdf-massage library.
//!
//! Two error types with two distinct audiences:
//!
//! * [`MassageError`] — returned by every document operation. It is a closed
//!   set of four kinds, each with a fixed message. Filesystem, process and
//!   HTTP errors never reach the caller directly: they are logged through
//!   `tracing` where they occur and remapped into one of these kinds.
//!
//! * [`ConfigError`] — returned only by
//!   [`crate::config::MassageConfigBuilder::build`] when a knob is out of range.
//!
//! Callers can split [`MassageError`] into "bad input" (reject the request)
//! and "tool execution problem" (maybe retry upstream) with
//! [`MassageError::is_input_error`].

use thiserror::Error;

/// Every failure a document operation can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MassageError {
    /// The locator had no URL scheme, or fetching it failed for any reason
    /// (DNS, timeout, non-2xx).
    #[error("URL provided is invalid")]
    InvalidLocator,

    /// The inspection tool rejected the bytes as unreadable or the wrong type.
    #[error("PDF file provided is invalid")]
    InvalidDocument,

    /// Rotation was requested with degrees outside {90, 180, 270}.
    #[error("Rotation degrees must be 90, 180, 270")]
    InvalidRotation,

    /// An external tool could not be run, timed out, exited non-zero, or its
    /// output could not be read back.
    #[error("External tool failed to process the document")]
    ProcessingFailure,
}

impl MassageError {
    /// Short display name for the kind, e.g. for API error payloads.
    pub fn name(&self) -> &'static str {
        match self {
            MassageError::InvalidLocator => "Invalid File URL",
            MassageError::InvalidDocument => "Invalid PDF File",
            MassageError::InvalidRotation => "Invalid Rotation Degrees",
            MassageError::ProcessingFailure => "Processing Failure",
        }
    }

    /// `true` when the caller supplied something unusable; `false` when the
    /// tool chain itself failed.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, MassageError::ProcessingFailure)
    }
}

/// Builder validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be at least 1, got {value}")]
    ZeroDensity { field: &'static str, value: u32 },

    #[error("fetch_timeout_secs must be at least 1; only tool_timeout_secs may be 0")]
    ZeroFetchTimeout,

    #[error("Tool path for {tool} is empty")]
    EmptyToolPath { tool: &'static str },

    #[error("Thumbnail format must be a short alphanumeric extension, got {0:?}")]
    InvalidThumbnailFormat(String),
}
