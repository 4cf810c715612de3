//! Request outcome and error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message used when a transport failure carries no message of its own.
pub const NETWORK_FALLBACK_MESSAGE: &str = "Network request failed";

/// The closed set of failure classes a gateway call can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchErrorKind {
    /// The request never got an HTTP response (DNS, refused, reset).
    NetworkError,
    /// The client-side deadline expired and the call was aborted.
    Timeout,
    /// The server answered with a non-2xx status.
    BadStatus,
    /// The server answered 2xx but the body is not the expected JSON.
    InvalidContent,
    /// Anything else. Only raised when the request cannot be encoded.
    Unknown,
}

impl FetchErrorKind {
    /// Text shown to an end user for this failure class.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::NetworkError | Self::BadStatus => "Server is unavailable :(",
            Self::Timeout => "Server timed out :(",
            Self::InvalidContent => "Unable to retrieve content :(",
            Self::Unknown => "Unknown Server error :(",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError => write!(f, "NETWORK_ERROR"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::BadStatus => write!(f, "BAD_STATUS"),
            Self::InvalidContent => write!(f, "INVALID_CONTENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Diagnostic payload attached to a [`FetchError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchErrorDetails {
    /// Raw response body text.
    Body(String),
    /// Rendering of the underlying error that caused the failure.
    Cause(String),
}

impl FetchErrorDetails {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Body(s) | Self::Cause(s) => s,
        }
    }
}

/// A classified gateway failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// HTTP status, set only for [`FetchErrorKind::BadStatus`].
    pub status: Option<u16>,
    pub details: Option<FetchErrorDetails>,
}

impl FetchError {
    /// Transport-level failure. An empty or missing message falls back to
    /// [`NETWORK_FALLBACK_MESSAGE`].
    pub fn network(message: Option<String>, cause: impl Into<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| NETWORK_FALLBACK_MESSAGE.to_string());
        Self {
            kind: FetchErrorKind::NetworkError,
            message,
            status: None,
            details: Some(FetchErrorDetails::Cause(cause.into())),
        }
    }

    pub fn timeout(timeout_ms: u128) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            message: format!("Request timed out after {timeout_ms} ms"),
            status: None,
            details: None,
        }
    }

    /// Non-2xx response. `reason` is the status line's reason phrase.
    pub fn bad_status(status: u16, reason: &str, body: String) -> Self {
        Self {
            kind: FetchErrorKind::BadStatus,
            message: format!("HTTP error {status}: {reason}"),
            status: Some(status),
            details: Some(FetchErrorDetails::Body(body)),
        }
    }

    pub fn invalid_content(message: impl Into<String>, body: String) -> Self {
        Self {
            kind: FetchErrorKind::InvalidContent,
            message: message.into(),
            status: None,
            details: Some(FetchErrorDetails::Body(body)),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Unknown,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// Shorthand for `self.kind.user_message()`.
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

/// A successful gateway call: the HTTP status and the decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSuccess<T> {
    pub status: u16,
    pub data: T,
}

impl<T> FetchSuccess<T> {
    /// Transform the payload, keeping the status.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchSuccess<U> {
        FetchSuccess {
            status: self.status,
            data: f(self.data),
        }
    }
}

/// Outcome of one gateway call. Exactly one of success or failure.
pub type FetchResult<T> = Result<FetchSuccess<T>, FetchError>;

/// Errors raised while assembling the gateway configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
