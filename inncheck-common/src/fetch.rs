//! Fetch outcomes and failure classification
//!
//! A source adapter never raises: every retrieval ends in a [`FetchResult`]. Failures
//! carry an [`ErrorKind`] which selects the wording used in the report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified reason a retrieval failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Page load or request exceeded its time budget
    Timeout,
    /// Navigation failed (bad status, browser-side error)
    NavigationError,
    /// Could not reach the browser endpoint or the source
    ConnectionError,
    /// Source presented an automated-access challenge
    CaptchaDetected,
    /// Response could not be interpreted
    MalformedResponse,
    /// Source rejected the identifier format
    InvalidFormat,
    /// Anything else, including exhausted retries
    Unknown,
}

impl ErrorKind {
    /// Classify a free-form failure message
    ///
    /// Recognized markers, checked in order:
    /// - `Timeout` / `net::ERR_TIMED_OUT` -> Timeout
    /// - `captcha` / `капча` (any case) -> CaptchaDetected
    /// - `invalid format` / `неверный формат` (any case) -> InvalidFormat
    ///
    /// Returns `None` when no marker matches.
    pub fn classify(message: &str) -> Option<Self> {
        if message.contains("Timeout") || message.contains("net::ERR_TIMED_OUT") {
            return Some(ErrorKind::Timeout);
        }

        let lowered = message.to_lowercase();
        if lowered.contains("captcha") || lowered.contains("капча") {
            return Some(ErrorKind::CaptchaDetected);
        }
        if lowered.contains("invalid format") || lowered.contains("неверный формат") {
            return Some(ErrorKind::InvalidFormat);
        }
        None
    }

    /// Classify a message, falling back to `fallback` when no marker matches
    pub fn classify_or(message: &str, fallback: ErrorKind) -> Self {
        Self::classify(message).unwrap_or(fallback)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::NavigationError => "navigation_error",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::CaptchaDetected => "captcha_detected",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::InvalidFormat => "invalid_format",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure half of a [`FetchResult`], usable as an error value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchFailure {}

/// Outcome of one adapter invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchResult<T> {
    Success(T),
    Failure { kind: ErrorKind, message: String },
}

impl<T> FetchResult<T> {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        FetchResult::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Failure whose kind is derived from the message text
    pub fn classified(message: impl Into<String>, fallback: ErrorKind) -> Self {
        let message = message.into();
        let kind = ErrorKind::classify_or(&message, fallback);
        FetchResult::Failure { kind, message }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            FetchResult::Success(_) => None,
            FetchResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn into_result(self) -> Result<T, FetchFailure> {
        match self {
            FetchResult::Success(payload) => Ok(payload),
            FetchResult::Failure { kind, message } => Err(FetchFailure { kind, message }),
        }
    }
}

impl<T> From<FetchFailure> for FetchResult<T> {
    fn from(failure: FetchFailure) -> Self {
        FetchResult::Failure {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

/// JSON reply shape: either `{ "error": "..." }` or the payload itself
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceReply<T> {
    Failed { error: String },
    Payload(T),
}

impl<T> SourceReply<T>
where
    T: for<'de> Deserialize<'de>,
{
    /// Decode a JSON reply; undecodable bodies become `MalformedResponse`
    pub fn decode(body: &str) -> FetchResult<T> {
        match serde_json::from_str::<SourceReply<T>>(body) {
            Ok(reply) => reply.into(),
            Err(e) => FetchResult::failure(
                ErrorKind::MalformedResponse,
                format!("JSON parse error: {}", e),
            ),
        }
    }
}

impl<T> From<SourceReply<T>> for FetchResult<T> {
    fn from(reply: SourceReply<T>) -> Self {
        match reply {
            SourceReply::Payload(payload) => FetchResult::Success(payload),
            SourceReply::Failed { error } => FetchResult::classified(error, ErrorKind::Unknown),
        }
    }
}
