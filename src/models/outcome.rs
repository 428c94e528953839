use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

/// Result of one dispatch attempt
///
/// Transient value: produced by the dispatcher, consumed by the retry
/// controller, never persisted.
#[derive(Debug)]
pub enum RequestOutcome {
    /// The target answered; payload and status are the caller's to interpret
    Success(FetchResponse),
    /// HTTP 429, optionally carrying a Retry-After hint
    RateLimited { retry_after: Option<Duration> },
    /// HTTP 403 or a captcha interstitial
    Blocked,
    /// Connection, DNS, or TLS failure before a response arrived
    NetworkError(String),
    /// No response within the configured timeout
    Timeout,
}

impl RequestOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            RequestOutcome::Success(_) => OutcomeKind::Success,
            RequestOutcome::RateLimited { .. } => OutcomeKind::RateLimited,
            RequestOutcome::Blocked => OutcomeKind::Blocked,
            RequestOutcome::NetworkError(_) => OutcomeKind::NetworkError,
            RequestOutcome::Timeout => OutcomeKind::Timeout,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }
}

/// Payload-free mirror of [`RequestOutcome`] used in diagnostics and stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    RateLimited,
    Blocked,
    NetworkError,
    Timeout,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::RateLimited => "rate_limited",
            OutcomeKind::Blocked => "blocked",
            OutcomeKind::NetworkError => "network_error",
            OutcomeKind::Timeout => "timeout",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, OutcomeKind::Success)
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw response handed back to the caller; parsing the payload is out of scope
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    /// Body as lossy UTF-8, for callers parsing text pages
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
