use thiserror::Error;

use crate::models::OutcomeKind;

/// Unified error type for the Carousel library
#[derive(Error, Debug)]
pub enum CarouselError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    // Pool errors
    #[error("No proxies available")]
    NoProxiesAvailable,

    // Fetch errors
    #[error(
        "Fetch exhausted after {attempts} attempts (last outcome: {})",
        .last.map_or("none", |k| k.as_str())
    )]
    FetchExhausted {
        attempts: u32,
        last: Option<OutcomeKind>,
    },

    #[error("Fetch cancelled")]
    Cancelled,

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation timed out")]
    Timeout,

    // Dispatch errors
    #[error("Proxy connection failed: {0}")]
    ProxyConnectionFailed(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Carousel operations
pub type Result<T> = std::result::Result<T, CarouselError>;

impl CarouselError {
    /// Configuration-time errors that should abort startup rather than be retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CarouselError::InvalidConfig(_)
                | CarouselError::InvalidProxyAddress(_)
                | CarouselError::UnsupportedProtocol(_)
        )
    }

    /// Transient errors where trying again (or with another proxy) may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CarouselError::NoProxiesAvailable
                | CarouselError::Timeout
                | CarouselError::ProxyConnectionFailed(_)
                | CarouselError::Http(_)
                | CarouselError::Io(_)
        )
    }
}

// Convert from hyper errors
impl From<hyper::Error> for CarouselError {
    fn from(err: hyper::Error) -> Self {
        CarouselError::Http(err.to_string())
    }
}

// Convert from URL parse errors (request targets; proxy addresses map explicitly)
impl From<url::ParseError> for CarouselError {
    fn from(err: url::ParseError) -> Self {
        CarouselError::InvalidRequest(err.to_string())
    }
}
