use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;
use uuid::Uuid;

use crate::error::{CarouselError, Result};

/// One outbound fetch, immutable once handed to the fetcher
///
/// Carries per-request overrides only; pool-wide policy (rotation strategy,
/// timeouts, backoff) lives in [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Correlation id for log lines across attempts
    pub id: Uuid,
    pub url: Url,
    pub method: Method,
    /// Header overrides applied after the dispatcher's defaults
    pub headers: HeaderMap,
    /// Attempt budget override; the configured default applies when `None`
    pub max_attempts: Option<u32>,
}

impl FetchRequest {
    /// Build a GET request for an http/https target
    pub fn get(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CarouselError::InvalidRequest(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(CarouselError::InvalidRequest(
                "missing host in URL".to_string(),
            ));
        }

        Ok(FetchRequest {
            id: Uuid::new_v4(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            max_attempts: None,
        })
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::try_from(name)
            .map_err(|e| CarouselError::InvalidRequest(format!("bad header name: {}", e)))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| CarouselError::InvalidRequest(format!("bad header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Target host; guaranteed present by [`FetchRequest::get`]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Target port, falling back to the scheme default
    pub fn port(&self) -> u16 {
        self.url
            .port_or_known_default()
            .unwrap_or(if self.is_https() { 443 } else { 80 })
    }
}
