//! Request dispatch through rotating proxies
//!
//! One outbound HTTP call per dispatch: pick headers, dial (directly or
//! through the chosen proxy), classify the result. Retries are the
//! fetcher's job.

pub mod agent;
pub mod transport;

pub use agent::{
    RandomUserAgentProvider, StaticUserAgentProvider, UserAgentProvider,
};
pub use transport::ProxyTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::header::{HeaderValue, HOST, PROXY_AUTHORIZATION, RETRY_AFTER};
use http::{HeaderMap, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};

use crate::config::FetchConfig;
use crate::error::{CarouselError, Result};
use crate::models::{FetchRequest, FetchResponse, ProxyEndpoint, RequestOutcome};

use self::transport::Connection;

/// Capability to perform one dispatch attempt
///
/// The fetcher depends on this seam, not on the HTTP stack, so the retry
/// state machine is testable with a scripted double.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        request: &FetchRequest,
        proxy: Option<&ProxyEndpoint>,
    ) -> RequestOutcome;
}

/// Configuration for the HTTP dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Timeout for dialing the proxy/target
    pub connect_timeout: Duration,
    /// Timeout for the whole attempt
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&FetchConfig> for DispatcherConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
        }
    }
}

/// Dispatcher backed by hyper's low-level HTTP/1.1 client
pub struct HttpDispatcher {
    config: DispatcherConfig,
    agents: Arc<dyn UserAgentProvider>,
    tls: TlsConnector,
}

impl HttpDispatcher {
    pub fn new(config: DispatcherConfig, agents: Arc<dyn UserAgentProvider>) -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            config,
            agents,
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    /// Perform the call; every error maps to a failure outcome upstream
    async fn send(
        &self,
        request: &FetchRequest,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<FetchResponse> {
        let host = request.host().to_string();
        let port = request.port();

        // Plain-http targets go through HTTP proxies in absolute form
        // rather than a CONNECT tunnel.
        let absolute_form = !request.is_https()
            && proxy.map(|p| p.protocol.is_http()).unwrap_or(false);

        let stream = self.dial(request, proxy, absolute_form, &host, port).await?;

        let stream: Box<dyn Connection> = if request.is_https() {
            let server_name = ServerName::try_from(host.clone())
                .map_err(|e| CarouselError::Tls(format!("invalid server name: {}", e)))?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| CarouselError::Tls(format!("handshake failed: {}", e)))?;
            Box::new(tls_stream)
        } else {
            stream
        };

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| {
                CarouselError::ProxyConnectionFailed(format!("handshake failed: {}", e))
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Connection ended: {}", e);
            }
        });

        let http_request = self.build_request(request, proxy, absolute_form, &host, port)?;
        let response = sender.send_request(http_request).await.map_err(|e| {
            CarouselError::ProxyConnectionFailed(format!("request failed: {}", e))
        })?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| {
                CarouselError::ProxyConnectionFailed(format!("failed to read response: {}", e))
            })?
            .to_bytes();

        Ok(FetchResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    async fn dial(
        &self,
        request: &FetchRequest,
        proxy: Option<&ProxyEndpoint>,
        absolute_form: bool,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn Connection>> {
        let connect = async {
            match proxy {
                None => ProxyTransport::connect_direct(host, port).await,
                Some(p) if absolute_form => ProxyTransport::connect_proxy_plain(p).await,
                Some(p) => ProxyTransport::connect_via(p, host, port).await,
            }
        };

        timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| {
                CarouselError::ProxyConnectionFailed(format!(
                    "connect to {}:{} timed out",
                    request.host(),
                    request.port()
                ))
            })?
    }

    fn build_request(
        &self,
        request: &FetchRequest,
        proxy: Option<&ProxyEndpoint>,
        absolute_form: bool,
        host: &str,
        port: u16,
    ) -> Result<Request<Full<Bytes>>> {
        let uri: Uri = if absolute_form {
            request.url.as_str().parse()
        } else {
            request.url[url::Position::BeforePath..].parse()
        }
        .map_err(|e: http::uri::InvalidUri| {
            CarouselError::InvalidRequest(format!("bad target URI: {}", e))
        })?;

        let mut http_request = Request::builder()
            .method(request.method.clone())
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| CarouselError::InvalidRequest(format!("failed to build request: {}", e)))?;

        let default_port = if request.is_https() { 443 } else { 80 };
        let host_value = if port == default_port {
            host.to_string()
        } else {
            format!("{}:{}", host, port)
        };

        let headers = http_request.headers_mut();
        let profile = agent::random_profile();
        for (name, value) in agent::default_headers(&profile, &self.agents.next()) {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }
        headers.insert(
            HOST,
            HeaderValue::from_str(&host_value)
                .map_err(|e| CarouselError::InvalidRequest(format!("bad host: {}", e)))?,
        );
        // Caller overrides win over the generated defaults
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        if absolute_form {
            if let Some(credential) = proxy.and_then(ProxyTransport::proxy_authorization) {
                headers.insert(
                    PROXY_AUTHORIZATION,
                    HeaderValue::from_str(&credential).map_err(|e| {
                        CarouselError::InvalidRequest(format!("bad proxy credential: {}", e))
                    })?,
                );
            }
        }

        Ok(http_request)
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    #[instrument(skip(self, request), fields(request = %request.id, url = %request.url))]
    async fn dispatch(
        &self,
        request: &FetchRequest,
        proxy: Option<&ProxyEndpoint>,
    ) -> RequestOutcome {
        match timeout(self.config.request_timeout, self.send(request, proxy)).await {
            Err(_) => RequestOutcome::Timeout,
            Ok(Err(e)) => RequestOutcome::NetworkError(e.to_string()),
            Ok(Ok(response)) => classify(response),
        }
    }
}

/// Markers of a captcha interstitial served with a 2xx status
const BLOCK_MARKERS: &[&str] = &["/sorry/index", "g-recaptcha", "unusual traffic from"];

/// How much of the body the block heuristic inspects
const BLOCK_SNIFF_LIMIT: usize = 16 * 1024;

/// Map a completed HTTP exchange to an outcome.
///
/// The table: 429 is rate limiting (Retry-After honored when parseable),
/// 403 is a block, a 2xx carrying a captcha interstitial is a block, and
/// everything else that produced a response is a success whose status the
/// caller interprets.
pub fn classify(response: FetchResponse) -> RequestOutcome {
    if response.status.as_u16() == 429 {
        return RequestOutcome::RateLimited {
            retry_after: parse_retry_after(&response.headers),
        };
    }
    if response.status.as_u16() == 403 {
        return RequestOutcome::Blocked;
    }
    if response.status.is_success() && body_looks_blocked(&response.body) {
        return RequestOutcome::Blocked;
    }
    RequestOutcome::Success(response)
}

/// Parse Retry-After as delta-seconds or an HTTP-date
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let when = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    (when.with_timezone(&Utc) - Utc::now()).to_std().ok()
}

fn body_looks_blocked(body: &Bytes) -> bool {
    let window = &body[..body.len().min(BLOCK_SNIFF_LIMIT)];
    let text = String::from_utf8_lossy(window).to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| text.contains(marker))
}
