//! User agent rotation and anti-bot request headers

use http::header::{HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use http::HeaderMap;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{CarouselError, Result};

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Capability for per-request user agent strings
///
/// Injected into the dispatcher so tests can pin a deterministic agent.
pub trait UserAgentProvider: Send + Sync {
    fn next(&self) -> String;
}

/// Picks a random agent per request from a fixed list
pub struct RandomUserAgentProvider {
    agents: Vec<String>,
}

impl RandomUserAgentProvider {
    pub fn new() -> Self {
        Self {
            agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_agents(agents: Vec<String>) -> Result<Self> {
        if agents.is_empty() {
            return Err(CarouselError::InvalidConfig(
                "user agent list must not be empty".into(),
            ));
        }
        Ok(Self { agents })
    }
}

impl Default for RandomUserAgentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAgentProvider for RandomUserAgentProvider {
    fn next(&self) -> String {
        let mut rng = rand::thread_rng();
        self.agents
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default()
    }
}

/// Always returns the same agent
pub struct StaticUserAgentProvider {
    agent: String,
}

impl StaticUserAgentProvider {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
        }
    }
}

impl UserAgentProvider for StaticUserAgentProvider {
    fn next(&self) -> String {
        self.agent.clone()
    }
}

/// Browser fingerprint a request claims to come from
#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub platform: &'static str,
    pub viewport_width: u32,
    pub pixel_ratio: u8,
}

const BROWSER_PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        platform: "Windows",
        viewport_width: 1920,
        pixel_ratio: 1,
    },
    BrowserProfile {
        platform: "macOS",
        viewport_width: 1440,
        pixel_ratio: 2,
    },
    BrowserProfile {
        platform: "Windows",
        viewport_width: 1366,
        pixel_ratio: 1,
    },
];

pub fn random_profile() -> BrowserProfile {
    let mut rng = rand::thread_rng();
    *BROWSER_PROFILES
        .choose(&mut rng)
        .unwrap_or(&BROWSER_PROFILES[0])
}

/// Default header set mimicking a browser navigation.
///
/// No Accept-Encoding is sent: the dispatcher does not decompress, so the
/// payload must arrive as identity for classification and the caller.
pub fn default_headers(profile: &BrowserProfile, user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENTS[0])),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-user"),
        HeaderValue::from_static("?1"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_str(&format!("\"{}\"", profile.platform))
            .unwrap_or_else(|_| HeaderValue::from_static("\"Windows\"")),
    );
    headers.insert(
        HeaderName::from_static("viewport-width"),
        HeaderValue::from_str(&profile.viewport_width.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("1920")),
    );
    headers.insert(
        HeaderName::from_static("dpr"),
        HeaderValue::from_str(&profile.pixel_ratio.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("1")),
    );
    headers.insert(
        HeaderName::from_static("rtt"),
        HeaderValue::from_str(&rand::thread_rng().gen_range(50..150).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("100")),
    );

    headers
}
