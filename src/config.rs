use std::env;
use std::time::Duration;

use crate::error::{CarouselError, Result};
use crate::rotation::RotationStrategy;

/// Public proxy lists consulted when no explicit sources are configured
pub const DEFAULT_PROXY_SOURCES: &[&str] = &[
    "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
    "https://raw.githubusercontent.com/ShiftyTR/Proxy-List/master/http.txt",
    "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/http.txt",
];

/// Library configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy rotation policy
    pub rotation: RotationPolicy,
    /// Fetch/retry configuration
    pub fetch: FetchConfig,
    /// Remote proxy list sources
    pub sources: SourcesConfig,
    /// Logging configuration
    pub log: LogConfig,
}

/// Rotation and health policy for the proxy pool
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    /// Rotation strategy (round_robin, random, least_recently_failed)
    pub strategy: RotationStrategy,
    /// How long a suspect proxy stays out of rotation
    pub cooldown: Duration,
    /// Consecutive failures before a proxy is permanently banned
    pub ban_threshold: u32,
    /// Dispatch directly when no proxy is eligible
    pub direct_fallback: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            strategy: RotationStrategy::default(),
            cooldown: Duration::from_secs(30),
            ban_threshold: 3,
            direct_fallback: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Default attempt budget per fetch
    pub max_attempts: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Base retry delay; doubles per attempt with jitter on top
    pub retry_base_delay: Duration,
    /// Backoff cap
    pub retry_max_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            retry_base_delay: Duration::from_millis(3000),
            retry_max_delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourcesConfig {
    /// Proxy list URLs (plain text, one entry per line)
    pub urls: Vec<String>,
    /// How often callers should re-fetch the sources
    pub refresh_interval: Duration,
    /// Concurrent source fetches
    pub fetch_workers: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            urls: DEFAULT_PROXY_SOURCES.iter().map(|s| s.to_string()).collect(),
            refresh_interval: Duration::from_secs(300),
            fetch_workers: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let strategy_raw = get_env_or("CAROUSEL_ROTATION_STRATEGY", "random");
        let strategy = RotationStrategy::from_str(&strategy_raw).ok_or_else(|| {
            CarouselError::InvalidConfig(format!(
                "CAROUSEL_ROTATION_STRATEGY has unknown strategy: {}",
                strategy_raw
            ))
        })?;

        let ban_threshold = parse_env("CAROUSEL_BAN_THRESHOLD", "3")?;
        if ban_threshold == 0 {
            return Err(CarouselError::InvalidConfig(
                "CAROUSEL_BAN_THRESHOLD must be at least 1".into(),
            ));
        }

        let max_attempts = parse_env("CAROUSEL_MAX_ATTEMPTS", "3")?;
        if max_attempts == 0 {
            return Err(CarouselError::InvalidConfig(
                "CAROUSEL_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }

        Ok(Config {
            rotation: RotationPolicy {
                strategy,
                cooldown: Duration::from_secs(parse_env("CAROUSEL_COOLDOWN_SECS", "30")?),
                ban_threshold,
                direct_fallback: get_env_or("CAROUSEL_DIRECT_FALLBACK", "false")
                    .parse()
                    .unwrap_or(false),
            },
            fetch: FetchConfig {
                max_attempts,
                connect_timeout: Duration::from_secs(parse_env(
                    "CAROUSEL_CONNECT_TIMEOUT_SECS",
                    "10",
                )?),
                request_timeout: Duration::from_secs(parse_env(
                    "CAROUSEL_REQUEST_TIMEOUT_SECS",
                    "30",
                )?),
                retry_base_delay: Duration::from_millis(parse_env(
                    "CAROUSEL_RETRY_BASE_MS",
                    "3000",
                )?),
                retry_max_delay: Duration::from_millis(parse_env(
                    "CAROUSEL_RETRY_MAX_MS",
                    "300000",
                )?),
            },
            sources: SourcesConfig {
                urls: parse_source_urls(),
                refresh_interval: Duration::from_secs(parse_env(
                    "CAROUSEL_SOURCE_REFRESH_SECS",
                    "300",
                )?),
                fetch_workers: parse_env::<usize>("CAROUSEL_SOURCE_WORKERS", "4")?.max(1),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }
}

fn parse_source_urls() -> Vec<String> {
    let raw = get_env_or("CAROUSEL_PROXY_SOURCES", "");
    let urls: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if urls.is_empty() {
        DEFAULT_PROXY_SOURCES.iter().map(|s| s.to_string()).collect()
    } else {
        urls
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, rejecting non-numeric values
fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .parse()
        .map_err(|_| CarouselError::InvalidConfig(format!("{} must be a valid number", key)))
}
