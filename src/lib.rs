//! Carousel - Rotating-proxy fetch layer for scrapers
//!
//! Carousel fetches pages through a pool of rotating proxies: it picks a
//! proxy per attempt, issues the request with anti-bot headers, classifies
//! the result, and rotates away from proxies that fail, rate-limit, or
//! block. Callers hand in a URL and get back the payload or a terminal
//! error; parsing the payload is their business.
//!
//! ## Features
//!
//! - Multiple rotation strategies (random, round-robin, least-recently-failed)
//! - Passive health tracking with cooldowns and permanent bans
//! - HTTP CONNECT and SOCKS5 upstream proxies, with optional direct fallback
//! - Randomized user agents and browser-profile headers
//! - Retry with exponential backoff, jitter, and Retry-After hints
//! - Remote proxy list loading with validation
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use carousel::clock::SystemClock;
//! use carousel::dispatch::{DispatcherConfig, HttpDispatcher, RandomUserAgentProvider};
//! use carousel::fetch::{CancelHandle, Fetcher};
//! use carousel::models::FetchRequest;
//! use carousel::pool::ProxyPool;
//! use carousel::rotation::create_selector;
//! use carousel::sources::parse_proxy_list;
//! use carousel::Config;
//!
//! # async fn run() -> carousel::Result<()> {
//! let config = Config::from_env()?;
//! let proxies = parse_proxy_list("203.0.113.1:8080\n203.0.113.2:3128")?;
//!
//! let pool = Arc::new(ProxyPool::with_system_clock(proxies, config.rotation.clone())?);
//! let selector = Arc::from(create_selector(config.rotation.strategy));
//! let dispatcher = Arc::new(HttpDispatcher::new(
//!     DispatcherConfig::from(&config.fetch),
//!     Arc::new(RandomUserAgentProvider::new()),
//! ));
//! let (cancel, cancel_rx) = CancelHandle::new();
//!
//! let fetcher = Fetcher::new(
//!     pool,
//!     selector,
//!     dispatcher,
//!     config.fetch.clone(),
//!     Arc::new(SystemClock),
//!     cancel_rx,
//! );
//!
//! let page = fetcher
//!     .fetch(&FetchRequest::get("https://www.youtube.com/@somechannel")?)
//!     .await?;
//! println!("{} bytes", page.body.len());
//! # let _ = cancel;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod pool;
pub mod rotation;
pub mod sources;

pub use config::Config;
pub use error::{CarouselError, Result};
pub use fetch::{CancelHandle, Fetcher};
pub use pool::ProxyPool;
pub use rotation::{create_selector, ProxySelector, RotationStrategy};
