//! Proxy rotation strategies
//!
//! This module provides the strategies for choosing the next proxy from the
//! pool's eligible set.

mod least_failed;
mod random;
mod round_robin;

pub use least_failed::LeastRecentlyFailedSelector;
pub use random::RandomSelector;
pub use round_robin::RoundRobinSelector;

use crate::error::Result;
use crate::models::ProxyId;
use crate::pool::ProxyPool;

/// Strategy types for proxy rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    #[default]
    Random,
    RoundRobin,
    LeastRecentlyFailed,
}

impl RotationStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "random" => Some(Self::Random),
            "round_robin" | "roundrobin" | "round-robin" => Some(Self::RoundRobin),
            "least_recently_failed" | "least-recently-failed" | "least_failed" => {
                Some(Self::LeastRecentlyFailed)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
            Self::LeastRecentlyFailed => "least_recently_failed",
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for proxy selection strategies
///
/// Implementations read the pool's eligible set and never mutate health
/// state; outcome reporting is the fetcher's job.
pub trait ProxySelector: Send + Sync {
    /// Choose the next proxy
    ///
    /// Returns an error when no proxy is currently eligible; the caller
    /// decides whether that is fatal or a direct-connection fallback.
    fn next(&self, pool: &ProxyPool) -> Result<ProxyId>;

    /// Get the strategy name
    fn strategy_name(&self) -> &'static str;
}

/// Create a proxy selector based on the strategy type
pub fn create_selector(strategy: RotationStrategy) -> Box<dyn ProxySelector> {
    match strategy {
        RotationStrategy::Random => Box::new(RandomSelector::new()),
        RotationStrategy::RoundRobin => Box::new(RoundRobinSelector::new()),
        RotationStrategy::LeastRecentlyFailed => Box::new(LeastRecentlyFailedSelector::new()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_strategy_from_str() {
        assert_eq!(
            RotationStrategy::from_str("random"),
            Some(RotationStrategy::Random)
        );
        assert_eq!(
            RotationStrategy::from_str("round-robin"),
            Some(RotationStrategy::RoundRobin)
        );
        assert_eq!(
            RotationStrategy::from_str("least_failed"),
            Some(RotationStrategy::LeastRecentlyFailed)
        );
        assert_eq!(RotationStrategy::from_str("unknown"), None);
    }

    #[test]
    fn test_rotation_strategy_as_str() {
        assert_eq!(RotationStrategy::Random.as_str(), "random");
        assert_eq!(RotationStrategy::RoundRobin.as_str(), "round_robin");
        assert_eq!(
            RotationStrategy::LeastRecentlyFailed.as_str(),
            "least_recently_failed"
        );
    }

    #[test]
    fn test_create_selector_strategy_name() {
        assert_eq!(
            create_selector(RotationStrategy::Random).strategy_name(),
            "random"
        );
        assert_eq!(
            create_selector(RotationStrategy::RoundRobin).strategy_name(),
            "round_robin"
        );
        assert_eq!(
            create_selector(RotationStrategy::LeastRecentlyFailed).strategy_name(),
            "least_recently_failed"
        );
    }
}
