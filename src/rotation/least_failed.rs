//! Least-recently-failed proxy selection strategy

use std::cmp::Ordering;

use super::ProxySelector;
use crate::error::{CarouselError, Result};
use crate::models::ProxyId;
use crate::pool::ProxyPool;

/// Prefers proxies with the shortest failure streak
///
/// Orders the eligible set by ascending consecutive failures, then by
/// oldest last use (never-used entries first), then by identifier so the
/// choice is deterministic.
pub struct LeastRecentlyFailedSelector;

impl LeastRecentlyFailedSelector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastRecentlyFailedSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxySelector for LeastRecentlyFailedSelector {
    fn next(&self, pool: &ProxyPool) -> Result<ProxyId> {
        let mut eligible = pool.eligible();
        if eligible.is_empty() {
            return Err(CarouselError::NoProxiesAvailable);
        }

        eligible.sort_by(|a, b| {
            a.consecutive_failures
                .cmp(&b.consecutive_failures)
                .then_with(|| match (a.last_used, b.last_used) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp(&y),
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(eligible[0].id.clone())
    }

    fn strategy_name(&self) -> &'static str {
        "least_recently_failed"
    }
}
