//! Round-robin proxy selection strategy

use parking_lot::Mutex;

use super::ProxySelector;
use crate::error::{CarouselError, Result};
use crate::models::ProxyId;
use crate::pool::ProxyPool;

/// Cycles through the eligible set in identifier order
///
/// Remembers the last-returned identifier rather than an index, so the
/// cycle resumes correctly when proxies drop out of (or return to) the
/// eligible set between calls.
pub struct RoundRobinSelector {
    cursor: Mutex<Option<ProxyId>>,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new(None),
        }
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxySelector for RoundRobinSelector {
    fn next(&self, pool: &ProxyPool) -> Result<ProxyId> {
        let eligible = pool.eligible();
        if eligible.is_empty() {
            return Err(CarouselError::NoProxiesAvailable);
        }

        let mut cursor = self.cursor.lock();
        // eligible() is identifier-ordered: the successor of the last
        // returned id is the first id strictly greater than it.
        let idx = match &*cursor {
            Some(last) => eligible
                .iter()
                .position(|p| p.id > *last)
                .unwrap_or(0),
            None => 0,
        };

        let chosen = eligible[idx].id.clone();
        *cursor = Some(chosen.clone());
        Ok(chosen)
    }

    fn strategy_name(&self) -> &'static str {
        "round_robin"
    }
}
