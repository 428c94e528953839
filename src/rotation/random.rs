//! Random proxy selection strategy

use rand::seq::SliceRandom;

use super::ProxySelector;
use crate::error::{CarouselError, Result};
use crate::models::ProxyId;
use crate::pool::ProxyPool;

/// Uniformly samples the eligible set
pub struct RandomSelector;

impl RandomSelector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxySelector for RandomSelector {
    fn next(&self, pool: &ProxyPool) -> Result<ProxyId> {
        let eligible = pool.eligible();
        if eligible.is_empty() {
            return Err(CarouselError::NoProxiesAvailable);
        }

        let mut rng = rand::thread_rng();
        eligible
            .choose(&mut rng)
            .map(|p| p.id.clone())
            .ok_or(CarouselError::NoProxiesAvailable)
    }

    fn strategy_name(&self) -> &'static str {
        "random"
    }
}
