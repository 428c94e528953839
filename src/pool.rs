//! Proxy pool with health tracking
//!
//! Owns all proxy state. Health changes happen only through reported
//! outcomes; selectors read the eligible set and never mutate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RotationPolicy;
use crate::error::{CarouselError, Result};
use crate::models::{OutcomeKind, ProxyEndpoint, ProxyHealth, ProxyId, ProxySnapshot};

struct ProxyState {
    endpoint: ProxyEndpoint,
    health: ProxyHealth,
    consecutive_failures: u32,
    last_used: Option<Instant>,
    requests: u64,
    successes: u64,
    failures: u64,
}

impl ProxyState {
    fn new(endpoint: ProxyEndpoint) -> Self {
        Self {
            endpoint,
            health: ProxyHealth::Healthy,
            consecutive_failures: 0,
            last_used: None,
            requests: 0,
            successes: 0,
            failures: 0,
        }
    }
}

struct PoolInner {
    states: HashMap<ProxyId, ProxyState>,
    // Identifier order; keeps round-robin and tie-breaking deterministic
    order: Vec<ProxyId>,
}

/// One pool entry as seen by a selection strategy
#[derive(Debug, Clone)]
pub struct EligibleProxy {
    pub id: ProxyId,
    pub consecutive_failures: u32,
    pub last_used: Option<Instant>,
}

/// Shared pool of candidate proxies
pub struct ProxyPool {
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    inner: Mutex<PoolInner>,
}

impl std::fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyPool")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ProxyPool {
    /// Build a pool with every entry starting healthy.
    ///
    /// Fails with a configuration error when the list is empty and the
    /// policy does not allow direct fallback, or when two entries share an
    /// identifier.
    pub fn new(
        endpoints: Vec<ProxyEndpoint>,
        policy: RotationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if endpoints.is_empty() && !policy.direct_fallback {
            return Err(CarouselError::InvalidConfig(
                "proxy list is empty and direct fallback is disabled".into(),
            ));
        }

        let mut states = HashMap::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let id = endpoint.id();
            if states.insert(id.clone(), ProxyState::new(endpoint)).is_some() {
                return Err(CarouselError::InvalidConfig(format!(
                    "duplicate proxy in list: {}",
                    id
                )));
            }
        }

        let mut order: Vec<ProxyId> = states.keys().cloned().collect();
        order.sort();

        debug!(proxies = order.len(), "proxy pool initialized");

        Ok(Self {
            policy,
            clock,
            inner: Mutex::new(PoolInner { states, order }),
        })
    }

    pub fn with_system_clock(endpoints: Vec<ProxyEndpoint>, policy: RotationPolicy) -> Result<Self> {
        Self::new(endpoints, policy, Arc::new(SystemClock))
    }

    /// Record the outcome of one dispatch through `id`.
    ///
    /// Success resets the failure streak and restores health; any failure
    /// increments the streak, then bans at the threshold or marks the proxy
    /// suspect for the configured cooldown. Bans are permanent.
    pub fn report(&self, id: &ProxyId, kind: OutcomeKind) {
        let mut inner = self.inner.lock();
        let Some(state) = inner.states.get_mut(id) else {
            warn!(proxy = %id, "outcome reported for unknown proxy");
            return;
        };

        let now = self.clock.now();
        state.last_used = Some(now);
        state.requests += 1;

        match kind {
            OutcomeKind::Success => {
                state.successes += 1;
                state.consecutive_failures = 0;
                if !state.health.is_banned() {
                    state.health = ProxyHealth::Healthy;
                }
            }
            _ => {
                state.failures += 1;
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);

                if state.health.is_banned() {
                    return;
                }

                if state.consecutive_failures >= self.policy.ban_threshold {
                    warn!(
                        proxy = %id,
                        failures = state.consecutive_failures,
                        "proxy banned"
                    );
                    state.health = ProxyHealth::Banned;
                } else {
                    debug!(
                        proxy = %id,
                        outcome = %kind,
                        failures = state.consecutive_failures,
                        cooldown_secs = self.policy.cooldown.as_secs(),
                        "proxy marked suspect"
                    );
                    state.health = ProxyHealth::Suspect {
                        until: now + self.policy.cooldown,
                    };
                }
            }
        }
    }

    /// Proxies currently selectable, in identifier order. Side-effect free.
    pub fn eligible(&self) -> Vec<EligibleProxy> {
        let now = self.clock.now();
        let inner = self.inner.lock();

        inner
            .order
            .iter()
            .filter_map(|id| {
                let state = &inner.states[id];
                match state.health {
                    ProxyHealth::Banned => None,
                    ProxyHealth::Suspect { until } if until > now => None,
                    _ => Some(EligibleProxy {
                        id: id.clone(),
                        consecutive_failures: state.consecutive_failures,
                        last_used: state.last_used,
                    }),
                }
            })
            .collect()
    }

    /// Connection details for a pool entry
    pub fn endpoint(&self, id: &ProxyId) -> Option<ProxyEndpoint> {
        self.inner.lock().states.get(id).map(|s| s.endpoint.clone())
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Total entries, including banned and cooling-down proxies
    pub fn len(&self) -> usize {
        self.inner.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().states.is_empty()
    }

    /// Diagnostic view of every entry, in identifier order
    pub fn snapshot(&self) -> Vec<ProxySnapshot> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .map(|id| {
                let state = &inner.states[id];
                ProxySnapshot {
                    id: id.clone(),
                    health: state.health.as_str(),
                    consecutive_failures: state.consecutive_failures,
                    requests: state.requests,
                    successes: state.successes,
                    failures: state.failures,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use std::time::Duration;

    fn endpoints(addrs: &[&str]) -> Vec<ProxyEndpoint> {
        addrs.iter().map(|a| ProxyEndpoint::parse(a).unwrap()).collect()
    }

    fn pool_with(
        addrs: &[&str],
        policy: RotationPolicy,
    ) -> (Arc<ProxyPool>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let pool = ProxyPool::new(endpoints(addrs), policy, clock.clone()).unwrap();
        (Arc::new(pool), clock)
    }

    fn id(addr: &str) -> ProxyId {
        ProxyEndpoint::parse(addr).unwrap().id()
    }

    #[test]
    fn test_empty_list_without_fallback_is_config_error() {
        let err = ProxyPool::with_system_clock(Vec::new(), RotationPolicy::default()).unwrap_err();
        assert!(matches!(err, CarouselError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_list_with_fallback_is_allowed() {
        let policy = RotationPolicy {
            direct_fallback: true,
            ..RotationPolicy::default()
        };
        let pool = ProxyPool::with_system_clock(Vec::new(), policy).unwrap();
        assert!(pool.is_empty());
        assert!(pool.eligible().is_empty());
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let err = ProxyPool::with_system_clock(
            endpoints(&["1.2.3.4:8080", "http://1.2.3.4:8080"]),
            RotationPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CarouselError::InvalidConfig(_)));
    }

    #[test]
    fn test_all_entries_start_healthy_and_eligible() {
        let (pool, _clock) = pool_with(
            &["1.2.3.4:8080", "5.6.7.8:8080"],
            RotationPolicy::default(),
        );

        let eligible = pool.eligible();
        assert_eq!(eligible.len(), 2);
        assert!(eligible.iter().all(|p| p.consecutive_failures == 0));
        assert!(pool.snapshot().iter().all(|s| s.health == "healthy"));
    }

    #[test]
    fn test_failure_marks_suspect_until_cooldown_elapses() {
        let (pool, clock) = pool_with(&["1.2.3.4:8080"], RotationPolicy::default());
        let id = id("1.2.3.4:8080");

        pool.report(&id, OutcomeKind::Timeout);
        assert!(pool.eligible().is_empty());
        assert_eq!(pool.snapshot()[0].health, "suspect");

        // Still cooling down
        clock.advance(Duration::from_secs(29));
        assert!(pool.eligible().is_empty());

        // Cooldown elapsed; failure streak survives
        clock.advance(Duration::from_secs(1));
        let eligible = pool.eligible();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].consecutive_failures, 1);
    }

    #[test]
    fn test_ban_at_threshold_is_permanent() {
        let policy = RotationPolicy {
            ban_threshold: 2,
            ..RotationPolicy::default()
        };
        let (pool, clock) = pool_with(&["1.2.3.4:8080"], policy);
        let id = id("1.2.3.4:8080");

        pool.report(&id, OutcomeKind::Blocked);
        assert_eq!(pool.snapshot()[0].health, "suspect");

        pool.report(&id, OutcomeKind::Blocked);
        assert_eq!(pool.snapshot()[0].health, "banned");
        assert!(pool.eligible().is_empty());

        // No cooldown rescues a ban
        clock.advance(Duration::from_secs(3600));
        assert!(pool.eligible().is_empty());

        // Not even success
        pool.report(&id, OutcomeKind::Success);
        assert_eq!(pool.snapshot()[0].health, "banned");
        assert!(pool.eligible().is_empty());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let policy = RotationPolicy {
            ban_threshold: 3,
            ..RotationPolicy::default()
        };
        let (pool, clock) = pool_with(&["1.2.3.4:8080"], policy);
        let id = id("1.2.3.4:8080");

        pool.report(&id, OutcomeKind::NetworkError);
        pool.report(&id, OutcomeKind::RateLimited);
        clock.advance(Duration::from_secs(30));
        assert_eq!(pool.eligible()[0].consecutive_failures, 2);

        pool.report(&id, OutcomeKind::Success);
        let snapshot = &pool.snapshot()[0];
        assert_eq!(snapshot.health, "healthy");
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.requests, 3);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 2);
    }

    #[test]
    fn test_unknown_proxy_report_is_ignored() {
        let (pool, _clock) = pool_with(&["1.2.3.4:8080"], RotationPolicy::default());
        pool.report(&id("9.9.9.9:9090"), OutcomeKind::Success);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_concurrent_reports_never_lose_increments() {
        let policy = RotationPolicy {
            ban_threshold: 10_000,
            cooldown: Duration::from_secs(0),
            ..RotationPolicy::default()
        };
        let (pool, _clock) = pool_with(&["1.2.3.4:8080"], policy);
        let id = id("1.2.3.4:8080");

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        pool.report(&id, OutcomeKind::NetworkError);
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        let snapshot = &pool.snapshot()[0];
        assert_eq!(snapshot.consecutive_failures, 200);
        assert_eq!(snapshot.failures, 200);
    }
}
