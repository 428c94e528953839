use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OutcomeKind;

/// Run-wide fetch counters, shared across concurrent fetches
///
/// Cheap atomic bumps on the hot path; read via [`FetchStats::snapshot`].
#[derive(Debug)]
pub struct FetchStats {
    started_at: DateTime<Utc>,
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rate_limits_hit: AtomicU64,
    retries: AtomicU64,
}

impl FetchStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rate_limits_hit: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_attempt(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Success => {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }
            OutcomeKind::RateLimited => {
                self.rate_limits_hit.fetch_add(1, Ordering::Relaxed);
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rate_limits_hit: self.rate_limits_hit.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

impl Default for FetchStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub rate_limits_hit: u64,
    pub retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = FetchStats::new();

        stats.record_attempt();
        stats.record_outcome(OutcomeKind::RateLimited);
        stats.record_retry();
        stats.record_attempt();
        stats.record_outcome(OutcomeKind::Success);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.rate_limits_hit, 1);
        assert_eq!(snapshot.retries, 1);
    }

    #[test]
    fn test_network_error_counts_as_failure_only() {
        let stats = FetchStats::new();
        stats.record_attempt();
        stats.record_outcome(OutcomeKind::NetworkError);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.rate_limits_hit, 0);
        assert_eq!(snapshot.successes, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = FetchStats::new();
        stats.record_attempt();
        stats.record_outcome(OutcomeKind::Success);

        let value = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(value["requests"], 1);
        assert_eq!(value["successes"], 1);
    }
}
