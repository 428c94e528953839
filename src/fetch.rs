//! Fetch orchestration: retry, backoff, and rotation
//!
//! Each fetch runs an explicit state machine so every transition is
//! testable without real network timing:
//!
//! `Selecting → Dispatching → Evaluating → {Done, Retrying, Exhausted}`

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::config::FetchConfig;
use crate::dispatch::Dispatcher;
use crate::error::{CarouselError, Result};
use crate::models::{FetchRequest, FetchResponse, FetchStats, OutcomeKind, ProxyId, RequestOutcome};
use crate::pool::ProxyPool;
use crate::rotation::ProxySelector;

enum FetchState {
    Selecting,
    Dispatching(Option<ProxyId>),
    Evaluating {
        proxy: Option<ProxyId>,
        outcome: RequestOutcome,
    },
    Retrying {
        delay: Duration,
    },
}

/// Cancellation signal shared by every fetch spawned from one run
///
/// Dropping the handle does not cancel; call [`CancelHandle::cancel`].
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Retry controller: one shared instance, one state machine per call
pub struct Fetcher {
    pool: Arc<ProxyPool>,
    selector: Arc<dyn ProxySelector>,
    dispatcher: Arc<dyn Dispatcher>,
    config: FetchConfig,
    stats: Arc<FetchStats>,
    clock: Arc<dyn Clock>,
    cancel: watch::Receiver<bool>,
}

impl Fetcher {
    pub fn new(
        pool: Arc<ProxyPool>,
        selector: Arc<dyn ProxySelector>,
        dispatcher: Arc<dyn Dispatcher>,
        config: FetchConfig,
        clock: Arc<dyn Clock>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            selector,
            dispatcher,
            config,
            stats: Arc::new(FetchStats::new()),
            clock,
            cancel,
        }
    }

    pub fn stats(&self) -> Arc<FetchStats> {
        self.stats.clone()
    }

    /// Fetch the request's target, rotating proxies across attempts.
    ///
    /// Returns the payload on the first successful attempt, or
    /// `FetchExhausted` once the attempt budget is spent. Every outcome is
    /// reported to the pool before the retry decision.
    #[instrument(skip(self, request), fields(request = %request.id, url = %request.url))]
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let max_attempts = request.max_attempts.unwrap_or(self.config.max_attempts).max(1);
        let mut cancel = self.cancel.clone();
        let mut attempts: u32 = 0;
        let mut last_kind: Option<OutcomeKind> = None;
        let mut state = FetchState::Selecting;

        if *cancel.borrow() {
            return Err(CarouselError::Cancelled);
        }

        loop {
            state = match state {
                FetchState::Selecting => match self.selector.next(&self.pool) {
                    Ok(id) => FetchState::Dispatching(Some(id)),
                    Err(CarouselError::NoProxiesAvailable) => {
                        if self.pool.policy().direct_fallback {
                            debug!("no eligible proxies, falling back to direct connection");
                            FetchState::Dispatching(None)
                        } else {
                            warn!(attempts, "no eligible proxies and fallback disabled");
                            return Err(CarouselError::FetchExhausted {
                                attempts,
                                last: last_kind,
                            });
                        }
                    }
                    Err(e) => return Err(e),
                },

                FetchState::Dispatching(proxy_id) => {
                    attempts += 1;
                    self.stats.record_attempt();

                    let endpoint = proxy_id.as_ref().and_then(|id| self.pool.endpoint(id));
                    debug!(
                        attempt = attempts,
                        max_attempts,
                        proxy = proxy_id.as_ref().map(|id| id.as_str()).unwrap_or("direct"),
                        "dispatching"
                    );

                    let outcome = tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => return Err(CarouselError::Cancelled),
                        outcome = self.dispatcher.dispatch(request, endpoint.as_ref()) => outcome,
                    };

                    FetchState::Evaluating {
                        proxy: proxy_id,
                        outcome,
                    }
                }

                FetchState::Evaluating { proxy, outcome } => {
                    let kind = outcome.kind();
                    // Report before deciding anything, so the pool rotates
                    // away from blocked/rate-limited proxies.
                    if let Some(id) = &proxy {
                        self.pool.report(id, kind);
                    }
                    self.stats.record_outcome(kind);

                    match outcome {
                        RequestOutcome::Success(response) => {
                            debug!(attempt = attempts, status = %response.status, "fetch done");
                            return Ok(response);
                        }
                        failure => {
                            last_kind = Some(kind);
                            if attempts < max_attempts {
                                let delay = self.retry_delay(attempts, &failure);
                                debug!(
                                    attempt = attempts,
                                    outcome = %kind,
                                    delay_ms = delay.as_millis() as u64,
                                    "retrying"
                                );
                                FetchState::Retrying { delay }
                            } else {
                                warn!(attempts, last = %kind, "fetch exhausted");
                                return Err(CarouselError::FetchExhausted {
                                    attempts,
                                    last: last_kind,
                                });
                            }
                        }
                    }
                }

                FetchState::Retrying { delay } => {
                    self.stats.record_retry();
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => return Err(CarouselError::Cancelled),
                        _ = self.clock.sleep(delay) => {}
                    }
                    FetchState::Selecting
                }
            };
        }
    }

    /// Exponential backoff with jitter, honoring a rate-limit hint
    fn retry_delay(&self, attempt: u32, outcome: &RequestOutcome) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .config
            .retry_base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.config.retry_max_delay);
        let jitter = backoff.mul_f64(rand::thread_rng().gen_range(0.0..0.1));
        let delay = backoff + jitter;

        match outcome {
            RequestOutcome::RateLimited {
                retry_after: Some(hint),
            } => delay.max(*hint),
            _ => delay,
        }
    }
}

/// Resolves once the cancellation flag flips; never resolves if the sender
/// is gone without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    use crate::clock::test_support::ManualClock;
    use crate::config::RotationPolicy;
    use crate::models::{FetchResponse, ProxyEndpoint};
    use crate::rotation::{create_selector, RotationStrategy};

    /// Dispatcher double that replays scripted outcomes and records which
    /// proxy served each attempt.
    struct ScriptedDispatcher {
        outcomes: Mutex<VecDeque<RequestOutcome>>,
        seen_proxies: Mutex<Vec<Option<String>>>,
        cancel_on_call: Option<CancelHandle>,
    }

    impl ScriptedDispatcher {
        fn new(outcomes: Vec<RequestOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                seen_proxies: Mutex::new(Vec::new()),
                cancel_on_call: None,
            }
        }

        fn calls(&self) -> usize {
            self.seen_proxies.lock().len()
        }

        fn seen(&self) -> Vec<Option<String>> {
            self.seen_proxies.lock().clone()
        }
    }

    #[async_trait]
    impl Dispatcher for ScriptedDispatcher {
        async fn dispatch(
            &self,
            _request: &FetchRequest,
            proxy: Option<&ProxyEndpoint>,
        ) -> RequestOutcome {
            self.seen_proxies
                .lock()
                .push(proxy.map(|p| p.id().as_str().to_string()));
            if let Some(handle) = &self.cancel_on_call {
                handle.cancel();
            }
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or(RequestOutcome::NetworkError("script exhausted".to_string()))
        }
    }

    fn ok_response() -> RequestOutcome {
        RequestOutcome::Success(FetchResponse {
            status: http::StatusCode::OK,
            headers: http::HeaderMap::new(),
            body: bytes::Bytes::from_static(b"payload"),
        })
    }

    fn network_error() -> RequestOutcome {
        RequestOutcome::NetworkError("connection refused".to_string())
    }

    struct Harness {
        fetcher: Fetcher,
        dispatcher: Arc<ScriptedDispatcher>,
        clock: Arc<ManualClock>,
        #[allow(dead_code)]
        cancel: CancelHandle,
    }

    fn harness(
        addrs: &[&str],
        policy: RotationPolicy,
        strategy: RotationStrategy,
        dispatcher: ScriptedDispatcher,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new());
        let endpoints = addrs
            .iter()
            .map(|a| ProxyEndpoint::parse(a).unwrap())
            .collect();
        let pool = Arc::new(ProxyPool::new(endpoints, policy, clock.clone()).unwrap());
        let dispatcher = Arc::new(dispatcher);
        let (cancel, cancel_rx) = CancelHandle::new();
        let fetcher = Fetcher::new(
            pool,
            Arc::from(create_selector(strategy)),
            dispatcher.clone(),
            FetchConfig::default(),
            clock.clone(),
            cancel_rx,
        );
        Harness {
            fetcher,
            dispatcher,
            clock,
            cancel,
        }
    }

    fn request() -> FetchRequest {
        FetchRequest::get("http://example.com/").unwrap()
    }

    #[tokio::test]
    async fn test_persistent_failure_exhausts_after_attempt_budget() {
        let h = harness(
            &["10.0.0.1:8080", "10.0.0.2:8080", "10.0.0.3:8080"],
            RotationPolicy::default(),
            RotationStrategy::RoundRobin,
            ScriptedDispatcher::new(vec![network_error(), network_error(), network_error()]),
        );

        let err = h
            .fetcher
            .fetch(&request().with_max_attempts(3))
            .await
            .unwrap_err();

        assert_eq!(h.dispatcher.calls(), 3);
        match err {
            CarouselError::FetchExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, Some(OutcomeKind::NetworkError));
            }
            other => panic!("expected FetchExhausted, got {}", other),
        }

        let stats = h.fetcher.stats().snapshot();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.retries, 2);
    }

    #[tokio::test]
    async fn test_rate_limit_rotates_then_succeeds() {
        let h = harness(
            &["10.0.0.1:8080", "10.0.0.2:8080"],
            RotationPolicy::default(),
            RotationStrategy::RoundRobin,
            ScriptedDispatcher::new(vec![
                RequestOutcome::RateLimited { retry_after: None },
                ok_response(),
            ]),
        );

        let response = h.fetcher.fetch(&request()).await.unwrap();
        assert_eq!(response.body.as_ref(), b"payload");

        // Two attempts through two different proxies
        let seen = h.dispatcher.seen();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);

        let stats = h.fetcher.stats().snapshot();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.rate_limits_hit, 1);
    }

    #[tokio::test]
    async fn test_backoff_doubles_and_honors_retry_after() {
        let h = harness(
            &["10.0.0.1:8080"],
            RotationPolicy {
                cooldown: Duration::from_secs(0),
                ..RotationPolicy::default()
            },
            RotationStrategy::RoundRobin,
            ScriptedDispatcher::new(vec![
                network_error(),
                RequestOutcome::RateLimited {
                    retry_after: Some(Duration::from_secs(90)),
                },
                ok_response(),
            ]),
        );

        h.fetcher.fetch(&request()).await.unwrap();

        let slept = h.clock.slept();
        assert_eq!(slept.len(), 2);
        // First retry: base delay plus up to 10% jitter
        assert!(slept[0] >= Duration::from_secs(3));
        assert!(slept[0] < Duration::from_millis(3300 + 1));
        // Second retry: the 90s hint beats the doubled backoff
        assert!(slept[1] >= Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_no_proxies_without_fallback_fails() {
        let h = harness(
            &["10.0.0.1:8080"],
            RotationPolicy {
                ban_threshold: 1,
                ..RotationPolicy::default()
            },
            RotationStrategy::RoundRobin,
            ScriptedDispatcher::new(vec![network_error()]),
        );

        // First attempt bans the only proxy; re-selection then fails
        let err = h.fetcher.fetch(&request()).await.unwrap_err();
        match err {
            CarouselError::FetchExhausted { attempts, last } => {
                assert_eq!(attempts, 1);
                assert_eq!(last, Some(OutcomeKind::NetworkError));
            }
            other => panic!("expected FetchExhausted, got {}", other),
        }
        assert_eq!(h.dispatcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_direct_fallback_when_pool_exhausted() {
        let h = harness(
            &[],
            RotationPolicy {
                direct_fallback: true,
                ..RotationPolicy::default()
            },
            RotationStrategy::RoundRobin,
            ScriptedDispatcher::new(vec![ok_response()]),
        );

        let response = h.fetcher.fetch(&request()).await.unwrap();
        assert_eq!(response.status, http::StatusCode::OK);
        assert_eq!(h.dispatcher.seen(), vec![None]);
    }

    #[tokio::test]
    async fn test_cancel_before_fetch_short_circuits() {
        let h = harness(
            &["10.0.0.1:8080"],
            RotationPolicy::default(),
            RotationStrategy::RoundRobin,
            ScriptedDispatcher::new(vec![ok_response()]),
        );

        h.cancel.cancel();
        let err = h.fetcher.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, CarouselError::Cancelled));
        assert_eq!(h.dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_retry_stops_promptly() {
        let clock = Arc::new(ManualClock::new());
        let endpoints = vec![
            ProxyEndpoint::parse("10.0.0.1:8080").unwrap(),
            ProxyEndpoint::parse("10.0.0.2:8080").unwrap(),
        ];
        let pool = Arc::new(
            ProxyPool::new(endpoints, RotationPolicy::default(), clock.clone()).unwrap(),
        );
        let (cancel, cancel_rx) = CancelHandle::new();
        let dispatcher = Arc::new(ScriptedDispatcher {
            outcomes: Mutex::new(vec![network_error(), network_error()].into()),
            seen_proxies: Mutex::new(Vec::new()),
            cancel_on_call: Some(cancel),
        });
        let fetcher = Fetcher::new(
            pool,
            Arc::from(create_selector(RotationStrategy::RoundRobin)),
            dispatcher.clone(),
            FetchConfig::default(),
            clock,
            cancel_rx,
        );

        // The first dispatch trips the cancellation; the retry sleep must
        // observe it and stop without a second attempt.
        let err = fetcher.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, CarouselError::Cancelled));
        assert_eq!(dispatcher.calls(), 1);
    }
}
