//! Circuit breaker for outbound calls.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: endpoint assumed down, requests fail fast
//! - Half-Open: cooldown elapsed, requests are let through again
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures > failure_threshold
//! Open → Half-Open: first admission check at or after next_try_at
//! Half-Open → Closed: any call succeeds
//! Half-Open → Open: failure count (never reset while open) still > threshold
//! ```
//!
//! # Design Decisions
//! - Per-endpoint state keyed by `METHOD:url`, created on first use
//! - Fail fast in Open state (no attempt, no waiting)
//! - Half-Open admits every caller, not a single probe
//! - The breaker's own request timeout always wins over the caller's

use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;

use crate::config::BreakerConfig;
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::executor::{OutboundExecutor, OutboundRequest};

/// Circuit state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CircuitStatus::Closed => "CLOSED",
            CircuitStatus::Open => "OPEN",
            CircuitStatus::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

/// Failure-tracking state for a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointState {
    /// Consecutive failures since the last reset.
    pub failures: u32,
    pub status: CircuitStatus,
    /// Wall-clock reading (since epoch) from which a trial call is allowed.
    /// Zero unless the circuit has been opened.
    pub next_try_at: Duration,
}

impl EndpointState {
    fn closed() -> Self {
        Self {
            failures: 0,
            status: CircuitStatus::Closed,
            next_try_at: Duration::ZERO,
        }
    }
}

/// Why a guarded call produced no payload.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// Circuit is open and the cooldown has not elapsed; nothing was sent.
    #[error("circuit for {endpoint} is open")]
    Rejected { endpoint: String },

    /// The executor reported an error.
    #[error("call to {endpoint} failed: {reason}")]
    Failed { endpoint: String, reason: String },

    /// The call did not finish within the breaker's request timeout.
    #[error("call to {endpoint} timed out after {timeout:?}")]
    TimedOut { endpoint: String, timeout: Duration },
}

impl BreakerError {
    /// True if the call was attempted (as opposed to rejected up front).
    pub fn was_attempted(&self) -> bool {
        !matches!(self, BreakerError::Rejected { .. })
    }
}

/// Result type for guarded calls.
pub type BreakerResult<T> = Result<T, BreakerError>;

/// Guards outbound calls, tracking failures per endpoint.
///
/// Construct once and share by reference (usually behind an `Arc`); every
/// call site that should see the same failure history must use the same
/// instance.
pub struct CircuitBreaker<E, C = SystemClock> {
    executor: E,
    clock: C,
    failure_threshold: u32,
    cooldown: Duration,
    request_timeout: Duration,
    /// One entry per endpoint key; the shard lock serialises updates.
    states: DashMap<String, EndpointState>,
}

impl<E> CircuitBreaker<E, SystemClock> {
    /// Create a breaker reading the system wall clock.
    pub fn new(config: &BreakerConfig, executor: E) -> Self {
        Self::with_clock(config, executor, SystemClock)
    }
}

impl<E, C: Clock> CircuitBreaker<E, C> {
    /// Create a breaker with an explicit time source.
    ///
    /// Zero-valued settings in `config` fall back to their defaults.
    pub fn with_clock(config: &BreakerConfig, executor: E, clock: C) -> Self {
        let config = config.or_defaults();
        Self {
            executor,
            clock,
            failure_threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
            request_timeout: Duration::from_secs(config.timeout_secs),
            states: DashMap::new(),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Snapshot of an endpoint's state, if it has been seen.
    pub fn state(&self, endpoint: &str) -> Option<EndpointState> {
        self.states.get(endpoint).map(|s| s.value().clone())
    }

    /// Decide whether a call to `endpoint` may be attempted.
    ///
    /// Creates the endpoint's state on first use. An open circuit whose
    /// cooldown has elapsed moves to half-open and admits the caller.
    pub fn can_request(&self, endpoint: &str) -> bool {
        let mut state = self
            .states
            .entry(endpoint.to_owned())
            .or_insert_with(EndpointState::closed);

        let status = state.status;
        match status {
            CircuitStatus::Closed | CircuitStatus::HalfOpen => true,
            CircuitStatus::Open => {
                if state.next_try_at <= self.clock.now() {
                    state.status = CircuitStatus::HalfOpen;
                    tracing::debug!(
                        endpoint = %endpoint,
                        failures = state.failures,
                        "Circuit half-open, allowing trial requests"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Reset `endpoint` to closed with no recorded failures.
    pub fn on_success(&self, endpoint: &str) {
        let previous = self
            .states
            .insert(endpoint.to_owned(), EndpointState::closed());

        if let Some(prev) = previous {
            if prev.status != CircuitStatus::Closed {
                tracing::info!(
                    endpoint = %endpoint,
                    from = %prev.status,
                    "Circuit closed, endpoint recovered"
                );
            }
        }
    }

    /// Record a failed call to `endpoint`, opening the circuit once the
    /// failure count exceeds the threshold.
    pub fn on_failure(&self, endpoint: &str) {
        let mut state = self
            .states
            .entry(endpoint.to_owned())
            .or_insert_with(EndpointState::closed);

        state.failures = state.failures.saturating_add(1);
        if state.failures > self.failure_threshold {
            state.status = CircuitStatus::Open;
            state.next_try_at = self.clock.now().saturating_add(self.cooldown);
            tracing::warn!(
                endpoint = %endpoint,
                state = %CircuitStatus::Open,
                failures = state.failures,
                cooldown_secs = self.cooldown.as_secs(),
                "ALERT! Circuit opened"
            );
        }
    }
}

impl<E, C> CircuitBreaker<E, C>
where
    E: OutboundExecutor,
    C: Clock,
{
    /// Perform `request` through the breaker, reporting why no payload was
    /// produced.
    pub async fn try_call_service(
        &self,
        mut request: OutboundRequest,
    ) -> BreakerResult<E::Output> {
        let endpoint = request.endpoint_key();
        if !self.can_request(&endpoint) {
            tracing::debug!(endpoint = %endpoint, "Circuit open, failing fast");
            return Err(BreakerError::Rejected { endpoint });
        }

        request.timeout = Some(self.request_timeout);
        let outcome = tokio::time::timeout(self.request_timeout, self.executor.execute(request)).await;

        match outcome {
            Ok(Ok(payload)) => {
                self.on_success(&endpoint);
                Ok(payload)
            }
            Ok(Err(e)) => {
                self.on_failure(&endpoint);
                Err(BreakerError::Failed {
                    endpoint,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.on_failure(&endpoint);
                Err(BreakerError::TimedOut {
                    endpoint,
                    timeout: self.request_timeout,
                })
            }
        }
    }

    /// Perform `request` through the breaker.
    ///
    /// Returns `None` both when the circuit rejected the call and when the
    /// call was attempted and failed. Use [`Self::try_call_service`] to tell
    /// the two apart.
    pub async fn call_service(&self, request: OutboundRequest) -> Option<E::Output> {
        match self.try_call_service(request).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!(error = %e, "Guarded call produced no payload");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Error)]
    #[error("scripted failure")]
    struct ScriptedFailure;

    /// Executor whose outcome is flipped by the test.
    #[derive(Default)]
    struct ScriptedExecutor {
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Option<Duration>,
        seen_timeouts: Mutex<Vec<Option<Duration>>>,
    }

    impl ScriptedExecutor {
        fn failing() -> Self {
            let exec = Self::default();
            exec.failing.store(true, Ordering::SeqCst);
            exec
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl OutboundExecutor for ScriptedExecutor {
        type Output = Value;
        type Error = ScriptedFailure;

        async fn execute(&self, request: OutboundRequest) -> Result<Value, ScriptedFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_timeouts.lock().unwrap().push(request.timeout);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                Err(ScriptedFailure)
            } else {
                Ok(json!({"url": request.url}))
            }
        }
    }

    fn config(failure_threshold: u32, cooldown_secs: u64) -> BreakerConfig {
        BreakerConfig {
            failure_threshold,
            cooldown_secs,
            timeout_secs: 1,
        }
    }

    fn breaker(
        exec: Arc<ScriptedExecutor>,
        clock: Arc<ManualClock>,
    ) -> CircuitBreaker<Arc<ScriptedExecutor>, Arc<ManualClock>> {
        CircuitBreaker::with_clock(&config(3, 30), exec, clock)
    }

    const SVC: &str = "GET:/svc";

    #[test]
    fn test_fresh_breaker_admits() {
        let cb = breaker(Arc::default(), Arc::default());
        assert!(cb.state(SVC).is_none());
        assert!(cb.can_request(SVC));

        let state = cb.state(SVC).unwrap();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.failures, 0);
        assert_eq!(state.next_try_at, Duration::ZERO);
    }

    #[test]
    fn test_opens_only_after_exceeding_threshold() {
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(Arc::default(), clock.clone());
        cb.can_request(SVC);

        for _ in 0..3 {
            cb.on_failure(SVC);
        }
        assert_eq!(cb.state(SVC).unwrap().status, CircuitStatus::Closed);
        assert!(cb.can_request(SVC));

        cb.on_failure(SVC);
        let state = cb.state(SVC).unwrap();
        assert_eq!(state.status, CircuitStatus::Open);
        assert_eq!(state.failures, 4);
        assert_eq!(state.next_try_at, clock.now() + Duration::from_secs(30));
        assert!(!cb.can_request(SVC));
    }

    #[test]
    fn test_cooldown_boundary() {
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(Arc::default(), clock.clone());
        for _ in 0..4 {
            cb.on_failure(SVC);
        }

        clock.advance(Duration::from_secs(29));
        assert!(!cb.can_request(SVC));
        assert_eq!(cb.state(SVC).unwrap().status, CircuitStatus::Open);

        // next_try_at <= now admits
        clock.advance(Duration::from_secs(1));
        assert!(cb.can_request(SVC));
        assert_eq!(cb.state(SVC).unwrap().status, CircuitStatus::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_everyone() {
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(Arc::default(), clock.clone());
        for _ in 0..4 {
            cb.on_failure(SVC);
        }
        clock.advance(Duration::from_secs(31));

        for _ in 0..5 {
            assert!(cb.can_request(SVC));
        }
        assert_eq!(cb.state(SVC).unwrap().status, CircuitStatus::HalfOpen);
    }

    #[test]
    fn test_half_open_failure_reopens_without_reset() {
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(Arc::default(), clock.clone());
        for _ in 0..4 {
            cb.on_failure(SVC);
        }
        clock.advance(Duration::from_secs(31));
        assert!(cb.can_request(SVC));

        cb.on_failure(SVC);
        let state = cb.state(SVC).unwrap();
        assert_eq!(state.failures, 5);
        assert_eq!(state.status, CircuitStatus::Open);
        assert_eq!(state.next_try_at, clock.now() + Duration::from_secs(30));
        assert!(!cb.can_request(SVC));
    }

    #[test]
    fn test_success_resets_from_any_status() {
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(Arc::default(), clock.clone());

        cb.on_failure(SVC);
        cb.on_success(SVC);
        assert_eq!(cb.state(SVC).unwrap(), EndpointState::closed());

        for _ in 0..4 {
            cb.on_failure(SVC);
        }
        cb.on_success(SVC);
        assert_eq!(cb.state(SVC).unwrap(), EndpointState::closed());

        for _ in 0..4 {
            cb.on_failure(SVC);
        }
        clock.advance(Duration::from_secs(31));
        assert!(cb.can_request(SVC));
        cb.on_success(SVC);
        assert_eq!(cb.state(SVC).unwrap(), EndpointState::closed());
    }

    #[test]
    fn test_on_success_idempotent() {
        let cb = breaker(Arc::default(), Arc::default());
        cb.on_failure(SVC);
        cb.on_success(SVC);
        let once = cb.state(SVC);
        cb.on_success(SVC);
        assert_eq!(cb.state(SVC), once);
    }

    #[test]
    fn test_endpoints_are_isolated() {
        let cb = breaker(Arc::default(), Arc::default());
        for _ in 0..4 {
            cb.on_failure("GET:/a");
        }
        assert!(!cb.can_request("GET:/a"));
        assert!(cb.can_request("GET:/b"));
        assert!(cb.can_request("POST:/a"));
        assert_eq!(cb.state("GET:/b").unwrap().failures, 0);
    }

    #[test]
    fn test_zero_settings_use_defaults() {
        let cb = CircuitBreaker::with_clock(
            &BreakerConfig {
                failure_threshold: 0,
                cooldown_secs: 0,
                timeout_secs: 0,
            },
            ScriptedExecutor::default(),
            ManualClock::default(),
        );
        assert_eq!(cb.failure_threshold(), 3);
        assert_eq!(cb.cooldown(), Duration::from_secs(30));
        assert_eq!(cb.request_timeout(), Duration::from_secs(1));

        cb.on_failure(SVC);
        assert_eq!(cb.state(SVC).unwrap().status, CircuitStatus::Closed);
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let clock = Arc::new(ManualClock::default());
        let cb = CircuitBreaker::with_clock(
            &config(1, u64::MAX),
            ScriptedExecutor::default(),
            clock.clone(),
        );
        cb.on_failure(SVC);
        cb.on_failure(SVC);

        let state = cb.state(SVC).unwrap();
        assert_eq!(state.status, CircuitStatus::Open);
        assert_eq!(state.next_try_at, Duration::MAX);

        clock.advance(Duration::from_secs(365 * 86_400));
        assert!(!cb.can_request(SVC));
    }

    #[tokio::test]
    async fn test_open_circuit_scenario() {
        let exec = Arc::new(ScriptedExecutor::failing());
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(exec.clone(), clock.clone());

        for _ in 0..4 {
            assert!(cb.call_service(OutboundRequest::get("/svc")).await.is_none());
        }
        assert_eq!(exec.calls(), 4);
        assert_eq!(cb.state(SVC).unwrap().status, CircuitStatus::Open);

        // 5th call fails fast
        assert!(cb.call_service(OutboundRequest::get("/svc")).await.is_none());
        assert_eq!(exec.calls(), 4);

        clock.advance(Duration::from_secs(31));
        exec.failing.store(false, Ordering::SeqCst);
        let payload = cb.call_service(OutboundRequest::get("/svc")).await;
        assert_eq!(payload, Some(json!({"url": "/svc"})));
        assert_eq!(exec.calls(), 5);
        assert_eq!(cb.state(SVC).unwrap(), EndpointState::closed());
    }

    #[tokio::test]
    async fn test_try_call_distinguishes_rejection() {
        let exec = Arc::new(ScriptedExecutor::failing());
        let cb = breaker(exec.clone(), Arc::default());

        let mut last = None;
        for _ in 0..4 {
            last = cb.try_call_service(OutboundRequest::get("/svc")).await.err();
        }
        let failed = last.unwrap();
        assert!(failed.was_attempted());
        assert!(matches!(failed, BreakerError::Failed { .. }));

        let rejected = cb
            .try_call_service(OutboundRequest::get("/svc"))
            .await
            .unwrap_err();
        assert!(!rejected.was_attempted());
        assert_eq!(rejected.to_string(), "circuit for GET:/svc is open");
    }

    #[tokio::test]
    async fn test_breaker_timeout_overrides_caller() {
        let exec = Arc::new(ScriptedExecutor::default());
        let cb = breaker(exec.clone(), Arc::default());

        let request = OutboundRequest::get("/svc").timeout(Duration::from_secs(60));
        assert!(cb.call_service(request).await.is_some());
        assert_eq!(
            *exec.seen_timeouts.lock().unwrap(),
            vec![Some(Duration::from_millis(1000))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_and_counts_as_failure() {
        let exec = Arc::new(ScriptedExecutor {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let cb = breaker(exec.clone(), Arc::default());

        let err = cb
            .try_call_service(OutboundRequest::get("/svc"))
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::TimedOut { timeout, .. } if timeout == Duration::from_secs(1)));
        assert_eq!(cb.state(SVC).unwrap().failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_are_not_lost() {
        let cb = Arc::new(CircuitBreaker::with_clock(
            &config(1_000, 30),
            ScriptedExecutor::default(),
            ManualClock::default(),
        ));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cb = cb.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    cb.can_request(SVC);
                    cb.on_failure(SVC);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(cb.state(SVC).unwrap().failures, 500);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(CircuitStatus::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitStatus::Open.to_string(), "OPEN");
        assert_eq!(CircuitStatus::HalfOpen.to_string(), "HALF_OPEN");
    }
}
