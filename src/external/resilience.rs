//! Outbound-call resilience for C7's stage-service calls and the source
//! fetcher: a circuit breaker and a per-endpoint token-bucket rate
//! limiter, adapted from the teacher's calendar integration (which
//! protected outbound Google Calendar/OAuth2 calls the same way).

use crate::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub timeout_duration: Duration,
    pub success_threshold: usize,
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_duration: Duration::from_secs(60),
            success_threshold: 2,
            failure_window: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: State,
    failure_count: usize,
    success_count: usize,
    last_failure_time: Option<Instant>,
    last_state_change: Instant,
}

/// Guards a single outbound collaborator (a stage service, the source
/// fetcher). Trips to `Open` after repeated failures, surfacing
/// `AppError::CircuitOpen` until `timeout_duration` elapses.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<RwLock<Inner>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                state: State::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                last_state_change: Instant::now(),
            })),
            config,
        }
    }

    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        if !self.should_allow_request().await {
            let retry_after = self.config.timeout_duration.as_secs();
            return Err(AppError::circuit_open(
                "breaker open: upstream reported repeated errors",
                retry_after,
            ));
        }

        match f().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure().await;
                Err(err)
            }
        }
    }

    async fn should_allow_request(&self) -> bool {
        let mut state = self.inner.write().await;
        let now = Instant::now();
        match state.state {
            State::Closed => true,
            State::Open => {
                if now.duration_since(state.last_state_change) >= self.config.timeout_duration {
                    tracing::info!("circuit breaker: Open -> HalfOpen");
                    state.state = State::HalfOpen;
                    state.success_count = 0;
                    state.last_state_change = now;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => true,
        }
    }

    async fn record_success(&self) {
        let mut state = self.inner.write().await;
        match state.state {
            State::Closed => state.failure_count = 0,
            State::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    tracing::info!("circuit breaker: HalfOpen -> Closed");
                    state.state = State::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.last_state_change = Instant::now();
                }
            }
            State::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut state = self.inner.write().await;
        let now = Instant::now();
        match state.state {
            State::Closed => {
                let stale = state
                    .last_failure_time
                    .is_some_and(|last| now.duration_since(last) > self.config.failure_window);
                state.failure_count = if stale { 1 } else { state.failure_count + 1 };
                state.last_failure_time = Some(now);
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!("circuit breaker opening after {} failures", state.failure_count);
                    state.state = State::Open;
                    state.last_state_change = now;
                }
            }
            State::HalfOpen => {
                tracing::warn!("circuit breaker: HalfOpen -> Open after failure");
                state.state = State::Open;
                state.last_failure_time = Some(now);
                state.last_state_change = now;
            }
            State::Open => {
                state.failure_count += 1;
                state.last_failure_time = Some(now);
            }
        }
    }

    pub async fn is_open(&self) -> bool {
        self.inner.read().await.state == State::Open
    }
}

#[derive(Clone)]
struct TokenBucket {
    capacity: usize,
    tokens: usize,
    last_refill: Instant,
    refill_interval: Duration,
}

impl TokenBucket {
    fn new(capacity: usize, refill_interval: Duration) -> Self {
        Self {
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
            refill_interval,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if elapsed >= self.refill_interval {
            let ticks = (elapsed.as_secs_f64() / self.refill_interval.as_secs_f64()) as usize;
            self.tokens = (self.tokens + ticks.max(1)).min(self.capacity);
            self.last_refill = now;
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn time_until_available(&self) -> Duration {
        let next_refill = self.last_refill + self.refill_interval;
        next_refill.saturating_duration_since(Instant::now())
    }
}

/// Per-endpoint token-bucket throttle for outbound stage-service and
/// source-fetcher calls (inbound per-IP limiting is explicitly out of
/// scope per spec.md §5).
pub struct RateLimiter {
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
    default_capacity: usize,
    default_refill: Duration,
}

impl RateLimiter {
    pub fn new(default_capacity: usize, default_refill: Duration) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            default_capacity,
            default_refill,
        }
    }

    pub async fn check(&self, endpoint: &str) -> Result<(), AppError> {
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(endpoint.to_string())
            .or_insert_with(|| TokenBucket::new(self.default_capacity, self.default_refill));

        if bucket.try_consume() {
            Ok(())
        } else {
            Err(AppError::circuit_open(
                format!("rate limit exceeded for {endpoint}"),
                bucket.time_until_available().as_secs(),
            ))
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(50, Duration::from_secs(30))
    }
}
