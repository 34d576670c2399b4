//! Retry policy, exponential backoff, and the retrying broker decorator.
//!
//! Transient broker failures (timeouts, throttling, connection drops) are
//! retried with exponential backoff and jitter; everything else propagates
//! immediately. A circuit breaker sheds requests after repeated failures so a
//! degraded broker does not stall the whole monitoring loop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::adapter::{BrokerAdapter, OrderHandle, OrderSnapshot, OrderSpec};
use super::error::BrokerError;
use crate::models::Quote;

/// Retry policy configuration for broker calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth.
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; failures propagate on first occurrence.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Calculator for exponential backoff with jitter.
#[derive(Debug)]
pub struct ExponentialBackoff {
    current_attempt: u32,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Create a backoff calculator from a retry policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_attempt: 0,
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Next backoff duration with jitter, or `None` once attempts are spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let base_ms = self.base_backoff_ms();
        let jittered_ms = self.apply_jitter(base_ms).min(self.max_backoff_ms);

        self.current_attempt += 1;

        Some(Duration::from_millis(jittered_ms))
    }

    fn base_backoff_ms(&self) -> u64 {
        let multiplier = self.backoff_multiplier.powi(self.current_attempt as i32);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    /// Random value in `[backoff * (1 - jitter), backoff * (1 + jitter)]`.
    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        let mut rng = rand::rng();
        let jitter_range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - jitter_range).max(0.0);
        let max = backoff_ms as f64 + jitter_range;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = rng.random_range(min..=max) as u64;
        jittered
    }

    /// Current attempt number.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

/// Circuit breaker guarding broker calls.
///
/// Opens after `failure_threshold` consecutive failures and rejects calls
/// with [`BrokerError::CircuitOpen`] until `open_duration` elapses, after
/// which the next call is allowed through as a probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
    is_open: AtomicBool,
    opened_at: Mutex<Option<Instant>>,
    open_duration: Duration,
}

impl CircuitBreaker {
    /// Create a circuit breaker with the given threshold and open duration.
    #[must_use]
    pub const fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            failure_threshold,
            is_open: AtomicBool::new(false),
            opened_at: Mutex::new(None),
            open_duration,
        }
    }

    /// Whether a call may proceed right now.
    pub fn allow_request(&self) -> bool {
        if !self.is_open.load(Ordering::Acquire) {
            return true;
        }

        let mut opened_at = self.opened_at.lock();
        match *opened_at {
            Some(instant) if instant.elapsed() >= self.open_duration => {
                // Half-open: let one probe through.
                self.is_open.store(false, Ordering::Release);
                *opened_at = None;
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Record a successful call; closes the circuit.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.is_open.store(false, Ordering::Release);
    }

    /// Record a failed call; opens the circuit at the threshold.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold {
            self.is_open.store(true, Ordering::Release);
            *self.opened_at.lock() = Some(Instant::now());
            tracing::warn!(
                consecutive_failures = failures,
                "broker circuit breaker opened"
            );
        }
    }

    /// Whether the circuit is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

/// Broker decorator that retries transient failures with backoff.
pub struct RetryingBroker<B> {
    inner: B,
    policy: RetryPolicy,
    circuit: CircuitBreaker,
}

impl<B: BrokerAdapter> RetryingBroker<B> {
    /// Wrap a broker with the default retry policy and circuit breaker.
    #[must_use]
    pub fn new(inner: B) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    /// Wrap a broker with a custom retry policy.
    #[must_use]
    pub fn with_policy(inner: B, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            circuit: CircuitBreaker::default(),
        }
    }

    /// Access the wrapped broker.
    #[must_use]
    pub const fn inner(&self) -> &B {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, BrokerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        if !self.circuit.allow_request() {
            return Err(BrokerError::CircuitOpen);
        }

        let mut backoff = ExponentialBackoff::new(&self.policy);

        loop {
            match call().await {
                Ok(value) => {
                    self.circuit.record_success();
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    self.circuit.record_failure();

                    // A broker-supplied Retry-After overrides the backoff.
                    let delay = if let BrokerError::RateLimited {
                        retry_after_secs: Some(secs),
                    } = &err
                    {
                        backoff
                            .next_backoff()
                            .map(|_| Duration::from_secs(*secs))
                    } else {
                        backoff.next_backoff()
                    };

                    match delay {
                        Some(delay) => {
                            tracing::warn!(
                                operation,
                                attempt = backoff.current_attempt(),
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "transient broker error, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(
                                operation,
                                attempts = backoff.current_attempt(),
                                error = %err,
                                "broker retries exhausted"
                            );
                            return Err(err);
                        }
                    }
                }
                Err(err) => {
                    self.circuit.record_failure();
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl<B: BrokerAdapter> BrokerAdapter for RetryingBroker<B> {
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderHandle, BrokerError> {
        self.with_retry("place_order", || self.inner.place_order(spec))
            .await
    }

    async fn replace_order(
        &self,
        order_id: &str,
        new_limit: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        self.with_retry("replace_order", || {
            self.inner.replace_order(order_id, new_limit)
        })
        .await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.with_retry("cancel_order", || self.inner.cancel_order(order_id))
            .await
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        self.with_retry("get_quote", || self.inner.get_quote(symbol))
            .await
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderSnapshot, BrokerError> {
        self.with_retry("get_order_status", || self.inner.get_order_status(order_id))
            .await
    }

    fn broker_name(&self) -> &str {
        self.inner.broker_name()
    }
}
