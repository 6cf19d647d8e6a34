//! Per-endpoint resilience: circuit breaking, rate-limit backoff and call timeouts.
//!
//! Every outbound call goes through [`ResilienceGovernor::guard`]. Hard
//! failures count toward opening the endpoint's circuit, rate-limit responses
//! schedule a backoff and retry the same call, and permanent errors prove the
//! endpoint answered.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep_until, timeout, Instant};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::retry::{BackoffPolicy, Classify, FailureKind};

/// Governor settings shared by all endpoints
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub breaker: CircuitBreakerConfig,
    /// Timeout applied to every guarded call
    pub call_timeout: Duration,
    /// Same-call retries after rate-limit responses
    pub max_rate_limit_retries: u32,
    /// Policy for endpoints without an explicit entry
    pub default_backoff: BackoffPolicy,
    pub endpoints: HashMap<String, BackoffPolicy>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            call_timeout: Duration::from_secs(30),
            max_rate_limit_retries: 3,
            default_backoff: BackoffPolicy::default(),
            endpoints: HashMap::new(),
        }
    }
}

impl GovernorConfig {
    pub fn backoff_for(&self, endpoint: &str) -> BackoffPolicy {
        self.endpoints
            .get(endpoint)
            .copied()
            .unwrap_or(self.default_backoff)
    }
}

/// Why a guarded call did not produce a value
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The circuit is open; the call was never invoked
    #[error("circuit is open for {endpoint} (endpoint may be temporarily unavailable)")]
    Rejected { endpoint: String },

    #[error("call to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("rate limited by {endpoint} after {attempts} attempts: {last}")]
    RateLimited {
        endpoint: String,
        attempts: u32,
        last: E,
    },

    #[error("{0}")]
    Failed(E),
}

impl<E> GuardError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, GuardError::Rejected { .. })
    }
}

#[derive(Debug, Default)]
struct Backoff {
    /// Consecutive rate-limit responses across calls
    streak: u32,
    until: Option<Instant>,
}

#[derive(Debug)]
struct Endpoint {
    breaker: CircuitBreaker,
    policy: BackoffPolicy,
    backoff: Mutex<Backoff>,
}

impl Endpoint {
    fn pending_backoff(&self) -> Option<Instant> {
        let backoff = self.backoff.lock().unwrap_or_else(PoisonError::into_inner);
        backoff.until.filter(|until| *until > Instant::now())
    }

    fn schedule_backoff(&self, retry_after: Option<Duration>) -> Duration {
        let mut backoff = self.backoff.lock().unwrap_or_else(PoisonError::into_inner);
        backoff.streak += 1;
        let delay = self.policy.delay_with_floor(backoff.streak, retry_after);
        backoff.until = Some(Instant::now() + delay);
        delay
    }

    fn clear_backoff(&self) {
        let mut backoff = self.backoff.lock().unwrap_or_else(PoisonError::into_inner);
        backoff.streak = 0;
        backoff.until = None;
    }

    fn rate_limit_streak(&self) -> u32 {
        self.backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .streak
    }
}

/// Snapshot of one endpoint's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    pub endpoint: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub rate_limit_streak: u32,
}

/// Manager for per-endpoint breakers and backoff state
#[derive(Debug, Default)]
pub struct ResilienceGovernor {
    config: GovernorConfig,
    endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
}

impl ResilienceGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Get or create the state for an endpoint
    fn endpoint(&self, name: &str) -> Arc<Endpoint> {
        {
            let read_guard = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(endpoint) = read_guard.get(name) {
                return Arc::clone(endpoint);
            }
        }

        let mut write_guard = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Double-check after acquiring write lock
        if let Some(endpoint) = write_guard.get(name) {
            return Arc::clone(endpoint);
        }

        let endpoint = Arc::new(Endpoint {
            breaker: CircuitBreaker::with_config(name, self.config.breaker),
            policy: self.config.backoff_for(name),
            backoff: Mutex::new(Backoff::default()),
        });
        write_guard.insert(name.to_string(), Arc::clone(&endpoint));
        endpoint
    }

    /// Run `call` under the endpoint's breaker, backoff and timeout.
    ///
    /// `call` is invoked again only after a rate-limit response, at most
    /// `max_rate_limit_retries` times. A rejected call is never invoked.
    pub async fn guard<T, E, F, Fut>(&self, endpoint: &str, mut call: F) -> Result<T, GuardError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let state = self.endpoint(endpoint);
        let mut attempts = 0u32;

        loop {
            if let Some(until) = state.pending_backoff() {
                tracing::debug!(
                    "[governor] {}: waiting {:?} for rate-limit backoff",
                    endpoint,
                    until.saturating_duration_since(Instant::now())
                );
                sleep_until(until).await;
            }

            let permit = match state.breaker.try_acquire() {
                Some(permit) => permit,
                None => {
                    tracing::debug!("[governor] {}: rejected, circuit open", endpoint);
                    return Err(GuardError::Rejected {
                        endpoint: endpoint.to_string(),
                    });
                }
            };

            attempts += 1;
            let outcome = timeout(self.config.call_timeout, call()).await;

            let error = match outcome {
                Ok(Ok(value)) => {
                    permit.success();
                    state.clear_backoff();
                    return Ok(value);
                }
                Ok(Err(error)) => error,
                Err(_) => {
                    permit.failure();
                    tracing::debug!(
                        "[governor] {}: call timed out after {:?}",
                        endpoint,
                        self.config.call_timeout
                    );
                    return Err(GuardError::Timeout {
                        endpoint: endpoint.to_string(),
                        timeout: self.config.call_timeout,
                    });
                }
            };

            match error.failure_kind() {
                FailureKind::Hard => {
                    permit.failure();
                    tracing::debug!("[governor] {}: hard failure: {}", endpoint, error);
                    return Err(GuardError::Failed(error));
                }
                FailureKind::Permanent => {
                    permit.success();
                    return Err(GuardError::Failed(error));
                }
                FailureKind::Soft { retry_after } => {
                    // Leaves the breaker untouched; frees a half-open trial slot
                    drop(permit);
                    let delay = state.schedule_backoff(retry_after);
                    if attempts > self.config.max_rate_limit_retries {
                        tracing::debug!(
                            "[governor] {}: rate limited {} times, giving up",
                            endpoint,
                            attempts
                        );
                        return Err(GuardError::RateLimited {
                            endpoint: endpoint.to_string(),
                            attempts,
                            last: error,
                        });
                    }
                    tracing::debug!(
                        "[governor] {}: rate limited, retrying in {:?}",
                        endpoint,
                        delay
                    );
                }
            }
        }
    }

    /// Status of every endpoint seen so far, sorted by name
    pub fn status(&self) -> Vec<EndpointStatus> {
        let guard = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        let mut status: Vec<EndpointStatus> = guard
            .iter()
            .map(|(name, endpoint)| EndpointStatus {
                endpoint: name.clone(),
                state: endpoint.breaker.state(),
                consecutive_failures: endpoint.breaker.failure_count(),
                rate_limit_streak: endpoint.rate_limit_streak(),
            })
            .collect();
        status.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        status
    }

    /// State of one endpoint; endpoints never called are closed
    pub fn state(&self, endpoint: &str) -> CircuitState {
        let guard = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(endpoint)
            .map(|e| e.breaker.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Reset all circuit breakers and pending backoffs
    pub fn reset_all(&self) {
        let guard = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        for endpoint in guard.values() {
            endpoint.breaker.reset();
            endpoint.clear_backoff();
        }
    }
}
