//! Circuit breaker pattern implementation for API resilience.
//!
//! The circuit breaker prevents cascading failures by temporarily disabling
//! calls to endpoints that are failing. It has three states:
//!
//! - **Closed**: Normal operation, calls pass through
//! - **Open**: Endpoint is failing, calls are rejected without being invoked
//! - **Half-Open**: The open timeout elapsed; exactly one trial call is admitted
//!
//! # Usage
//!
//! ```rust
//! use research_corpus::utils::{CircuitBreaker, CircuitState};
//!
//! let breaker = CircuitBreaker::new("primary", 5, std::time::Duration::from_secs(60));
//!
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! ```

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failing - calls are rejected
    Open,
    /// Testing recovery - one trial call allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive hard failures before opening the circuit
    pub failure_threshold: u32,

    /// Duration to stay open before admitting a trial call
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_transition: Instant,
    trial_in_flight: bool,
}

/// Thread-safe circuit breaker for one endpoint
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Circuit name (e.g., "primary", "fallback")
    name: String,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    ///
    /// - `name`: Identifier for this circuit (e.g., "primary")
    /// - `failure_threshold`: Consecutive hard failures before opening (default: 5)
    /// - `open_timeout`: Time to stay open before half-open (default: 60s)
    pub fn new(name: &str, failure_threshold: u32, open_timeout: Duration) -> Self {
        Self::with_config(
            name,
            CircuitBreakerConfig {
                failure_threshold,
                open_timeout,
            },
        )
    }

    pub fn with_config(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_transition: Instant::now(),
                trial_in_flight: false,
            }),
        }
    }

    /// Create with default settings
    pub fn default_for(name: &str) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Number of consecutive hard failures recorded while closed
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to make a call.
    ///
    /// Returns `None` when the call must be rejected without being invoked.
    /// The returned permit must be settled with the call outcome; dropping it
    /// unsettled releases a half-open trial slot without changing state.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(Permit::new(self, false)),
            CircuitState::Open => {
                let now = Instant::now();
                if now.duration_since(inner.last_transition) < self.config.open_timeout {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.last_transition = now;
                inner.trial_in_flight = true;
                tracing::info!(
                    "[circuit-breaker] {}: circuit half-open, admitting trial call",
                    self.name
                );
                Some(Permit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(Permit::new(self, true))
                }
            }
        }
    }

    /// Check if a call would currently be admitted, without taking a permit
    pub fn can_request(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                Instant::now().duration_since(inner.last_transition) >= self.config.open_timeout
            }
            CircuitState::HalfOpen => !inner.trial_in_flight,
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        match (inner.state, trial) {
            (CircuitState::Closed, false) => {
                inner.consecutive_failures = 0;
            }
            (CircuitState::HalfOpen, true) => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.last_transition = Instant::now();
                inner.trial_in_flight = false;
                tracing::info!("[circuit-breaker] {}: circuit closed (recovered)", self.name);
            }
            // Late result from a call admitted before the circuit opened
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        match (inner.state, trial) {
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_transition = Instant::now();
                    tracing::warn!(
                        "[circuit-breaker] {}: circuit opened ({} failures)",
                        self.name,
                        inner.consecutive_failures
                    );
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.state = CircuitState::Open;
                inner.last_transition = Instant::now();
                inner.trial_in_flight = false;
                tracing::warn!(
                    "[circuit-breaker] {}: circuit reopened (trial call failed)",
                    self.name
                );
            }
            _ => {}
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_transition = Instant::now();
        inner.trial_in_flight = false;
    }
}

/// Admission to make one call through a [`CircuitBreaker`]
#[derive(Debug)]
#[must_use = "a permit must be settled with the call outcome"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is the single half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// The endpoint answered
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    /// Hard failure: connection error, timeout or server error
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}
