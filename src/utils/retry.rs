//! Backoff schedules and failure classification for outbound calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest wait any policy or `Retry-After` header may impose
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 3600);

/// How the wait grows across consecutive rate-limit responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffSchedule {
    /// Same delay every time; for APIs that publish a strict request rate
    Fixed,
    /// Delay doubles per consecutive rate-limit response, up to a cap
    Exponential,
}

/// Backoff policy for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub schedule: BackoffSchedule,
    /// Delay after the first rate-limit response
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
    /// Upper bound for exponential growth
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Growth factor for exponential schedules
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(2), Duration::from_secs(60))
    }
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            schedule: BackoffSchedule::Fixed,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            schedule: BackoffSchedule::Exponential,
            base_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    /// Check that the policy produces growing, bounded waits
    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "multiplier must be a finite number >= 1, got {}",
                self.multiplier
            ));
        }
        let longest = match self.schedule {
            BackoffSchedule::Fixed => self.base_delay,
            BackoffSchedule::Exponential => {
                if self.max_delay < self.base_delay {
                    return Err(format!(
                        "max_delay ({:?}) is shorter than base_delay ({:?})",
                        self.max_delay, self.base_delay
                    ));
                }
                self.max_delay
            }
        };
        if longest > MAX_BACKOFF {
            return Err(format!(
                "delays above {}s are not allowed, got {:?}",
                MAX_BACKOFF.as_secs(),
                longest
            ));
        }
        Ok(())
    }

    /// Wait before the next call after the `attempt`-th consecutive rate-limit
    /// response (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.schedule {
            BackoffSchedule::Fixed => self.base_delay,
            BackoffSchedule::Exponential => {
                let exponent = attempt.saturating_sub(1).min(32) as i32;
                let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
                let capped = secs.min(self.max_delay.as_secs_f64());
                Duration::from_secs_f64(capped.max(0.0))
            }
        }
    }

    /// Like [`delay_for`](Self::delay_for), with a server-supplied floor.
    /// Never longer than [`MAX_BACKOFF`].
    pub fn delay_with_floor(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay_for(attempt);
        let delay = match retry_after {
            Some(floor) => delay.max(floor),
            None => delay,
        };
        delay.min(MAX_BACKOFF)
    }
}

/// How a failed call counts against an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection error, timeout or server error; counts toward opening the breaker
    Hard,
    /// Rate limited; triggers backoff and a retry, never touches the breaker
    Soft { retry_after: Option<Duration> },
    /// The endpoint answered but the request cannot succeed (404, bad payload)
    Permanent,
}

impl FailureKind {
    /// Classify an HTTP status that is not a success
    pub fn from_status(status: reqwest::StatusCode, retry_after: Option<Duration>) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            FailureKind::Soft { retry_after }
        } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
            FailureKind::Hard
        } else {
            FailureKind::Permanent
        }
    }

    /// Classify a transport-level reqwest error
    pub fn from_reqwest_error(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, None);
        }
        if err.is_decode() || err.is_builder() {
            FailureKind::Permanent
        } else {
            FailureKind::Hard
        }
    }
}

/// Errors that know how they should count against an endpoint
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

/// Parse a `Retry-After` header value: delta-seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = when.with_timezone(&Utc).signed_duration_since(Utc::now());
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
