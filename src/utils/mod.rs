//! Utility modules supporting the aggregation pipeline.
//!
//! - [`ResilienceGovernor`]: Per-endpoint circuit breaking and rate-limit backoff
//! - [`CircuitBreaker`]: Three-state breaker guarding one endpoint
//! - [`BackoffPolicy`]: Fixed or exponential wait schedules
//! - [`CitationCache`]: Citation lookups with lazy expiry and atomic on-disk entries
//! - [`Deduplicator`]: Cross-source grouping and completeness-ranked merging
//! - [`HttpClient`]: Shared reqwest client
//! - [`identifiers`]: DOI, URL and title normalization
//!
//! # Guarding a call
//!
//! ```rust,no_run
//! use research_corpus::utils::{FailureKind, Classify, GovernorConfig, ResilienceGovernor};
//!
//! #[derive(Debug)]
//! struct Unavailable;
//!
//! impl std::fmt::Display for Unavailable {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("service unavailable")
//!     }
//! }
//!
//! impl Classify for Unavailable {
//!     fn failure_kind(&self) -> FailureKind {
//!         FailureKind::Hard
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let governor = ResilienceGovernor::new(GovernorConfig::default());
//! let result = governor
//!     .guard("primary", || async { Err::<u32, _>(Unavailable) })
//!     .await;
//! assert!(result.is_err());
//! # }
//! ```

mod cache;
mod circuit_breaker;
mod dedup;
mod governor;
mod http;
pub mod identifiers;
mod retry;

pub use cache::{CacheError, CacheResult, CacheStats, CitationCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Permit};
pub use dedup::{DedupReport, Deduplicator};
pub use governor::{EndpointStatus, GovernorConfig, GuardError, ResilienceGovernor};
pub use http::HttpClient;
pub use identifiers::IdentifierError;
pub use retry::{
    parse_retry_after, BackoffPolicy, BackoffSchedule, Classify, FailureKind, MAX_BACKOFF,
};
