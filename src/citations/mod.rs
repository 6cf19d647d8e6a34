//! Citation-count enrichment.
//!
//! [`CitationResolver`] answers "how often is this work cited?" by trying, in
//! order, the [`CitationCache`], the counts the originating source shipped
//! inline, a primary [`CitationProvider`] and a fallback provider. Both external
//! tiers run through the [`ResilienceGovernor`] under the endpoint names
//! [`PRIMARY_ENDPOINT`] and [`FALLBACK_ENDPOINT`].
//!
//! [`CitationCache`]: crate::utils::CitationCache
//! [`ResilienceGovernor`]: crate::utils::ResilienceGovernor

mod crossref;
mod resolver;
mod semantic;

pub use crossref::CrossrefProvider;
pub use resolver::CitationResolver;
pub use semantic::SemanticScholarProvider;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use crate::models::{CitationCounts, CitationKey};
use crate::utils::{parse_retry_after, Classify, FailureKind};

/// Governor endpoint for the primary citation service
pub const PRIMARY_ENDPOINT: &str = "primary";
/// Governor endpoint for the fallback citation service
pub const FALLBACK_ENDPOINT: &str = "fallback";

/// An external service that reports citation and reference counts
#[async_trait]
pub trait CitationProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable name of this service
    fn name(&self) -> &str;

    /// Fetch counts for a normalized identifier
    async fn fetch(&self, key: &CitationKey) -> Result<CitationCounts, ProviderError>;
}

/// Errors from citation services
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-success HTTP status
    #[error("HTTP {status}")]
    Status {
        status: StatusCode,
        retry_after: Option<Duration>,
    },

    /// Transport error (connection, TLS, body read)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response did not carry the expected fields
    #[error("Parse error: {0}")]
    Parse(String),

    /// The service cannot look up this kind of identifier
    #[error("Unsupported identifier: {0}")]
    Unsupported(String),
}

impl Classify for ProviderError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            ProviderError::Status {
                status,
                retry_after,
            } => FailureKind::from_status(*status, *retry_after),
            ProviderError::Network(e) => FailureKind::from_reqwest_error(e),
            ProviderError::Parse(_) | ProviderError::Unsupported(_) => FailureKind::Permanent,
        }
    }
}

/// Send a request and decode a JSON body, mapping failures onto [`ProviderError`]
pub(crate) async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ProviderError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(ProviderError::Status {
            status,
            retry_after,
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ProviderError::Parse(format!("Failed to parse JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let rate_limited = ProviderError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(
            rate_limited.failure_kind(),
            FailureKind::Soft {
                retry_after: Some(Duration::from_secs(5))
            }
        );

        let unavailable = ProviderError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            retry_after: None,
        };
        assert_eq!(unavailable.failure_kind(), FailureKind::Hard);

        let missing = ProviderError::Status {
            status: StatusCode::NOT_FOUND,
            retry_after: None,
        };
        assert_eq!(missing.failure_kind(), FailureKind::Permanent);

        assert_eq!(
            ProviderError::Parse("bad".into()).failure_kind(),
            FailureKind::Permanent
        );
        assert_eq!(
            ProviderError::Unsupported("url:x".into()).failure_kind(),
            FailureKind::Permanent
        );
    }
}
