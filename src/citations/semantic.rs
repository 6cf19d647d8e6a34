//! Semantic Scholar Graph API citation counts.

use async_trait::async_trait;
use serde::Deserialize;

use super::{get_json, CitationProvider, ProviderError};
use crate::models::{CitationCounts, CitationKey};
use crate::utils::HttpClient;

pub const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const FIELDS: &str = "citationCount,referenceCount";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    citation_count: Option<u32>,
    reference_count: Option<u32>,
}

/// Semantic Scholar lookups by DOI or by landing-page URL.
///
/// An API key is optional; without one the shared public rate limit applies.
#[derive(Debug, Clone)]
pub struct SemanticScholarProvider {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarProvider {
    pub fn new(client: HttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Semantic Scholar paper id for a key: `DOI:<doi>` or `URL:<url>`
    fn paper_id(key: &CitationKey) -> String {
        let id = match (key.doi(), key.url()) {
            (Some(doi), _) => format!("DOI:{}", doi),
            (None, Some(url)) => format!("URL:https://{}", url),
            (None, None) => key.as_str().to_string(),
        };
        url::form_urlencoded::byte_serialize(id.as_bytes()).collect()
    }

    /// Add API key to request headers if available
    fn add_api_key_if_present(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl CitationProvider for SemanticScholarProvider {
    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    async fn fetch(&self, key: &CitationKey) -> Result<CitationCounts, ProviderError> {
        let url = format!("{}/paper/{}", self.base_url, Self::paper_id(key));
        let request = self
            .add_api_key_if_present(self.client.client().get(&url))
            .query(&[("fields", FIELDS)]);

        let paper: S2Paper = get_json(request).await?;
        let citation_count = paper
            .citation_count
            .ok_or_else(|| ProviderError::Parse(format!("no citationCount for {}", key)))?;

        Ok(CitationCounts {
            citation_count,
            reference_count: paper.reference_count,
        })
    }
}
