//! Crossref REST API citation counts.

use async_trait::async_trait;
use serde::Deserialize;

use super::{get_json, CitationProvider, ProviderError};
use crate::models::{CitationCounts, CitationKey};
use crate::utils::HttpClient;

pub const CROSSREF_API_BASE: &str = "https://api.crossref.org";

#[derive(Debug, Deserialize)]
struct CRResponse {
    message: CRWork,
}

#[derive(Debug, Deserialize)]
struct CRWork {
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<u32>,
    #[serde(rename = "reference-count")]
    reference_count: Option<u32>,
}

/// Crossref lookups. DOIs only.
///
/// Passing a contact address puts requests in Crossref's "polite" pool.
#[derive(Debug, Clone)]
pub struct CrossrefProvider {
    client: HttpClient,
    base_url: String,
    mailto: Option<String>,
}

impl CrossrefProvider {
    pub fn new(client: HttpClient, base_url: impl Into<String>, mailto: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto,
        }
    }
}

#[async_trait]
impl CitationProvider for CrossrefProvider {
    fn name(&self) -> &str {
        "Crossref"
    }

    async fn fetch(&self, key: &CitationKey) -> Result<CitationCounts, ProviderError> {
        let doi = key
            .doi()
            .ok_or_else(|| ProviderError::Unsupported(key.to_string()))?;
        let encoded: String = url::form_urlencoded::byte_serialize(doi.as_bytes()).collect();
        let url = format!("{}/works/{}", self.base_url, encoded);

        let mut request = self.client.client().get(&url);
        if let Some(mailto) = &self.mailto {
            request = request.query(&[("mailto", mailto.as_str())]);
        }

        let data: CRResponse = get_json(request).await?;
        let citation_count = data
            .message
            .is_referenced_by_count
            .ok_or_else(|| ProviderError::Parse(format!("no is-referenced-by-count for {}", key)))?;

        Ok(CitationCounts {
            citation_count,
            reference_count: data.message.reference_count,
        })
    }
}
