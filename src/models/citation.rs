//! Citation lookup keys, results and cache entries.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::NormalizedRecord;
use crate::utils::identifiers::{normalize_doi, normalize_url};

/// Which resolution strategy produced a citation count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    Cache,
    Inline,
    Primary,
    Fallback,
}

/// Normalized identifier used to address citation data.
///
/// `doi:<doi>` when the record has a usable DOI, otherwise `url:<url>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationKey(String);

impl CitationKey {
    pub fn from_doi(doi: &str) -> Option<Self> {
        normalize_doi(doi).ok().map(|d| Self(format!("doi:{}", d)))
    }

    pub fn from_url(url: &str) -> Option<Self> {
        normalize_url(url).ok().map(|u| Self(format!("url:{}", u)))
    }

    pub fn for_record(record: &NormalizedRecord) -> Option<Self> {
        record
            .doi
            .as_deref()
            .and_then(Self::from_doi)
            .or_else(|| record.url.as_deref().and_then(Self::from_url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn doi(&self) -> Option<&str> {
        self.0.strip_prefix("doi:")
    }

    pub fn url(&self) -> Option<&str> {
        self.0.strip_prefix("url:")
    }
}

impl std::fmt::Display for CitationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counts returned by an external citation service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitationCounts {
    pub citation_count: u32,
    pub reference_count: Option<u32>,
}

/// A resolved citation lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationResult {
    pub identifier: String,
    pub citation_count: u32,
    pub reference_count: Option<u32>,
    /// Tier that answered this lookup
    pub tier: ResolutionTier,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of tiered citation resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(CitationResult),
    /// Every tier was exhausted; not an error
    Unresolved,
}

impl Resolution {
    pub fn result(&self) -> Option<&CitationResult> {
        match self {
            Resolution::Resolved(r) => Some(r),
            Resolution::Unresolved => None,
        }
    }

    pub fn into_result(self) -> Option<CitationResult> {
        match self {
            Resolution::Resolved(r) => Some(r),
            Resolution::Unresolved => None,
        }
    }
}

/// A persisted citation lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationCacheEntry {
    pub identifier: String,
    pub citation_count: u32,
    pub reference_count: Option<u32>,
    /// Tier that originally produced the data
    pub tier: ResolutionTier,
    pub fetched_at: DateTime<Utc>,
}

impl CitationCacheEntry {
    pub fn new(key: &CitationKey, counts: CitationCounts, tier: ResolutionTier) -> Self {
        Self {
            identifier: key.as_str().to_string(),
            citation_count: counts.citation_count,
            reference_count: counts.reference_count,
            tier,
            fetched_at: Utc::now(),
        }
    }

    /// Entries older than `ttl` are treated as absent
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match ChronoDuration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.fetched_at) > ttl,
            Err(_) => false,
        }
    }

    /// The entry as a result served from the given tier
    pub fn to_result(&self, tier: ResolutionTier) -> CitationResult {
        CitationResult {
            identifier: self.identifier.clone(),
            citation_count: self.citation_count,
            reference_count: self.reference_count,
            tier,
            fetched_at: self.fetched_at,
        }
    }
}
