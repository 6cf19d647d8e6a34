//! Tiered citation resolution: cache, inline data, primary, fallback.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::{
    CitationProvider, CrossrefProvider, SemanticScholarProvider, FALLBACK_ENDPOINT,
    PRIMARY_ENDPOINT,
};
use crate::config::Config;
use crate::models::{
    CitationCacheEntry, CitationCounts, CitationKey, InlineCitations, NormalizedRecord, Resolution,
    ResolutionTier,
};
use crate::utils::{CacheResult, CitationCache, HttpClient, ResilienceGovernor};

/// Resolves citation counts through the cache and the configured services.
///
/// Exhausting every tier yields [`Resolution::Unresolved`]; resolution never
/// fails. Only successful lookups are cached.
#[derive(Debug, Clone)]
pub struct CitationResolver {
    cache: Arc<CitationCache>,
    governor: Arc<ResilienceGovernor>,
    primary: Option<Arc<dyn CitationProvider>>,
    fallback: Option<Arc<dyn CitationProvider>>,
    concurrency: usize,
}

impl CitationResolver {
    /// A resolver with no external services: cache and inline data only
    pub fn new(cache: Arc<CitationCache>, governor: Arc<ResilienceGovernor>) -> Self {
        Self {
            cache,
            governor,
            primary: None,
            fallback: None,
            concurrency: 3,
        }
    }

    /// Build the resolver described by `config`: Semantic Scholar as primary,
    /// Crossref as fallback, unless external lookups are disabled.
    pub fn from_config(
        config: &Config,
        cache: Arc<CitationCache>,
        governor: Arc<ResilienceGovernor>,
    ) -> Result<Self, reqwest::Error> {
        let citations = &config.citations;
        let resolver = Self::new(cache, governor).with_concurrency(citations.concurrency);
        if !citations.enabled {
            debug!("External citation lookups disabled");
            return Ok(resolver);
        }

        let client =
            HttpClient::with_mailto(config.resilience.call_timeout(), citations.mailto.as_deref())?;
        let primary = SemanticScholarProvider::new(
            client.clone(),
            citations.primary_base_url.as_str(),
            citations.api_key.clone(),
        );
        let fallback = CrossrefProvider::new(
            client,
            citations.fallback_base_url.as_str(),
            citations.mailto.clone(),
        );

        Ok(resolver
            .with_primary(Arc::new(primary))
            .with_fallback(Arc::new(fallback)))
    }

    pub fn with_primary(mut self, provider: Arc<dyn CitationProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    pub fn with_fallback(mut self, provider: Arc<dyn CitationProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Maximum lookups in flight for [`resolve_many`](Self::resolve_many)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &CitationCache {
        &self.cache
    }

    pub fn governor(&self) -> &ResilienceGovernor {
        &self.governor
    }

    /// Resolve counts for one identifier
    pub async fn resolve(&self, key: &CitationKey, inline: Option<InlineCitations>) -> Resolution {
        match self.cache.get(key) {
            CacheResult::Hit(entry) => {
                return Resolution::Resolved(entry.to_result(ResolutionTier::Cache));
            }
            CacheResult::Expired => debug!("{}: cached counts expired, refreshing", key),
            CacheResult::Miss => {}
        }

        if let Some(inline) = inline {
            let counts = CitationCounts {
                citation_count: inline.citation_count,
                reference_count: inline.reference_count,
            };
            return self.store(key, counts, ResolutionTier::Inline);
        }

        let tiers = [
            (ResolutionTier::Primary, PRIMARY_ENDPOINT, &self.primary),
            (ResolutionTier::Fallback, FALLBACK_ENDPOINT, &self.fallback),
        ];
        for (tier, endpoint, provider) in tiers {
            let Some(provider) = provider else {
                continue;
            };
            if let Some(counts) = self.fetch(endpoint, &**provider, key).await {
                return self.store(key, counts, tier);
            }
        }

        debug!("{}: unresolved after all tiers", key);
        Resolution::Unresolved
    }

    /// Resolve counts for a record, using its DOI or URL and inline data.
    ///
    /// Records with neither identifier are unresolved without trying any tier.
    pub async fn resolve_record(&self, record: &NormalizedRecord) -> Resolution {
        match CitationKey::for_record(record) {
            Some(key) => self.resolve(&key, record.inline_citations).await,
            None => Resolution::Unresolved,
        }
    }

    /// Resolve a batch of records with bounded concurrency, in input order
    pub async fn resolve_many<R: AsRef<NormalizedRecord>>(&self, records: &[R]) -> Vec<Resolution> {
        stream::iter(records.iter().map(|r| self.resolve_record(r.as_ref())))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn fetch(
        &self,
        endpoint: &str,
        provider: &dyn CitationProvider,
        key: &CitationKey,
    ) -> Option<CitationCounts> {
        match self.governor.guard(endpoint, move || provider.fetch(key)).await {
            Ok(counts) => {
                debug!("{}: {} answered via {}", key, provider.name(), endpoint);
                Some(counts)
            }
            Err(e) => {
                debug!("{}: {} ({}) failed: {}", key, provider.name(), endpoint, e);
                None
            }
        }
    }

    fn store(&self, key: &CitationKey, counts: CitationCounts, tier: ResolutionTier) -> Resolution {
        let entry = CitationCacheEntry::new(key, counts, tier);
        let result = entry.to_result(tier);
        if let Err(e) = self.cache.put(entry) {
            warn!("[cache] failed to store {}: {}", key, e);
        }
        Resolution::Resolved(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::ProviderError;
    use crate::utils::GovernorConfig;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(30 * 24 * 3600);

    #[derive(Debug)]
    struct StubProvider {
        calls: AtomicUsize,
        outcome: fn() -> Result<CitationCounts, ProviderError>,
    }

    impl StubProvider {
        fn new(outcome: fn() -> Result<CitationCounts, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CitationProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn fetch(&self, _key: &CitationKey) -> Result<CitationCounts, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn counts(n: u32) -> Result<CitationCounts, ProviderError> {
        Ok(CitationCounts {
            citation_count: n,
            reference_count: Some(n * 2),
        })
    }

    fn unavailable() -> Result<CitationCounts, ProviderError> {
        Err(ProviderError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            retry_after: None,
        })
    }

    fn resolver() -> CitationResolver {
        CitationResolver::new(
            Arc::new(CitationCache::in_memory(TTL)),
            Arc::new(ResilienceGovernor::new(GovernorConfig::default())),
        )
    }

    fn doi(s: &str) -> CitationKey {
        CitationKey::from_doi(s).unwrap()
    }

    #[tokio::test]
    async fn test_second_resolution_served_from_cache() {
        let primary = StubProvider::new(|| counts(7));
        let resolver = resolver().with_primary(primary.clone());
        let key = doi("10.1/a");

        let first = resolver.resolve(&key, None).await.into_result().unwrap();
        assert_eq!(first.tier, ResolutionTier::Primary);
        assert_eq!(first.citation_count, 7);

        let second = resolver.resolve(&key, None).await.into_result().unwrap();
        assert_eq!(second.tier, ResolutionTier::Cache);
        assert_eq!(second.citation_count, 7);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_inline_counts_skip_external_tiers() {
        let primary = StubProvider::new(|| counts(99));
        let resolver = resolver().with_primary(primary.clone());
        let inline = InlineCitations {
            citation_count: 12,
            reference_count: None,
        };

        let result = resolver
            .resolve(&doi("10.1/b"), Some(inline))
            .await
            .into_result()
            .unwrap();
        assert_eq!(result.tier, ResolutionTier::Inline);
        assert_eq!(result.citation_count, 12);
        assert_eq!(primary.calls(), 0);
        assert!(resolver.cache().get(&doi("10.1/b")).hit().is_some());
    }

    #[tokio::test]
    async fn test_falls_through_to_fallback() {
        let primary = StubProvider::new(unavailable);
        let fallback = StubProvider::new(|| counts(3));
        let resolver = resolver()
            .with_primary(primary.clone())
            .with_fallback(fallback.clone());

        let result = resolver.resolve(&doi("10.1/c"), None).await.into_result().unwrap();
        assert_eq!(result.tier, ResolutionTier::Fallback);
        assert_eq!(result.citation_count, 3);
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_unresolved_and_not_cached() {
        let resolver = resolver()
            .with_primary(StubProvider::new(unavailable))
            .with_fallback(StubProvider::new(|| {
                Err(ProviderError::Parse("garbage".into()))
            }));
        let key = doi("10.1/d");

        assert_eq!(resolver.resolve(&key, None).await, Resolution::Unresolved);
        assert!(matches!(resolver.cache().get(&key), CacheResult::Miss));
    }

    #[tokio::test]
    async fn test_open_primary_is_skipped() {
        let primary = StubProvider::new(unavailable);
        let fallback = StubProvider::new(|| counts(1));
        let resolver = resolver()
            .with_primary(primary.clone())
            .with_fallback(fallback.clone());

        for i in 0..8 {
            let key = doi(&format!("10.1/open{}", i));
            let result = resolver.resolve(&key, None).await.into_result().unwrap();
            assert_eq!(result.tier, ResolutionTier::Fallback);
        }

        // breaker opened after the fifth hard failure
        assert_eq!(primary.calls(), 5);
        assert_eq!(fallback.calls(), 8);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let primary = StubProvider::new(|| counts(20));
        let resolver = resolver().with_primary(primary.clone());
        let key = doi("10.1/e");

        let mut stale = CitationCacheEntry::new(
            &key,
            CitationCounts {
                citation_count: 2,
                reference_count: None,
            },
            ResolutionTier::Primary,
        );
        stale.fetched_at = Utc::now() - ChronoDuration::days(31);
        resolver.cache().put(stale).unwrap();

        let result = resolver.resolve(&key, None).await.into_result().unwrap();
        assert_eq!(result.tier, ResolutionTier::Primary);
        assert_eq!(result.citation_count, 20);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_record_without_identifiers_is_unresolved() {
        let primary = StubProvider::new(|| counts(1));
        let resolver = resolver().with_primary(primary.clone());
        let record = NormalizedRecord::builder("x")
            .title(Some("Untraceable"))
            .inline_citations(Some(InlineCitations {
                citation_count: 4,
                reference_count: None,
            }))
            .build();

        assert_eq!(resolver.resolve_record(&record).await, Resolution::Unresolved);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_many_preserves_order() {
        let resolver = resolver().with_concurrency(2);
        let records: Vec<NormalizedRecord> = (0..6)
            .map(|i| {
                NormalizedRecord::builder("x")
                    .doi(Some(&format!("10.1/m{}", i)))
                    .inline_citations(Some(InlineCitations {
                        citation_count: i,
                        reference_count: None,
                    }))
                    .build()
            })
            .collect();

        let resolutions = resolver.resolve_many(&records).await;
        let counts: Vec<u32> = resolutions
            .iter()
            .map(|r| r.result().unwrap().citation_count)
            .collect();
        assert_eq!(counts, vec![0, 1, 2, 3, 4, 5]);
    }
}
