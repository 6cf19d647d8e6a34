//! Integration tests for Research Corpus
//!
//! These tests drive the full orchestrator (normalization, early filters,
//! global dedup, citation resolution, late filters) with stub citation services.

use async_trait::async_trait;
use chrono::NaiveDate;
use research_corpus::citations::{CitationProvider, CitationResolver, ProviderError};
use research_corpus::config::{Config, KeywordMode, UnresolvedPolicy};
use research_corpus::filters::FilterPipeline;
use research_corpus::models::{CitationCounts, CitationKey, RawRecord, ResolutionTier};
use research_corpus::utils::{CircuitState, CitationCache, GovernorConfig, ResilienceGovernor};
use research_corpus::Orchestrator;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Citation service answering from a fixed table; unknown keys are not found
#[derive(Debug, Default)]
struct TableProvider {
    counts: HashMap<String, u32>,
    calls: AtomicUsize,
}

impl TableProvider {
    fn with(entries: &[(&str, u32)]) -> Arc<Self> {
        let counts = entries
            .iter()
            .filter_map(|(doi, n)| CitationKey::from_doi(doi).map(|k| (k.as_str().to_string(), *n)))
            .collect();
        Arc::new(Self {
            counts,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CitationProvider for TableProvider {
    fn name(&self) -> &str {
        "table"
    }

    async fn fetch(&self, key: &CitationKey) -> Result<CitationCounts, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.counts.get(key.as_str()) {
            Some(&n) => Ok(CitationCounts {
                citation_count: n,
                reference_count: None,
            }),
            None => Err(ProviderError::Status {
                status: StatusCode::NOT_FOUND,
                retry_after: None,
            }),
        }
    }
}

/// Citation service that always answers 429
#[derive(Debug, Default)]
struct RateLimitedProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl CitationProvider for RateLimitedProvider {
    fn name(&self) -> &str {
        "rate-limited"
    }

    async fn fetch(&self, _key: &CitationKey) -> Result<CitationCounts, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some(Duration::from_secs(1)),
        })
    }
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

/// Config with the abstract filter off so short test records survive
fn base_config() -> Config {
    let mut config = Config::default();
    config.filters.abstract_quality.enabled = false;
    config
}

fn resolver() -> CitationResolver {
    CitationResolver::new(
        Arc::new(CitationCache::in_memory(Duration::from_secs(30 * 24 * 3600))),
        Arc::new(ResilienceGovernor::new(GovernorConfig::default())),
    )
}

fn orchestrator(config: &Config, resolver: CitationResolver) -> Orchestrator {
    Orchestrator::new(config, resolver)
        .with_filters(FilterPipeline::new(&config.filters).with_reference_date(reference_date()))
}

fn rich_abstract() -> String {
    let mut text = vec!["Results"; 60].join(" ");
    text.push('.');
    text
}

#[tokio::test]
async fn test_doi_and_url_records_merge_into_richer_record() {
    let config = base_config();

    let rich = RawRecord::builder("crossref")
        .title("Foo")
        .doi("10.1/x")
        .url("https://example.org/foo")
        .authors("Ada Lovelace; Charles Babbage")
        .date("2024-03-01")
        .venue("Journal of Foo")
        .record_type("journal-article")
        .build();
    let sparse = RawRecord::builder("semantic")
        .title("Foo")
        .url("https://example.org/foo/")
        .publisher("Foo Press")
        .build();

    let output = orchestrator(&config, resolver()).run(vec![sparse, rich]).await;

    assert_eq!(output.records.len(), 1);
    let merged = &output.records[0];
    assert_eq!(merged.sources.len(), 2);
    assert_eq!(merged.canonical_source(), "crossref");
    assert_eq!(merged.record.doi.as_deref(), Some("10.1/x"));
    assert_eq!(merged.record.venue.as_deref(), Some("Journal of Foo"));
    // Missing on the canonical record, so taken from the other source
    assert_eq!(merged.record.publisher.as_deref(), Some("Foo Press"));
    assert_eq!(output.report.dedup.merged_away, 1);
}

#[tokio::test]
async fn test_dual_keyword_groups() {
    let mut config = base_config();
    config.filters.keywords.enabled = true;
    config.filters.keywords.mode = KeywordMode::Dual;
    config.filters.keywords.groups = vec![vec!["ai".to_string()], vec!["health".to_string()]];

    let records = vec![
        RawRecord::builder("openalex")
            .title("AI for chess openings")
            .doi("10.1/chess")
            .build(),
        RawRecord::builder("openalex")
            .title("AI in public health")
            .doi("10.1/health")
            .build(),
    ];

    let output = orchestrator(&config, resolver()).run(records).await;

    assert_eq!(output.records.len(), 1);
    assert_eq!(output.records[0].record.doi.as_deref(), Some("10.1/health"));
}

#[tokio::test]
async fn test_citation_threshold_scales_with_age() {
    let config = base_config();
    let provider = TableProvider::with(&[("10.1/old-cited", 40), ("10.1/old-uncited", 2)]);
    let resolver = resolver().with_primary(provider.clone());

    let records = vec![
        RawRecord::builder("crossref")
            .title("Well cited survey")
            .doi("10.1/old-cited")
            .date("2018-05-01")
            .build(),
        RawRecord::builder("crossref")
            .title("Forgotten survey")
            .doi("10.1/old-uncited")
            .date("2018-05-01")
            .build(),
        // too young to need citations
        RawRecord::builder("crossref")
            .title("Fresh result")
            .doi("10.1/new")
            .date("2025-10-01")
            .build(),
        // no date: always survives the citation phase
        RawRecord::builder("crossref")
            .title("Undated note")
            .doi("10.1/undated")
            .build(),
    ];

    let output = orchestrator(&config, resolver).run(records).await;

    let mut dois: Vec<&str> = output
        .records
        .iter()
        .filter_map(|r| r.record.doi.as_deref())
        .collect();
    dois.sort_unstable();
    assert_eq!(dois, vec!["10.1/new", "10.1/old-cited", "10.1/undated"]);
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn test_unresolved_policy_zero_drops_old_records() {
    let mut config = base_config();
    config.filters.citations.unresolved = UnresolvedPolicy::Zero;

    let records = vec![RawRecord::builder("crossref")
        .title("Unknown to every service")
        .doi("10.1/unknown")
        .date("2015-01-01")
        .build()];

    let exempt = orchestrator(&base_config(), resolver()).run(records.clone()).await;
    assert_eq!(exempt.records.len(), 1);

    let zero = orchestrator(&config, resolver()).run(records).await;
    assert!(zero.records.is_empty());
}

#[tokio::test]
async fn test_inline_counts_skip_external_services() {
    let config = base_config();
    let provider = TableProvider::with(&[("10.1/inline", 1)]);
    let resolver = resolver().with_primary(provider.clone());

    let records = vec![RawRecord::builder("semantic")
        .title("Counted at the source")
        .doi("10.1/inline")
        .date("2019-01-01")
        .citations(25)
        .build()];

    let output = orchestrator(&config, resolver).run(records).await;

    assert_eq!(output.records.len(), 1);
    let citations = output.records[0].citations.as_ref().unwrap();
    assert_eq!(citations.tier, ResolutionTier::Inline);
    assert_eq!(citations.citation_count, 25);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let config = base_config();
    let provider = TableProvider::with(&[("10.1/x", 40)]);
    let orchestrator = orchestrator(&config, resolver().with_primary(provider.clone()));

    let records = vec![RawRecord::builder("crossref")
        .title("Cached work")
        .doi("10.1/x")
        .date("2020-01-01")
        .build()];

    let first = orchestrator.run(records.clone()).await;
    assert_eq!(
        first.records[0].citations.as_ref().unwrap().tier,
        ResolutionTier::Primary
    );

    let second = orchestrator.run(records).await;
    assert_eq!(
        second.records[0].citations.as_ref().unwrap().tier,
        ResolutionTier::Cache
    );
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_fallback_answers_when_primary_misses() {
    let config = base_config();
    let primary = TableProvider::with(&[]);
    let fallback = TableProvider::with(&[("10.1/x", 30)]);
    let resolver = resolver()
        .with_primary(primary.clone())
        .with_fallback(fallback.clone());

    let records = vec![RawRecord::builder("crossref")
        .title("Only the fallback knows")
        .doi("10.1/x")
        .date("2019-06-01")
        .build()];

    let output = orchestrator(&config, resolver).run(records).await;

    let citations = output.records[0].citations.as_ref().unwrap();
    assert_eq!(citations.tier, ResolutionTier::Fallback);
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limits_keep_circuit_closed() {
    let config = base_config();
    let provider = Arc::new(RateLimitedProvider::default());
    let resolver = resolver().with_primary(provider.clone());

    let records: Vec<RawRecord> = (0..25)
        .map(|i| {
            RawRecord::builder("crossref")
                .title(format!("Throttled paper number {}", i))
                .doi(format!("10.1/throttled-{}", i))
                .build()
        })
        .collect();

    let output = orchestrator(&config, resolver).run(records).await;

    // Each lookup is tried once and retried max_rate_limit_retries times
    assert_eq!(provider.calls.load(Ordering::SeqCst), 100);
    assert_eq!(output.records.len(), 25);
    assert!(output.records.iter().all(|r| r.citations.is_none()));

    let primary = output
        .report
        .endpoints
        .iter()
        .find(|e| e.endpoint == "primary")
        .unwrap();
    assert_eq!(primary.state, CircuitState::Closed);
    assert_eq!(primary.consecutive_failures, 0);
}

#[tokio::test]
async fn test_output_is_ranked_and_capped() {
    let mut config = base_config();
    config.filters.abstract_quality.enabled = true;
    config.filters.ranking.max_papers = Some(2);

    let records = vec![
        RawRecord::builder("crossref")
            .title("Preprint")
            .doi("10.1/a")
            .record_type("preprint")
            .abstract_text(rich_abstract())
            .build(),
        RawRecord::builder("crossref")
            .title("Journal paper")
            .doi("10.1/b")
            .record_type("journal-article")
            .abstract_text(rich_abstract())
            .citations(50)
            .build(),
        RawRecord::builder("crossref")
            .title("Conference paper")
            .doi("10.1/c")
            .record_type("proceedings-article")
            .abstract_text(rich_abstract())
            .citations(5)
            .build(),
        RawRecord::builder("crossref")
            .title("No abstract at all")
            .doi("10.1/d")
            .record_type("journal-article")
            .build(),
    ];

    let output = orchestrator(&config, resolver()).run(records).await;

    assert_eq!(output.records.len(), 2);
    assert_eq!(output.records[0].record.doi.as_deref(), Some("10.1/b"));
    let scores: Vec<f64> = output
        .records
        .iter()
        .map(|r| r.relevance_score.unwrap())
        .collect();
    assert!(scores[0] >= scores[1]);
    assert!(output.records.iter().all(|r| r.abstract_quality == Some(100)));
}

#[tokio::test]
async fn test_every_input_lands_in_exactly_one_group() {
    let mut config = base_config();
    config.pipeline.batch_size = 3;

    let records: Vec<RawRecord> = vec![
        RawRecord::builder("crossref").title("Alpha").doi("10.1/a").build(),
        RawRecord::builder("pubmed").title("Alpha").doi("doi:10.1/A").build(),
        RawRecord::builder("openalex").title("Beta").url("https://example.org/beta").build(),
        RawRecord::builder("semantic").title("Beta").url("http://example.org/beta").build(),
        RawRecord::builder("arxiv").title("Gamma").build(),
        RawRecord::builder("generic").title("Delta").doi("10.1/d").build(),
        RawRecord::builder("crossref").title("Epsilon").doi("10.1/e").build(),
    ];
    let input = records.len();

    let output = orchestrator(&config, resolver()).run(records).await;

    let total_sources: usize = output.records.iter().map(|r| r.sources.len()).sum();
    assert_eq!(total_sources, input);
    assert_eq!(output.records.len(), 5);
    assert_eq!(output.report.batches, 3);
    assert_eq!(output.report.failed_batches, 0);
}

#[test]
fn test_invalid_config_rejected_before_processing() {
    let mut config = Config::default();
    config.filters.keywords.enabled = true;
    config.filters.keywords.mode = KeywordMode::Dual;
    config.filters.keywords.groups = vec![vec!["ai".to_string()]];

    assert!(Orchestrator::from_config(&config).is_err());
}
