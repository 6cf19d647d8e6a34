//! Configuration management.
//!
//! Every threshold and toggle the pipeline consumes lives here. Configuration
//! is loaded from a TOML file layered with `RESEARCH_CORPUS__SECTION__KEY`
//! environment overrides and validated before any record is processed.

mod file_config;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::RecordType;
use crate::utils::{BackoffPolicy, CircuitBreakerConfig, GovernorConfig};

pub use file_config::{default_config_path, find_config_file, save_config, CONFIG_FILE_NAME};

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("contradictory settings: {0}")]
    Contradiction(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub filters: FiltersConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub citations: CitationsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Batching and worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records per batch for normalization and early filtering
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on concurrently processed batches
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
        }
    }
}

impl PipelineConfig {
    /// Configured workers capped at the available parallelism
    pub fn effective_workers(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.workers.min(available).max(1)
    }
}

fn default_batch_size() -> usize {
    5000
}

fn default_workers() -> usize {
    4
}

/// Deduplication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Minimum fuzzy title similarity, 0-100
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Maximum publication year difference for a fuzzy title match
    #[serde(default = "default_year_tolerance")]
    pub year_tolerance: u32,

    /// Sources preferred as canonical on completeness ties, most preferred first
    #[serde(default)]
    pub source_priority: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            year_tolerance: default_year_tolerance(),
            source_priority: Vec::new(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    85.0
}

fn default_year_tolerance() -> u32 {
    1
}

/// Settings for the five filtering phases
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersConfig {
    #[serde(default)]
    pub types: TypeFilterConfig,

    #[serde(default)]
    pub keywords: KeywordFilterConfig,

    #[serde(default)]
    pub abstract_quality: AbstractQualityConfig,

    #[serde(default)]
    pub citations: CitationFilterConfig,

    #[serde(default)]
    pub ranking: RankingConfig,
}

/// Phase 1: publication type whitelist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeFilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Drop records with no type tag
    #[serde(default)]
    pub strict: bool,

    #[serde(default = "default_allowed_types")]
    pub allowed: Vec<RecordType>,
}

impl Default for TypeFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
            allowed: default_allowed_types(),
        }
    }
}

fn default_allowed_types() -> Vec<RecordType> {
    vec![
        RecordType::Journal,
        RecordType::Conference,
        RecordType::Preprint,
        RecordType::Book,
        RecordType::BookChapter,
    ]
}

/// Keyword matching mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordMode {
    /// Any keyword of the first group
    #[default]
    Single,
    /// Any keyword of the first group and any keyword of the second
    Dual,
}

/// Record fields searched for keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Title,
    Abstract,
    Keywords,
    Venue,
}

/// Phase 2: keyword groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordFilterConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub mode: KeywordMode,

    /// Keyword groups; OR within a group
    #[serde(default)]
    pub groups: Vec<Vec<String>>,

    /// Keywords that raise relevance but never exclude
    #[serde(default)]
    pub bonus: Vec<String>,

    #[serde(default = "default_search_fields")]
    pub fields: Vec<SearchField>,
}

impl Default for KeywordFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: KeywordMode::Single,
            groups: Vec::new(),
            bonus: Vec::new(),
            fields: default_search_fields(),
        }
    }
}

fn default_search_fields() -> Vec<SearchField> {
    vec![SearchField::Title, SearchField::Abstract]
}

/// Phase 3: abstract quality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbstractQualityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum score, 0-100
    #[serde(default = "default_quality_threshold")]
    pub threshold: u8,
}

impl Default for AbstractQualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_quality_threshold(),
        }
    }
}

fn default_quality_threshold() -> u8 {
    60
}

/// Treatment of records whose citation count could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Keep the record, as for a missing date
    #[default]
    Exempt,
    /// Treat as zero citations
    Zero,
}

/// Phase 4: age-scaled citation threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationFilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub unresolved: UnresolvedPolicy,
}

impl Default for CitationFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unresolved: UnresolvedPolicy::Exempt,
        }
    }
}

/// Phase 5: relevance ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Keep only the top N records
    #[serde(default)]
    pub max_papers: Option<usize>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_papers: None,
        }
    }
}

/// Citation cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persist entries to disk
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_cache_ttl_days")]
    pub ttl_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            ttl_days: default_cache_ttl_days(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(24 * 3600))
    }
}

/// A century; anything longer is a typo
const MAX_CACHE_TTL_DAYS: u64 = 36_500;

fn default_cache_ttl_days() -> u64 {
    30
}

/// Default cache directory
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("research-corpus")
}

/// Circuit breaker, backoff and timeout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Consecutive hard failures before a circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,

    /// Timeout for every external call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Backoff policy per endpoint name
    #[serde(default = "default_endpoints")]
    pub endpoints: HashMap<String, BackoffPolicy>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            endpoints: default_endpoints(),
        }
    }
}

impl ResilienceConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: self.failure_threshold,
                open_timeout: Duration::from_secs(self.open_timeout_secs),
            },
            call_timeout: self.call_timeout(),
            max_rate_limit_retries: self.max_rate_limit_retries,
            default_backoff: BackoffPolicy::default(),
            endpoints: self.endpoints.clone(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_timeout_secs() -> u64 {
    60
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_max_rate_limit_retries() -> u32 {
    3
}

fn default_endpoints() -> HashMap<String, BackoffPolicy> {
    HashMap::from([
        (
            "primary".to_string(),
            BackoffPolicy::fixed(Duration::from_secs(1)),
        ),
        (
            "fallback".to_string(),
            BackoffPolicy::exponential(Duration::from_secs(2), Duration::from_secs(60)),
        ),
    ])
}

/// External citation services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationsConfig {
    /// Query external services at all; cache and inline data are always used
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Concurrent citation lookups
    #[serde(default = "default_citation_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_primary_base_url")]
    pub primary_base_url: String,

    #[serde(default = "default_fallback_base_url")]
    pub fallback_base_url: String,

    /// Semantic Scholar API key (optional, for higher rate limits)
    #[serde(default = "default_semantic_scholar_key")]
    pub api_key: Option<String>,

    /// Contact address for the Crossref polite pool
    #[serde(default)]
    pub mailto: Option<String>,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_citation_concurrency(),
            primary_base_url: default_primary_base_url(),
            fallback_base_url: default_fallback_base_url(),
            api_key: default_semantic_scholar_key(),
            mailto: None,
        }
    }
}

fn default_citation_concurrency() -> usize {
    3
}

fn default_primary_base_url() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}

fn default_fallback_base_url() -> String {
    "https://api.crossref.org".to_string()
}

fn default_semantic_scholar_key() -> Option<String> {
    std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok()
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Check thresholds and reject contradictory settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.dedup.similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "dedup.similarity_threshold",
                reason: format!("{} is outside 0-100", self.dedup.similarity_threshold),
            });
        }
        if self.filters.abstract_quality.threshold > 100 {
            return Err(ConfigError::InvalidValue {
                key: "filters.abstract_quality.threshold",
                reason: format!("{} exceeds 100", self.filters.abstract_quality.threshold),
            });
        }
        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.resilience.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "resilience.failure_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.resilience.call_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "resilience.call_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cache.ttl_days > MAX_CACHE_TTL_DAYS {
            return Err(ConfigError::InvalidValue {
                key: "cache.ttl_days",
                reason: format!("{} exceeds {}", self.cache.ttl_days, MAX_CACHE_TTL_DAYS),
            });
        }
        let mut endpoints: Vec<_> = self.resilience.endpoints.iter().collect();
        endpoints.sort_by(|a, b| a.0.cmp(b.0));
        for (name, policy) in endpoints {
            policy
                .validate()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: "resilience.endpoints",
                    reason: format!("{}: {}", name, reason),
                })?;
        }
        if self.citations.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "citations.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.filters.ranking.max_papers == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "filters.ranking.max_papers",
                reason: "must be at least 1 when set".to_string(),
            });
        }

        let keywords = &self.filters.keywords;
        if keywords.groups.len() > 2 {
            return Err(ConfigError::Contradiction(format!(
                "{} keyword groups configured, at most 2 are supported",
                keywords.groups.len()
            )));
        }
        if keywords.enabled {
            let first_empty = keywords.groups.first().map_or(true, |g| g.is_empty());
            if first_empty {
                return Err(ConfigError::Contradiction(
                    "keyword filter enabled with an empty first group".to_string(),
                ));
            }
            let second_empty = keywords.groups.get(1).map_or(true, |g| g.is_empty());
            if keywords.mode == KeywordMode::Dual && second_empty {
                return Err(ConfigError::Contradiction(
                    "dual keyword mode requires a second keyword group".to_string(),
                ));
            }
            if keywords.fields.is_empty() {
                return Err(ConfigError::Contradiction(
                    "keyword filter enabled with no fields to search".to_string(),
                ));
            }
        }

        let types = &self.filters.types;
        if types.enabled && types.allowed.is_empty() {
            return Err(ConfigError::Contradiction(
                "type filter enabled with an empty whitelist".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration from an optional file plus environment overrides, then validate
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(::config::File::from(path));
    }
    let settings = builder
        .add_source(
            ::config::Environment::with_prefix("RESEARCH_CORPUS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
