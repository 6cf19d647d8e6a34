//! Pipeline orchestration.
//!
//! Raw records are cut into batches. Each batch is normalized and run through
//! filter phases 1-3 on a blocking worker, with at most `workers` batches in
//! flight and results collected in submission order. The surviving records
//! then go through one global deduplication pass, citation enrichment, the
//! citation filter and relevance ranking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::citations::CitationResolver;
use crate::config::{Config, ConfigError};
use crate::filters::{combine_reports, FilterPipeline, PhaseReport};
use crate::models::{MergedRecord, NormalizedRecord, RawRecord};
use crate::sources;
use crate::utils::{CacheError, CitationCache, DedupReport, Deduplicator, EndpointStatus, ResilienceGovernor};

/// Errors that prevent the pipeline from starting
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Citation cache unavailable: {0}")]
    Cache(#[from] CacheError),

    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Stops the orchestrator from admitting new batches.
///
/// Batches already admitted run to completion and the run finishes with the
/// records they produced.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!("[pipeline] cancellation requested, no new batches will be admitted");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Raw records admitted into batches
    pub input: usize,
    pub batches: usize,
    /// Batches whose worker panicked; their records are lost
    pub failed_batches: usize,
    pub cancelled: bool,
    /// Records left after phases 1-3
    pub after_early_filters: usize,
    pub dedup: DedupReport,
    pub phases: Vec<PhaseReport>,
    pub output: usize,
    pub endpoints: Vec<EndpointStatus>,
    pub elapsed_ms: u64,
}

/// Ranked records plus the run summary
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub records: Vec<MergedRecord>,
    pub report: PipelineReport,
}

struct BatchOutput {
    input: usize,
    records: Vec<NormalizedRecord>,
    reports: Vec<PhaseReport>,
}

fn process_batch(batch: Vec<RawRecord>, filters: &FilterPipeline) -> BatchOutput {
    let normalized: Vec<NormalizedRecord> = batch.iter().map(sources::normalize).collect();
    let (records, reports) = filters.run_early(normalized);
    BatchOutput {
        input: batch.len(),
        records,
        reports,
    }
}

/// Drives raw records through normalization, filtering, deduplication and ranking
#[derive(Debug, Clone)]
pub struct Orchestrator {
    batch_size: usize,
    workers: usize,
    dedup: Deduplicator,
    filters: Arc<FilterPipeline>,
    resolver: CitationResolver,
    cancel: CancelHandle,
}

impl Orchestrator {
    pub fn new(config: &Config, resolver: CitationResolver) -> Self {
        Self {
            batch_size: config.pipeline.batch_size.max(1),
            workers: config.pipeline.effective_workers(),
            dedup: Deduplicator::new(&config.dedup),
            filters: Arc::new(FilterPipeline::new(&config.filters)),
            resolver,
            cancel: CancelHandle::new(),
        }
    }

    /// Validate `config` and build the cache, governor and citation services it describes
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let cache = Arc::new(CitationCache::from_config(&config.cache)?);
        let governor = Arc::new(ResilienceGovernor::new(config.resilience.governor_config()));
        let resolver = CitationResolver::from_config(config, cache, governor)?;
        Ok(Self::new(config, resolver))
    }

    /// Replace the filter phases (e.g. to pin the reference date)
    pub fn with_filters(mut self, filters: FilterPipeline) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn resolver(&self) -> &CitationResolver {
        &self.resolver
    }

    /// Run the pipeline over an in-memory sequence of records
    pub async fn run(&self, records: Vec<RawRecord>) -> PipelineOutput {
        self.run_stream(stream::iter(records)).await
    }

    /// Run the pipeline over a stream of records
    pub async fn run_stream<S>(&self, records: S) -> PipelineOutput
    where
        S: Stream<Item = RawRecord>,
    {
        let started = Instant::now();
        info!(
            "[pipeline] starting: batch size {}, {} workers",
            self.batch_size, self.workers
        );

        let cancel = self.cancel.clone();
        let outcomes: Vec<Result<BatchOutput, tokio::task::JoinError>> = records
            .chunks(self.batch_size)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|batch| {
                let filters = Arc::clone(&self.filters);
                tokio::task::spawn_blocking(move || process_batch(batch, &filters))
            })
            .buffered(self.workers)
            .collect()
            .await;

        let batches = outcomes.len();
        let mut input = 0;
        let mut failed_batches = 0;
        let mut survivors: Vec<NormalizedRecord> = Vec::new();
        let mut batch_reports: Vec<PhaseReport> = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(batch) => {
                    input += batch.input;
                    survivors.extend(batch.records);
                    batch_reports.extend(batch.reports);
                }
                Err(e) => {
                    failed_batches += 1;
                    error!("[pipeline] batch {} failed: {}", index, e);
                }
            }
        }

        let after_early_filters = survivors.len();
        info!(
            "[pipeline] {} batches, {} records in, {} after early filters",
            batches, input, after_early_filters
        );

        let (merged, dedup) = self.dedupe(survivors).await;
        info!(
            "[pipeline] dedup: {} records into {} ({} merged away)",
            dedup.input, dedup.output, dedup.merged_away
        );

        let (records, late_reports) = self.filters.run_late(merged, &self.resolver).await;
        let mut phases = combine_reports(batch_reports.iter());
        phases.extend(late_reports);
        for phase in phases.iter().filter(|p| p.enabled) {
            info!(
                "[pipeline] phase {}: {} in, {} out",
                phase.phase, phase.input, phase.output
            );
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!("[pipeline] run was cancelled; output covers {} admitted records", input);
        }

        let report = PipelineReport {
            input,
            batches,
            failed_batches,
            cancelled,
            after_early_filters,
            dedup,
            phases,
            output: records.len(),
            endpoints: self.resolver.governor().status(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            "[pipeline] done: {} records in {} ms",
            report.output, report.elapsed_ms
        );

        PipelineOutput { records, report }
    }

    /// The global dedup pass, off the async runtime.
    ///
    /// If the worker dies the survivors pass through unmerged.
    async fn dedupe(&self, records: Vec<NormalizedRecord>) -> (Vec<MergedRecord>, DedupReport) {
        let dedup = self.dedup.clone();
        let survivors = records.clone();
        match tokio::task::spawn_blocking(move || dedup.dedupe_with_report(records)).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "[pipeline] dedup worker failed, keeping {} records unmerged: {}",
                    survivors.len(),
                    e
                );
                unmerged(survivors)
            }
        }
    }
}

/// Every record as its own group
fn unmerged(records: Vec<NormalizedRecord>) -> (Vec<MergedRecord>, DedupReport) {
    let merged: Vec<MergedRecord> = records.into_iter().map(MergedRecord::singleton).collect();
    let report = DedupReport {
        input: merged.len(),
        output: merged.len(),
        ..Default::default()
    };
    (merged, report)
}
