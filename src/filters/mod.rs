//! Quality & filtering pipeline.
//!
//! Five ordered phases, each independently toggleable and each consuming the
//! survivors of the previous one:
//!
//! 1. [`TypeFilter`]: publication type whitelist
//! 2. [`KeywordFilter`]: single or dual keyword groups
//! 3. [`AbstractQualityFilter`]: defect-penalty score against a threshold
//! 4. [`CitationFilter`]: age-scaled citation threshold (needs a [`CitationResolver`])
//! 5. [`RelevanceRanker`]: composite score, sort, optional cutoff
//!
//! Phases 1-3 only look at a record's own fields, so the orchestrator runs them
//! per batch before deduplication ([`FilterPipeline::run_early`]). Phases 4-5
//! run once over the merged corpus ([`FilterPipeline::run_late`]).

mod abstract_quality;
mod citation;
mod keyword;
mod relevance;
mod type_filter;

pub use abstract_quality::{detect_defects, score as abstract_score, AbstractDefect, AbstractQualityFilter};
pub use citation::{required_citations, CitationFilter};
pub use keyword::KeywordFilter;
pub use relevance::RelevanceRanker;
pub use type_filter::{type_score, TypeFilter};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::citations::CitationResolver;
use crate::config::FiltersConfig;
use crate::models::{MergedRecord, NormalizedRecord};

/// The five filter phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Type,
    Keyword,
    AbstractQuality,
    Citation,
    Ranking,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Type,
        Phase::Keyword,
        Phase::AbstractQuality,
        Phase::Citation,
        Phase::Ranking,
    ];
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Type => "type",
            Phase::Keyword => "keyword",
            Phase::AbstractQuality => "abstract-quality",
            Phase::Citation => "citation",
            Phase::Ranking => "ranking",
        };
        f.write_str(name)
    }
}

/// Record counts entering and leaving one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub enabled: bool,
    pub input: usize,
    pub output: usize,
}

impl PhaseReport {
    pub fn dropped(&self) -> usize {
        self.input.saturating_sub(self.output)
    }

    /// Add another run of the same phase (e.g. another batch)
    pub fn absorb(&mut self, other: &PhaseReport) {
        debug_assert_eq!(self.phase, other.phase);
        self.input += other.input;
        self.output += other.output;
    }
}

/// Sum per-batch reports phase by phase, in phase order
pub fn combine_reports<'a>(reports: impl IntoIterator<Item = &'a PhaseReport>) -> Vec<PhaseReport> {
    let mut combined: Vec<PhaseReport> = Vec::new();
    for report in reports {
        match combined.iter_mut().find(|r| r.phase == report.phase) {
            Some(existing) => existing.absorb(report),
            None => combined.push(*report),
        }
    }
    combined.sort_by_key(|r| r.phase);
    combined
}

/// The configured filter phases
#[derive(Debug, Clone)]
pub struct FilterPipeline {
    types: TypeFilter,
    keywords: KeywordFilter,
    quality: AbstractQualityFilter,
    citations: CitationFilter,
    ranking: RelevanceRanker,
    today: Option<NaiveDate>,
}

impl FilterPipeline {
    pub fn new(config: &FiltersConfig) -> Self {
        Self {
            types: TypeFilter::new(&config.types),
            keywords: KeywordFilter::new(&config.keywords),
            quality: AbstractQualityFilter::new(&config.abstract_quality),
            citations: CitationFilter::new(&config.citations),
            ranking: RelevanceRanker::new(&config.ranking),
            today: None,
        }
    }

    /// Measure publication age against a fixed date instead of today
    pub fn with_reference_date(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn keywords(&self) -> &KeywordFilter {
        &self.keywords
    }

    /// Phases 1-3. Works on normalized records before deduplication as well as
    /// on merged records.
    pub fn run_early<R: AsRef<NormalizedRecord>>(&self, records: Vec<R>) -> (Vec<R>, Vec<PhaseReport>) {
        let mut reports = Vec::with_capacity(3);

        let records = retain_phase(records, Phase::Type, self.types.is_enabled(), &mut reports, |r| {
            self.types.accepts(r.as_ref())
        });
        let records = retain_phase(
            records,
            Phase::Keyword,
            self.keywords.is_enabled(),
            &mut reports,
            |r| self.keywords.accepts(r.as_ref()),
        );
        let records = retain_phase(
            records,
            Phase::AbstractQuality,
            self.quality.is_enabled(),
            &mut reports,
            |r| self.quality.accepts(r.as_ref()),
        );

        (records, reports)
    }

    /// Phases 4-5 over the merged corpus.
    ///
    /// Every record is annotated with its abstract quality and, when phase 4 or 5
    /// is enabled, its resolved citation count.
    pub async fn run_late(
        &self,
        records: Vec<MergedRecord>,
        resolver: &CitationResolver,
    ) -> (Vec<MergedRecord>, Vec<PhaseReport>) {
        let mut reports = Vec::with_capacity(2);

        let mut records: Vec<MergedRecord> = records
            .into_iter()
            .map(|r| {
                let score = self.quality.score(&r.record);
                r.with_abstract_quality(score)
            })
            .collect();

        if self.citations.is_enabled() || self.ranking.is_enabled() {
            let resolutions = resolver.resolve_many(&records).await;
            let resolved = resolutions.iter().filter(|r| r.result().is_some()).count();
            info!(
                "[pipeline] citation counts resolved for {}/{} records",
                resolved,
                records.len()
            );
            records = records
                .into_iter()
                .zip(resolutions)
                .map(|(record, resolution)| record.with_citations(resolution.into_result()))
                .collect();
        }

        let today = self.today();
        let records = retain_phase(
            records,
            Phase::Citation,
            self.citations.is_enabled(),
            &mut reports,
            |r| self.citations.accepts(r, today),
        );

        let input = records.len();
        let records = self.ranking.rank(records, &self.keywords);
        let report = PhaseReport {
            phase: Phase::Ranking,
            enabled: self.ranking.is_enabled(),
            input,
            output: records.len(),
        };
        log_phase(&report);
        reports.push(report);

        (records, reports)
    }

    /// All five phases over an already merged sequence
    pub async fn run_all(
        &self,
        records: Vec<MergedRecord>,
        resolver: &CitationResolver,
    ) -> (Vec<MergedRecord>, Vec<PhaseReport>) {
        let (records, mut reports) = self.run_early(records);
        let (records, late) = self.run_late(records, resolver).await;
        reports.extend(late);
        (records, reports)
    }
}

fn retain_phase<R, F>(
    records: Vec<R>,
    phase: Phase,
    enabled: bool,
    reports: &mut Vec<PhaseReport>,
    keep: F,
) -> Vec<R>
where
    F: Fn(&R) -> bool,
{
    let input = records.len();
    let kept: Vec<R> = if enabled {
        records.into_iter().filter(|r| keep(r)).collect()
    } else {
        records
    };
    let report = PhaseReport {
        phase,
        enabled,
        input,
        output: kept.len(),
    };
    log_phase(&report);
    reports.push(report);
    kept
}

fn log_phase(report: &PhaseReport) {
    if report.enabled {
        tracing::debug!(
            "[pipeline] phase {}: {} in, {} out",
            report.phase,
            report.input,
            report.output
        );
    }
}
