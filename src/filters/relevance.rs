//! Phase 5: composite relevance ranking.

use crate::config::RankingConfig;
use crate::models::MergedRecord;

use super::abstract_quality;
use super::keyword::KeywordFilter;
use super::type_filter::type_score;

const KEYWORD_WEIGHT: f64 = 0.45;
const QUALITY_WEIGHT: f64 = 0.25;
const TYPE_WEIGHT: f64 = 0.20;
const CITATION_WEIGHT: f64 = 0.10;

/// Scores, sorts and optionally truncates the corpus
#[derive(Debug, Clone)]
pub struct RelevanceRanker {
    enabled: bool,
    max_papers: Option<usize>,
}

impl RelevanceRanker {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_papers: config.max_papers,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `0.45 * keyword + 0.25 * quality / 100 + 0.20 * type + 0.10 * ln(1 + citations)`
    pub fn score(&self, record: &MergedRecord, keywords: &KeywordFilter) -> f64 {
        let quality = record
            .abstract_quality
            .unwrap_or_else(|| abstract_quality::score(record.record.abstract_text.as_deref()));
        let citations = f64::from(record.citation_count().unwrap_or(0));

        KEYWORD_WEIGHT * keywords.score(&record.record)
            + QUALITY_WEIGHT * f64::from(quality) / 100.0
            + TYPE_WEIGHT * type_score(&record.record)
            + CITATION_WEIGHT * citations.ln_1p()
    }

    /// Attach scores and sort descending. Equal scores keep their input order.
    pub fn rank(&self, records: Vec<MergedRecord>, keywords: &KeywordFilter) -> Vec<MergedRecord> {
        if !self.enabled {
            return records;
        }

        let mut ranked: Vec<MergedRecord> = records
            .into_iter()
            .map(|r| {
                let score = self.score(&r, keywords);
                r.with_relevance(score)
            })
            .collect();
        ranked.sort_by(|a, b| {
            let (a, b) = (a.relevance_score.unwrap_or(0.0), b.relevance_score.unwrap_or(0.0));
            b.total_cmp(&a)
        });

        if let Some(max) = self.max_papers {
            ranked.truncate(max);
        }
        ranked
    }
}
