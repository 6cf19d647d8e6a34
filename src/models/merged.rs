//! Canonical records produced by collapsing a duplicate group.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{CitationResult, NormalizedRecord, RecordField};

/// The strongest criterion that joined a duplicate group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Normalized DOI match
    Doi,
    /// Normalized URL match
    Url,
    /// Fuzzy title match within the year tolerance
    Title,
    /// A group of one
    Singleton,
}

/// One contributing source of a merged record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub name: String,
    pub canonical: bool,
}

/// A deduplicated record.
///
/// Field values come from the canonical member, with missing fields backfilled
/// from the other members. Late pipeline phases attach their annotations with
/// the consuming `with_*` methods, each of which yields a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    #[serde(flatten)]
    pub record: NormalizedRecord,
    /// All contributing sources, canonical first
    pub sources: Vec<SourceRef>,
    /// Which source supplied each backfilled field
    pub backfilled: BTreeMap<RecordField, String>,
    pub matched_by: MatchKind,
    /// Earliest and latest publication year among the members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_span: Option<(i32, i32)>,
    pub abstract_quality: Option<u8>,
    pub citations: Option<CitationResult>,
    pub relevance_score: Option<f64>,
}

impl MergedRecord {
    pub fn new(
        record: NormalizedRecord,
        sources: Vec<SourceRef>,
        backfilled: BTreeMap<RecordField, String>,
        matched_by: MatchKind,
    ) -> Self {
        let year_span = record.year().map(|y| (y, y));
        Self {
            record,
            sources,
            backfilled,
            matched_by,
            year_span,
            abstract_quality: None,
            citations: None,
            relevance_score: None,
        }
    }

    /// Wrap a single record as its own group
    pub fn singleton(record: NormalizedRecord) -> Self {
        let sources = vec![SourceRef {
            name: record.source.clone(),
            canonical: true,
        }];
        Self::new(record, sources, BTreeMap::new(), MatchKind::Singleton)
    }

    pub fn completeness(&self) -> u32 {
        self.record.completeness()
    }

    pub fn canonical_source(&self) -> &str {
        self.sources
            .iter()
            .find(|s| s.canonical)
            .map(|s| s.name.as_str())
            .unwrap_or(self.record.source.as_str())
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    /// Citation count attached by phase 4, falling back to the inline hint
    pub fn citation_count(&self) -> Option<u32> {
        self.citations
            .as_ref()
            .map(|c| c.citation_count)
            .or_else(|| self.record.inline_citations.map(|c| c.citation_count))
    }

    pub fn with_abstract_quality(self, score: u8) -> Self {
        Self {
            abstract_quality: Some(score),
            ..self
        }
    }

    pub fn with_citations(self, citations: Option<CitationResult>) -> Self {
        Self { citations, ..self }
    }

    pub fn with_relevance(self, score: f64) -> Self {
        Self {
            relevance_score: Some(score),
            ..self
        }
    }
}

impl AsRef<NormalizedRecord> for MergedRecord {
    fn as_ref(&self) -> &NormalizedRecord {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton() {
        let record = NormalizedRecord::builder("openalex")
            .title(Some("Only One"))
            .build();
        let merged = MergedRecord::singleton(record);

        assert_eq!(merged.canonical_source(), "openalex");
        assert_eq!(merged.source_names(), vec!["openalex"]);
        assert_eq!(merged.matched_by, MatchKind::Singleton);
        assert_eq!(merged.completeness(), 5);
        assert_eq!(merged.year_span, None);
    }

    #[test]
    fn test_serialized_shape() {
        let record = NormalizedRecord::builder("crossref")
            .title(Some("Shape"))
            .doi(Some("10.1/shape"))
            .build();
        let merged = MergedRecord::singleton(record).with_relevance(1.5);
        let json = serde_json::to_value(&merged).unwrap();

        assert_eq!(json["title"], "Shape");
        assert_eq!(json["doi"], "10.1/shape");
        assert_eq!(json["abstract"], serde_json::Value::Null);
        assert_eq!(json["sources"][0]["name"], "crossref");
        assert_eq!(json["relevance_score"], 1.5);
    }
}
