//! Semantic Scholar records.

use super::{base_builder, SourceAdapter};
use crate::models::{NormalizedRecord, RawRecord};

/// Semantic Scholar Graph API papers.
///
/// The API reports `publicationTypes` as a list; collectors join it with `;`
/// and the first entry decides the record type. Semantic Scholar also ships
/// `citationCount`/`referenceCount`, which arrive as inline citation data.
#[derive(Debug, Clone, Default)]
pub struct SemanticScholarAdapter;

impl SemanticScholarAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SourceAdapter for SemanticScholarAdapter {
    fn id(&self) -> &str {
        "semantic"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn aliases(&self) -> &[&'static str] {
        &["semantic_scholar", "semanticscholar", "s2"]
    }

    fn to_normalized_record(&self, raw: &RawRecord) -> NormalizedRecord {
        // preprints report "arXiv.org" as their venue
        let venue = raw.venue.as_deref().filter(|v| !v.eq_ignore_ascii_case("arxiv.org"));
        base_builder(raw).venue(venue).build()
    }
}
