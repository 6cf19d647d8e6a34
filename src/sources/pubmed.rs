//! PubMed records.

use super::{base_builder, SourceAdapter};
use crate::models::{NormalizedRecord, RawRecord, RecordType};

/// PubMed / MEDLINE citations.
///
/// MEDLINE titles end with a period and bracket translated titles
/// (`[Title in English].`); both are stripped. Everything PubMed indexes is a
/// journal article unless the collector says otherwise.
#[derive(Debug, Clone, Default)]
pub struct PubMedAdapter;

impl PubMedAdapter {
    pub fn new() -> Self {
        Self
    }

    fn clean_title(title: &str) -> &str {
        let t = title.trim().trim_end_matches('.');
        t.strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(t)
            .trim()
    }
}

impl SourceAdapter for PubMedAdapter {
    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    fn aliases(&self) -> &[&'static str] {
        &["medline", "pmc", "europe_pmc"]
    }

    fn to_normalized_record(&self, raw: &RawRecord) -> NormalizedRecord {
        let mut builder = base_builder(raw).title(raw.title.as_deref().map(Self::clean_title));
        if raw.record_type.as_deref().map_or(true, |t| t.trim().is_empty()) {
            builder = builder.record_type(Some(RecordType::Journal));
        }
        builder.build()
    }
}
