//! arXiv records: canonical abstract URLs and DataCite DOIs.

use std::sync::LazyLock;

use regex::Regex;

use super::{base_builder, clean_doi, SourceAdapter};
use crate::models::{NormalizedRecord, RawRecord, RecordType};

static ARXIV_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)arxiv\.org/(?:abs|pdf)/([a-z-]+(?:\.[a-z]{2})?/\d{7}|\d{4}\.\d{4,5})(?:v\d+)?")
        .expect("valid regex")
});

/// arXiv preprints.
///
/// The URL is rewritten to the versionless `abs` page and, when the collector
/// supplied no DOI, the DataCite DOI `10.48550/arXiv.<id>` is derived so
/// preprints group with their other copies.
#[derive(Debug, Clone, Default)]
pub struct ArxivAdapter;

impl ArxivAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Extract the arXiv identifier (without version) from an arXiv URL
    pub fn identifier(url: &str) -> Option<String> {
        ARXIV_ID.captures(url).map(|caps| caps[1].to_lowercase())
    }
}

impl SourceAdapter for ArxivAdapter {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn to_normalized_record(&self, raw: &RawRecord) -> NormalizedRecord {
        let mut builder = base_builder(raw);

        if let Some(id) = raw.url.as_deref().and_then(Self::identifier) {
            let abs = format!("https://arxiv.org/abs/{}", id);
            builder = builder.url(Some(&abs));
            if clean_doi(raw.doi.as_deref()).is_none() {
                let doi = format!("10.48550/arxiv.{}", id);
                builder = builder.doi(Some(&doi));
            }
        }
        if raw.record_type.as_deref().map_or(true, |t| t.trim().is_empty()) {
            builder = builder.record_type(Some(RecordType::Preprint));
        }
        if raw.venue.as_deref().map_or(true, |v| v.trim().is_empty()) {
            builder = builder.venue(Some("arXiv"));
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;

    #[test]
    fn test_identifier() {
        assert_eq!(
            ArxivAdapter::identifier("http://arxiv.org/abs/2301.12345v2").as_deref(),
            Some("2301.12345")
        );
        assert_eq!(
            ArxivAdapter::identifier("https://arxiv.org/pdf/2301.12345.pdf").as_deref(),
            Some("2301.12345")
        );
        assert_eq!(
            ArxivAdapter::identifier("https://arxiv.org/abs/hep-th/9901001").as_deref(),
            Some("hep-th/9901001")
        );
        assert_eq!(ArxivAdapter::identifier("https://example.org/abs/1"), None);
    }

    #[test]
    fn test_pdf_link_becomes_abs_page_with_doi() {
        let raw = RawRecord::builder("arxiv")
            .title("Attention Is All You Need")
            .url("http://arxiv.org/pdf/1706.03762v5.pdf")
            .build();

        let record = ArxivAdapter.to_normalized_record(&raw);
        assert_eq!(record.url.as_deref(), Some("https://arxiv.org/abs/1706.03762"));
        assert_eq!(record.doi.as_deref(), Some("10.48550/arxiv.1706.03762"));
        assert_eq!(record.record_type, Field::Present(RecordType::Preprint));
        assert_eq!(record.venue.as_deref(), Some("arXiv"));
    }

    #[test]
    fn test_journal_doi_is_kept() {
        let raw = RawRecord::builder("arxiv")
            .title("Published later")
            .url("https://arxiv.org/abs/2101.00001")
            .doi("10.1103/PhysRevLett.1")
            .record_type("journal-article")
            .venue("Physical Review Letters")
            .build();

        let record = ArxivAdapter.to_normalized_record(&raw);
        assert_eq!(record.doi.as_deref(), Some("10.1103/physrevlett.1"));
        assert_eq!(record.record_type, Field::Present(RecordType::Journal));
        assert_eq!(record.venue.as_deref(), Some("Physical Review Letters"));
    }
}
