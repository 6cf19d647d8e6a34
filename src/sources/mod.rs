//! Per-source normalization of raw records.
//!
//! Every collector tags its records with a source name. The [`SourceAdapter`]
//! registered under that name maps a [`RawRecord`] into the fixed
//! [`NormalizedRecord`] schema, applying whatever cleanup that source's payloads
//! need (markup in Crossref titles, arXiv identifiers, PubMed's trailing
//! periods, ...). Unknown sources fall back to the [`GenericAdapter`].
//!
//! # Adding a source
//!
//! 1. Create a struct implementing [`SourceAdapter`]
//! 2. Override [`SourceAdapter::to_normalized_record`] if the defaults are not enough
//! 3. Register it in [`SourceRegistry::new()`]
//!
//! ```rust
//! use research_corpus::models::RawRecord;
//! use research_corpus::sources::normalize;
//!
//! let raw = RawRecord::builder("crossref")
//!     .title("Deep <i>learning</i>")
//!     .doi("https://doi.org/10.1038/nature14539")
//!     .build();
//!
//! let record = normalize(&raw);
//! assert_eq!(record.title.as_deref(), Some("Deep learning"));
//! assert_eq!(record.doi.as_deref(), Some("10.1038/nature14539"));
//! ```

mod arxiv;
mod crossref;
mod generic;
mod openalex;
mod pubmed;
mod registry;
mod semantic;

pub use arxiv::ArxivAdapter;
pub use crossref::CrossrefAdapter;
pub use generic::GenericAdapter;
pub use openalex::OpenAlexAdapter;
pub use pubmed::PubMedAdapter;
pub use registry::SourceRegistry;
pub use semantic::SemanticScholarAdapter;

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::models::{NormalizedRecord, NormalizedRecordBuilder, RawRecord, RecordType};
use crate::utils::identifiers::{normalize_doi, normalize_url};

/// Maps one source's raw records into the normalized schema.
pub trait SourceAdapter: Send + Sync + std::fmt::Debug {
    /// Source name used to tag records (e.g. "arxiv", "crossref")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Other tags collectors use for this source
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    /// Normalize a raw record. Never fails: defective values become `Missing`.
    fn to_normalized_record(&self, raw: &RawRecord) -> NormalizedRecord {
        base_builder(raw).build()
    }
}

/// Normalize a raw record with the adapter registered for its source
pub fn normalize(raw: &RawRecord) -> NormalizedRecord {
    SourceRegistry::global()
        .resolve(&raw.source)
        .to_normalized_record(raw)
}

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9:_-]*(\s[^<>]*)?/?>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Builder populated with the source-independent mapping of `raw`.
///
/// Adapters start from this and override the fields their source needs.
pub(crate) fn base_builder(raw: &RawRecord) -> NormalizedRecordBuilder {
    let record_type = raw.record_type.as_deref().and_then(first_tag).and_then(RecordType::from_tag);

    NormalizedRecord::builder(raw.source.trim())
        .title(raw.title.as_deref())
        .abstract_text(raw.abstract_text.as_deref())
        .authors(split_list(raw.authors.as_deref()))
        .doi(clean_doi(raw.doi.as_deref()).as_deref())
        .url(clean_url(raw.url.as_deref()))
        .venue(raw.venue.as_deref())
        .volume(raw.volume.as_deref())
        .issue(raw.issue.as_deref())
        .pages(raw.pages.as_deref())
        .publisher(raw.publisher.as_deref())
        .issn(raw.issn.as_deref())
        .language(raw.language.as_deref())
        .date(raw.date.as_deref())
        .keywords(split_list(raw.keywords.as_deref()))
        .record_type(record_type)
        .inline_citations(raw.inline_citations())
}

/// Split a semicolon-separated list, dropping blanks
pub(crate) fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Normalized DOI, or `None` when the value is not a DOI
pub(crate) fn clean_doi(value: Option<&str>) -> Option<String> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    match normalize_doi(raw) {
        Ok(doi) => Some(doi),
        Err(e) => {
            debug!("Dropping DOI {:?}: {}", raw, e);
            None
        }
    }
}

/// The URL as given, if it is a usable http(s) URL
pub(crate) fn clean_url(value: Option<&str>) -> Option<&str> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    match normalize_url(raw) {
        Ok(_) => Some(raw),
        Err(e) => {
            debug!("Dropping URL {:?}: {}", raw, e);
            None
        }
    }
}

/// Remove HTML/JATS tags and collapse whitespace
pub(crate) fn strip_markup(value: &str) -> String {
    let stripped = MARKUP.replace_all(value, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// First entry of a `;`-separated type tag list
fn first_tag(tags: &str) -> Option<&str> {
    tags.split(';').map(str::trim).find(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, InlineCitations};

    #[test]
    fn test_base_mapping() {
        let raw = RawRecord::builder("somewhere")
            .title("  A Study  ")
            .abstract_text("")
            .authors("Ada Lovelace; ; Charles Babbage")
            .keywords("ml;  nlp ;")
            .doi("doi:10.1234/ABC")
            .url("https://example.org/paper")
            .record_type("journal-article")
            .citations(4)
            .build();

        let record = normalize(&raw);
        assert_eq!(record.source, "somewhere");
        assert_eq!(record.title.as_deref(), Some("A Study"));
        assert!(record.abstract_text.is_missing());
        assert_eq!(
            record.authors,
            Field::Present(vec!["Ada Lovelace".to_string(), "Charles Babbage".to_string()])
        );
        assert_eq!(
            record.keywords,
            Field::Present(vec!["ml".to_string(), "nlp".to_string()])
        );
        assert_eq!(record.doi.as_deref(), Some("10.1234/abc"));
        assert_eq!(record.url.as_deref(), Some("https://example.org/paper"));
        assert_eq!(record.record_type, Field::Present(RecordType::Journal));
        assert_eq!(
            record.inline_citations,
            Some(InlineCitations {
                citation_count: 4,
                reference_count: None
            })
        );
    }

    #[test]
    fn test_defective_identifiers_become_missing() {
        let raw = RawRecord::builder("generic")
            .title("T")
            .doi("n/a")
            .url("ftp://example.org/file")
            .build();

        let record = normalize(&raw);
        assert!(record.doi.is_missing());
        assert!(record.url.is_missing());
        assert_eq!(record.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_blank_record_normalizes_to_missing() {
        let record = normalize(&RawRecord::builder("generic").title("   ").build());
        assert!(record.lacks_identifiers());
        assert_eq!(record.completeness(), 0);
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<jats:p>Deep   <i>learning</i>\n works</jats:p>"),
            "Deep learning works"
        );
        assert_eq!(strip_markup("a < b and c > d"), "a < b and c > d");
    }

    #[test]
    fn test_first_type_tag_wins() {
        let raw = RawRecord::builder("generic")
            .title("T")
            .record_type("Conference; JournalArticle")
            .build();
        assert_eq!(normalize(&raw).record_type, Field::Present(RecordType::Conference));
    }
}
