//! Crossref records: JATS markup in titles and abstracts.

use super::{base_builder, strip_markup, SourceAdapter};
use crate::models::{NormalizedRecord, RawRecord};

/// Crossref REST API works
#[derive(Debug, Clone, Default)]
pub struct CrossrefAdapter;

impl CrossrefAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Strip JATS markup and the leading "Abstract" heading Crossref deposits carry
    fn clean_abstract(text: &str) -> String {
        let plain = strip_markup(text);
        match plain.strip_prefix("Abstract") {
            Some(rest) if rest.starts_with(|c: char| c.is_whitespace() || c == ':') => {
                rest.trim_start_matches(|c: char| c.is_whitespace() || c == ':').to_string()
            }
            _ => plain,
        }
    }
}

impl SourceAdapter for CrossrefAdapter {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "Crossref"
    }

    fn to_normalized_record(&self, raw: &RawRecord) -> NormalizedRecord {
        let title = raw.title.as_deref().map(strip_markup);
        let abstract_text = raw.abstract_text.as_deref().map(Self::clean_abstract);
        // print and electronic ISSNs arrive together
        let issn = raw
            .issn
            .as_deref()
            .and_then(|v| v.split([';', ',']).map(str::trim).find(|s| !s.is_empty()));

        base_builder(raw)
            .title(title.as_deref())
            .abstract_text(abstract_text.as_deref())
            .issn(issn)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jats_abstract() {
        let raw = RawRecord::builder("crossref")
            .title("Effects of <sub>CO2</sub> on growth")
            .abstract_text("<jats:title>Abstract</jats:title><jats:p>We measure growth.</jats:p>")
            .issn("1234-5678, 8765-4321")
            .build();

        let record = CrossrefAdapter.to_normalized_record(&raw);
        assert_eq!(record.title.as_deref(), Some("Effects of CO2 on growth"));
        assert_eq!(record.abstract_text.as_deref(), Some("We measure growth."));
        assert_eq!(record.issn.as_deref(), Some("1234-5678"));
    }

    #[test]
    fn test_abstract_starting_with_word_abstract_is_kept() {
        assert_eq!(
            CrossrefAdapter::clean_abstract("Abstraction layers matter."),
            "Abstraction layers matter."
        );
    }

    #[test]
    fn test_markup_only_title_is_missing() {
        let raw = RawRecord::builder("crossref").title("<i></i>").build();
        assert!(CrossrefAdapter.to_normalized_record(&raw).title.is_missing());
    }
}
