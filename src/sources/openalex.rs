//! OpenAlex records.

use super::{base_builder, clean_doi, strip_markup, SourceAdapter};
use crate::models::{NormalizedRecord, RawRecord};

/// OpenAlex works.
///
/// Collectors often hand over the OpenAlex entity id (`https://openalex.org/W...`)
/// as the record URL. That is not a landing page, so it is replaced by the DOI
/// resolver link when a DOI is known.
#[derive(Debug, Clone, Default)]
pub struct OpenAlexAdapter;

impl OpenAlexAdapter {
    pub fn new() -> Self {
        Self
    }

    fn is_entity_url(url: &str) -> bool {
        let lower = url.trim().to_lowercase();
        lower.starts_with("https://openalex.org/") || lower.starts_with("http://openalex.org/")
    }
}

impl SourceAdapter for OpenAlexAdapter {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    fn to_normalized_record(&self, raw: &RawRecord) -> NormalizedRecord {
        let title = raw.title.as_deref().map(strip_markup);
        let mut builder = base_builder(raw).title(title.as_deref());

        if raw.url.as_deref().is_some_and(Self::is_entity_url) {
            let landing = clean_doi(raw.doi.as_deref()).map(|doi| format!("https://doi.org/{}", doi));
            builder = builder.url(landing.as_deref());
        }

        builder.build()
    }
}
