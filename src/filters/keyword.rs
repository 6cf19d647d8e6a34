//! Phase 2: keyword groups, and the keyword component of the relevance score.

use crate::config::{KeywordFilterConfig, KeywordMode, SearchField};
use crate::models::NormalizedRecord;

const TITLE_HIT: f64 = 2.0;
const ABSTRACT_HIT: f64 = 1.0;
const BONUS_FACTOR: f64 = 0.5;

/// Case-insensitive substring matching against keyword groups.
///
/// Single mode needs a hit from the first group; dual mode needs a hit from
/// each of the first two groups. Bonus keywords only contribute to [`score`].
///
/// [`score`]: KeywordFilter::score
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    enabled: bool,
    mode: KeywordMode,
    groups: Vec<Vec<String>>,
    bonus: Vec<String>,
    fields: Vec<SearchField>,
}

fn fold(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

impl KeywordFilter {
    pub fn new(config: &KeywordFilterConfig) -> Self {
        Self {
            enabled: config.enabled,
            mode: config.mode,
            groups: config.groups.iter().map(|g| fold(g)).collect(),
            bonus: fold(&config.bonus),
            fields: config.fields.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Lower-cased text of the configured search fields
    fn haystack(&self, record: &NormalizedRecord) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let text = match field {
                SearchField::Title => record.title.get().cloned(),
                SearchField::Abstract => record.abstract_text.get().cloned(),
                SearchField::Venue => record.venue.get().cloned(),
                SearchField::Keywords => record.keywords.get().map(|k| k.join(" ; ")),
            };
            if let Some(text) = text {
                parts.push(text.to_lowercase());
            }
        }
        parts.join("\n")
    }

    pub fn accepts(&self, record: &NormalizedRecord) -> bool {
        if !self.enabled {
            return true;
        }
        let required = match self.mode {
            KeywordMode::Single => 1,
            KeywordMode::Dual => 2,
        };
        let text = self.haystack(record);
        self.groups
            .iter()
            .take(required)
            .all(|group| group.iter().any(|k| text.contains(k.as_str())))
    }

    /// Weighted hits in title and abstract; bonus keywords count half
    pub fn score(&self, record: &NormalizedRecord) -> f64 {
        let title = record.title.as_deref().unwrap_or_default().to_lowercase();
        let abstract_text = record
            .abstract_text
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        let hit = |keyword: &String| {
            let mut score = 0.0;
            if title.contains(keyword.as_str()) {
                score += TITLE_HIT;
            }
            if abstract_text.contains(keyword.as_str()) {
                score += ABSTRACT_HIT;
            }
            score
        };

        let group_score: f64 = self.groups.iter().flatten().map(&hit).sum();
        let bonus_score: f64 = self.bonus.iter().map(&hit).sum::<f64>() * BONUS_FACTOR;
        group_score + bonus_score
    }
}
