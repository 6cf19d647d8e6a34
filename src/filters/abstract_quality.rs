//! Phase 3: abstract quality scoring.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::AbstractQualityConfig;
use crate::models::NormalizedRecord;

static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(no abstract( is)? available|abstract (is )?not available|abstract unavailable|there is no abstract|has no abstract|an abstract is not available|^\s*\[?(n/?a|none|abstract|no abstract|tbd|not applicable)\]?\.?\s*$|lorem ipsum|click here to|full text available)",
    )
    .expect("valid regex")
});
static TRUNCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.\.\.|…|\[\.\.\.\]|\[truncated\]|\(truncated\)|\(continued\)|\[more\])\s*$")
        .expect("valid regex")
});
static ARTIFACTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(</?[a-zA-Z][a-zA-Z0-9:]*[^<>]*>|&[a-z]{2,8};|&#x?[0-9a-fA-F]+;|\\[a-zA-Z]+\{|\{\\|\x{FFFD})")
        .expect("valid regex")
});

/// A defect found in an abstract, with its score penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractDefect {
    Missing,
    Truncated,
    Boilerplate,
    TooShort,
    TooLong,
    EndsMidClause,
    FormattingArtifacts,
}

impl AbstractDefect {
    pub fn penalty(&self) -> u8 {
        match self {
            AbstractDefect::Missing | AbstractDefect::Truncated => 40,
            AbstractDefect::Boilerplate
            | AbstractDefect::TooShort
            | AbstractDefect::TooLong
            | AbstractDefect::EndsMidClause => 15,
            AbstractDefect::FormattingArtifacts => 5,
        }
    }
}

const MIN_WORDS: usize = 50;
const MAX_WORDS: usize = 1000;

/// Detect every defect in an abstract. A missing abstract is also too short.
pub fn detect_defects(text: Option<&str>) -> Vec<AbstractDefect> {
    let text = match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => text,
        None => return vec![AbstractDefect::Missing, AbstractDefect::TooShort],
    };

    let mut defects = Vec::new();
    let truncated = TRUNCATION.is_match(text);
    if truncated {
        defects.push(AbstractDefect::Truncated);
    }
    if BOILERPLATE.is_match(text) {
        defects.push(AbstractDefect::Boilerplate);
    }

    let words = text.split_whitespace().count();
    if words < MIN_WORDS {
        defects.push(AbstractDefect::TooShort);
    } else if words > MAX_WORDS {
        defects.push(AbstractDefect::TooLong);
    }

    if !truncated && ends_mid_clause(text) {
        defects.push(AbstractDefect::EndsMidClause);
    }
    if ARTIFACTS.is_match(text) {
        defects.push(AbstractDefect::FormattingArtifacts);
    }
    defects
}

fn ends_mid_clause(text: &str) -> bool {
    match text.chars().last() {
        Some(c) => c.is_alphanumeric() || matches!(c, ',' | ';' | ':' | '-' | '(' | '–'),
        None => false,
    }
}

/// Quality score in 0..=100: 100 minus stacked penalties, floored at 0
pub fn score(text: Option<&str>) -> u8 {
    let penalty: u32 = detect_defects(text)
        .iter()
        .map(|d| u32::from(d.penalty()))
        .sum();
    100u32.saturating_sub(penalty) as u8
}

/// Drops records whose abstract scores below a threshold
#[derive(Debug, Clone)]
pub struct AbstractQualityFilter {
    enabled: bool,
    threshold: u8,
}

impl AbstractQualityFilter {
    pub fn new(config: &AbstractQualityConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold: config.threshold,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn score(&self, record: &NormalizedRecord) -> u8 {
        score(record.abstract_text.as_deref())
    }

    pub fn accepts(&self, record: &NormalizedRecord) -> bool {
        !self.enabled || self.score(record) >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        let mut text = vec!["word"; n].join(" ");
        text.push('.');
        text
    }

    #[test]
    fn test_clean_abstract_scores_full() {
        assert_eq!(score(Some(&words(120))), 100);
    }

    #[test]
    fn test_missing_abstract() {
        assert_eq!(
            detect_defects(None),
            vec![AbstractDefect::Missing, AbstractDefect::TooShort]
        );
        assert_eq!(score(None), 45);
        assert_eq!(score(Some("   ")), 45);
    }

    #[test]
    fn test_truncated() {
        let text = format!("{} and then...", &words(80)[..words(80).len() - 1]);
        let defects = detect_defects(Some(&text));
        assert!(defects.contains(&AbstractDefect::Truncated));
        assert!(!defects.contains(&AbstractDefect::EndsMidClause));
        assert_eq!(score(Some(&text)), 60);
    }

    #[test]
    fn test_boilerplate_and_short() {
        let defects = detect_defects(Some("No abstract available."));
        assert_eq!(
            defects,
            vec![AbstractDefect::Boilerplate, AbstractDefect::TooShort]
        );
        assert_eq!(score(Some("No abstract available.")), 70);
    }

    #[test]
    fn test_ends_mid_clause() {
        let text = format!("{} which shows that", &words(60)[..words(60).len() - 1]);
        assert_eq!(detect_defects(Some(&text)), vec![AbstractDefect::EndsMidClause]);
        assert_eq!(score(Some(&text)), 85);
    }

    #[test]
    fn test_too_long() {
        assert_eq!(detect_defects(Some(&words(1001))), vec![AbstractDefect::TooLong]);
    }

    #[test]
    fn test_formatting_artifacts() {
        let text = format!("<jats:p>{}</jats:p>", words(60));
        assert_eq!(
            detect_defects(Some(&text)),
            vec![AbstractDefect::FormattingArtifacts]
        );
        assert_eq!(score(Some(&text)), 95);
    }

    #[test]
    fn test_penalties_stack() {
        // truncated, boilerplate, short, artifacts
        let text = "&amp; no abstract available...";
        assert_eq!(score(Some(text)), 25);
    }

    #[test]
    fn test_filter_threshold() {
        let filter = AbstractQualityFilter::new(&AbstractQualityConfig {
            enabled: true,
            threshold: 60,
        });
        let good = NormalizedRecord::builder("x")
            .abstract_text(Some(&words(100)))
            .build();
        let missing = NormalizedRecord::builder("x").title(Some("T")).build();

        assert!(filter.accepts(&good));
        assert!(!filter.accepts(&missing));

        let disabled = AbstractQualityFilter::new(&AbstractQualityConfig {
            enabled: false,
            threshold: 60,
        });
        assert!(disabled.accepts(&missing));
    }
}
