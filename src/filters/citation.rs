//! Phase 4: age-scaled citation threshold.

use chrono::NaiveDate;

use crate::config::{CitationFilterConfig, UnresolvedPolicy};
use crate::models::MergedRecord;

/// Citations a work of the given age (whole months) must have to be kept.
///
/// | age (months) | required            |
/// |--------------|---------------------|
/// | < 18         | 0                   |
/// | 18 - 20      | 1                   |
/// | 21 - 23      | 3                   |
/// | 24 - 35      | 5 + (m - 24) / 4    |
/// | 36 +         | 10 + (m - 36) / 12  |
pub fn required_citations(months: i64) -> u32 {
    let required = match months {
        m if m < 18 => 0,
        m if m < 21 => 1,
        m if m < 24 => 3,
        m if m < 36 => 5 + (m - 24) / 4,
        m => 10 + (m - 36) / 12,
    };
    u32::try_from(required).unwrap_or(u32::MAX)
}

/// Drops records cited less than their age requires.
///
/// Records with a missing or unparsable date are always kept. Records whose
/// count could not be resolved are kept or treated as uncited according to
/// the [`UnresolvedPolicy`].
#[derive(Debug, Clone)]
pub struct CitationFilter {
    enabled: bool,
    unresolved: UnresolvedPolicy,
}

impl CitationFilter {
    pub fn new(config: &CitationFilterConfig) -> Self {
        Self {
            enabled: config.enabled,
            unresolved: config.unresolved,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn accepts(&self, record: &MergedRecord, today: NaiveDate) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(date) = record.record.publication_date() else {
            return true;
        };

        let count = match (record.citation_count(), self.unresolved) {
            (Some(count), _) => count,
            (None, UnresolvedPolicy::Exempt) => return true,
            (None, UnresolvedPolicy::Zero) => 0,
        };
        count >= required_citations(date.months_until(today))
    }
}
