//! Phase 1: publication type whitelist.

use crate::config::TypeFilterConfig;
use crate::models::{NormalizedRecord, RecordType};

/// Keeps records whose type is whitelisted.
///
/// Records without a type tag are kept unless the filter is strict.
#[derive(Debug, Clone)]
pub struct TypeFilter {
    enabled: bool,
    strict: bool,
    allowed: Vec<RecordType>,
}

impl TypeFilter {
    pub fn new(config: &TypeFilterConfig) -> Self {
        Self {
            enabled: config.enabled,
            strict: config.strict,
            allowed: config.allowed.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn accepts(&self, record: &NormalizedRecord) -> bool {
        if !self.enabled {
            return true;
        }
        match record.record_type.get() {
            Some(kind) => self.allowed.contains(kind),
            None => !self.strict,
        }
    }
}

/// Ranking weight of a publication type: journal > conference > everything else
pub fn type_score(record: &NormalizedRecord) -> f64 {
    match record.record_type.get() {
        Some(RecordType::Journal) => 1.0,
        Some(RecordType::Conference) => 0.6,
        _ => 0.2,
    }
}
