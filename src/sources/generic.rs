//! Fallback adapter for sources without dedicated handling.

use super::SourceAdapter;

/// Maps raw fields one-to-one onto the normalized schema
#[derive(Debug, Clone, Default)]
pub struct GenericAdapter;

impl GenericAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SourceAdapter for GenericAdapter {
    fn id(&self) -> &str {
        "generic"
    }

    fn name(&self) -> &str {
        "Generic"
    }
}
