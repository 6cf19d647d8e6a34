//! Registry for source adapters.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::{
    ArxivAdapter, CrossrefAdapter, GenericAdapter, OpenAlexAdapter, PubMedAdapter,
    SemanticScholarAdapter, SourceAdapter,
};

static GLOBAL: LazyLock<SourceRegistry> = LazyLock::new(SourceRegistry::new);

/// Registry of source adapters, keyed by lower-cased source name.
///
/// Lookups never fail: unknown names resolve to the generic adapter.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    fallback: Arc<dyn SourceAdapter>,
}

impl SourceRegistry {
    /// Create a registry with all built-in adapters
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(ArxivAdapter::new()));
        registry.register(Arc::new(CrossrefAdapter::new()));
        registry.register(Arc::new(OpenAlexAdapter::new()));
        registry.register(Arc::new(PubMedAdapter::new()));
        registry.register(Arc::new(SemanticScholarAdapter::new()));

        registry
    }

    /// A registry holding only the generic fallback
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: Arc::new(GenericAdapter::new()),
        }
    }

    /// The process-wide registry used by [`normalize`](super::normalize)
    pub fn global() -> &'static SourceRegistry {
        &GLOBAL
    }

    /// Register an adapter under its id and aliases, replacing earlier entries
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        for alias in adapter.aliases() {
            self.adapters.insert(alias.to_lowercase(), Arc::clone(&adapter));
        }
        self.adapters.insert(adapter.id().to_lowercase(), adapter);
    }

    /// Get the adapter registered for `source`, if any
    pub fn get(&self, source: &str) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.get(&source.trim().to_lowercase())
    }

    /// Get the adapter for `source`, falling back to the generic adapter
    pub fn resolve(&self, source: &str) -> &dyn SourceAdapter {
        &**self.get(source).unwrap_or(&self.fallback)
    }

    /// Check if a source has a dedicated adapter
    pub fn has(&self, source: &str) -> bool {
        self.get(source).is_some()
    }

    /// All registered names, aliases included
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
