//! # Research Corpus
//!
//! Aggregates bibliographic records collected from several academic sources into
//! one deduplicated, quality-filtered and ranked corpus.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (RawRecord, NormalizedRecord, MergedRecord, etc.)
//! - [`sources`]: Per-source normalization adapters behind a static registry
//! - [`citations`]: Tiered citation resolution (cache, inline data, external services)
//! - [`filters`]: The five filtering and ranking phases
//! - [`pipeline`]: Batch orchestration, global deduplication and cancellation
//! - [`utils`]: Resilience governor, citation cache, deduplication and identifiers
//! - [`config`]: Configuration management

pub mod citations;
pub mod config;
pub mod filters;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config};
pub use models::{MergedRecord, NormalizedRecord, RawRecord};
pub use pipeline::{CancelHandle, Orchestrator, PipelineError, PipelineOutput, PipelineReport};
pub use sources::SourceRegistry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
