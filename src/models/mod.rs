//! Core data models for bibliographic records and citation data.

mod citation;
mod field;
mod merged;
mod record;

pub use citation::{
    CitationCacheEntry, CitationCounts, CitationKey, CitationResult, Resolution, ResolutionTier,
};
pub use field::Field;
pub use merged::{MatchKind, MergedRecord, SourceRef};
pub use record::{
    InlineCitations, NormalizedRecord, NormalizedRecordBuilder, PublicationDate, RawRecord,
    RawRecordBuilder, RecordField, RecordType,
};
