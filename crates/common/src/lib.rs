//! Shared model for the recall knowledge base: the canonical message shape
//! every source normalizes into, the closed enums validated at the
//! normalization boundary, content hashing, and the aggregate counters every
//! ingest entry point reports.

pub mod error;
pub mod hash;
pub mod report;
pub mod types;

pub use {
    error::NormalizeError,
    hash::{content_hash, synthetic_id},
    report::IngestReport,
    types::{CanonicalMessage, MessageKind, NewKnowledgeRecord, Role, SourceType},
};
