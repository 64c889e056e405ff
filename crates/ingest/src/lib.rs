//! Ingestion for the recall knowledge base: three source normalizers (live
//! bridge buffer, export transcripts, session logs) feeding one idempotent
//! pipeline into the content store.

pub mod export;
pub mod live;
pub mod pipeline;
pub mod sessions;

pub use {
    export::{ExportConfig, ExportMessage, LineClass, classify_line, parse_export},
    live::{LiveRecord, normalize_live},
    pipeline::{InclusionPolicy, Ingestor},
    sessions::parse_session,
};
