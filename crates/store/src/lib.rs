//! Content store: canonical messages and unified knowledge records in SQLite,
//! deduplicated by natural keys and content hash, with embedding persistence
//! and an ordering-by-distance nearest-neighbor scan.

pub mod names;
pub mod schema;
pub mod sqlite;
pub mod store;
pub mod vector;

pub use {
    names::{Directory, DirectoryEntry, NameSyncReport, sync_chat_names},
    schema::{KnowledgeRow, MessageRow, run_migrations},
    sqlite::SqliteContentStore,
    store::{ContentStore, PendingEmbedding, ScoredRecord, StoreCounts},
};
