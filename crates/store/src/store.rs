//! The `ContentStore` trait: the seam between ingestion, embedding, and
//! retrieval. All writes are idempotent by natural key, so overlapping
//! ingestion runs are safe without external locking.

use async_trait::async_trait;

use recall_common::{CanonicalMessage, NewKnowledgeRecord, SourceType};

use crate::schema::KnowledgeRow;

/// A knowledge record still waiting for its embedding.
#[derive(Debug, Clone)]
pub struct PendingEmbedding {
    pub id: i64,
    pub content: String,
}

/// A knowledge record scored by the nearest-neighbor scan. `distance` is
/// cosine distance; retrieval converts it to similarity as `1 - distance`.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: KnowledgeRow,
    pub distance: f32,
}

/// Row counts for status reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    pub messages: i64,
    pub knowledge: i64,
    pub embedded: i64,
    pub pending: i64,
    pub chats: i64,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a canonical message. A conflict on `(source, message_id)` is a
    /// successful no-op (first writer wins). Returns whether a new row was
    /// written.
    async fn insert_message(&self, msg: &CanonicalMessage) -> anyhow::Result<bool>;

    /// Set the weak knowledge link on a message, if not already set.
    async fn link_knowledge(
        &self,
        source: SourceType,
        message_id: &str,
        knowledge_id: i64,
    ) -> anyhow::Result<()>;

    /// Insert a knowledge record. A conflict on either unique key,
    /// `(source_type, source_id)` or `content_hash`, is a successful no-op.
    /// Returns the new row id, or `None` when the record deduplicated away.
    async fn insert_knowledge(&self, record: &NewKnowledgeRecord) -> anyhow::Result<Option<i64>>;

    async fn get_knowledge(&self, id: i64) -> anyhow::Result<Option<KnowledgeRow>>;

    /// Register a chat, recording its name when one is supplied. Never
    /// overwrites an existing non-null name.
    async fn upsert_chat(&self, chat_id: &str, name: Option<&str>) -> anyhow::Result<()>;

    /// One page of chats still lacking a display name, in stable id order,
    /// starting strictly after `after`.
    async fn unnamed_chats(&self, limit: i64, after: Option<&str>)
    -> anyhow::Result<Vec<String>>;

    /// Patch a chat name only if it is still missing. Returns whether a row
    /// was updated.
    async fn set_chat_name_if_missing(&self, chat_id: &str, name: &str) -> anyhow::Result<bool>;

    /// One page of records with a null embedding and non-empty content, in
    /// stable id order. Bounded: never loads the full table.
    async fn pending_embeddings(&self, limit: i64) -> anyhow::Result<Vec<PendingEmbedding>>;

    /// Persist an embedding exactly once: a record whose embedding is
    /// already set is left untouched. Returns whether the row was updated.
    async fn set_embedding(&self, id: i64, embedding: &[f32]) -> anyhow::Result<bool>;

    /// The ordering-by-distance operation over all records with an
    /// embedding, optionally filtered to a set of source types. Results are
    /// ascending by cosine distance, at most `limit` of them.
    async fn nearest(
        &self,
        query: &[f32],
        limit: usize,
        source_types: Option<&[SourceType]>,
    ) -> anyhow::Result<Vec<ScoredRecord>>;

    async fn counts(&self) -> anyhow::Result<StoreCounts>;
}
