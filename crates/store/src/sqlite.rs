//! SQLite implementation of [`ContentStore`] over an sqlx pool.
//!
//! Dedup relies entirely on `INSERT ... ON CONFLICT DO NOTHING` against the
//! natural unique keys, so re-running ingestion over overlapping data needs
//! no existence checks and no locking. The nearest-neighbor operation is an
//! in-process cosine scan over embedded rows, the stand-in for an ANN
//! distance index behind the same ordering-by-distance contract.

use std::str::FromStr;

use {
    async_trait::async_trait,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::debug,
};

use recall_common::{CanonicalMessage, NewKnowledgeRecord, SourceType};

use crate::{
    schema::{KnowledgeRow, run_migrations},
    store::{ContentStore, PendingEmbedding, ScoredRecord, StoreCounts},
    vector,
};

pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) a database file and run migrations.
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection, so every query sees
    /// the same database.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn insert_message(&self, msg: &CanonicalMessage) -> anyhow::Result<bool> {
        let raw = serde_json::to_string(&msg.raw)?;
        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (source, message_id, chat_id, sender_id, sender_name, body,
                 kind, is_outbound, is_group, timestamp, quoted_id, raw)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(msg.source.as_str())
        .bind(&msg.message_id)
        .bind(&msg.chat_id)
        .bind(&msg.sender_id)
        .bind(&msg.sender_name)
        .bind(&msg.body)
        .bind(msg.kind.as_str())
        .bind(msg.is_outbound)
        .bind(msg.is_group)
        .bind(msg.timestamp.to_rfc3339())
        .bind(&msg.quoted_id)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn link_knowledge(
        &self,
        source: SourceType,
        message_id: &str,
        knowledge_id: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE messages SET knowledge_id = ?
             WHERE source = ? AND message_id = ? AND knowledge_id IS NULL",
        )
        .bind(knowledge_id)
        .bind(source.as_str())
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_knowledge(&self, record: &NewKnowledgeRecord) -> anyhow::Result<Option<i64>> {
        let metadata = serde_json::to_string(&record.metadata)?;
        // A conflict on either unique key (composite source id or content
        // hash) makes this a no-op: first writer wins, duplicates collapse.
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO knowledge
                (source_type, source_id, content_hash, raw_content,
                 processed_content, metadata, source_timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(record.source_type.as_str())
        .bind(&record.source_id)
        .bind(&record.content_hash)
        .bind(&record.raw_content)
        .bind(&record.processed_content)
        .bind(metadata)
        .bind(record.source_timestamp.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;
        if id.is_none() {
            debug!(
                source = record.source_type.as_str(),
                source_id = %record.source_id,
                "knowledge record deduplicated"
            );
        }
        Ok(id)
    }

    async fn get_knowledge(&self, id: i64) -> anyhow::Result<Option<KnowledgeRow>> {
        let row = sqlx::query_as::<_, KnowledgeRow>("SELECT * FROM knowledge WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn upsert_chat(&self, chat_id: &str, name: Option<&str>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chats (chat_id, name, last_seen)
            VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            ON CONFLICT (chat_id) DO UPDATE SET
                name      = COALESCE(chats.name, excluded.name),
                last_seen = excluded.last_seen
            "#,
        )
        .bind(chat_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unnamed_chats(
        &self,
        limit: i64,
        after: Option<&str>,
    ) -> anyhow::Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT chat_id FROM chats
             WHERE name IS NULL AND chat_id > ?
             ORDER BY chat_id
             LIMIT ?",
        )
        .bind(after.unwrap_or(""))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn set_chat_name_if_missing(&self, chat_id: &str, name: &str) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE chats SET name = ? WHERE chat_id = ? AND name IS NULL")
                .bind(name)
                .bind(chat_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn pending_embeddings(&self, limit: i64) -> anyhow::Result<Vec<PendingEmbedding>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, processed_content FROM knowledge
             WHERE embedding IS NULL AND length(processed_content) > 0
             ORDER BY id
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, content)| PendingEmbedding { id, content })
            .collect())
    }

    async fn set_embedding(&self, id: i64, embedding: &[f32]) -> anyhow::Result<bool> {
        let blob = vector::encode(embedding);
        // Set exactly once; setting an already-set embedding is a no-op,
        // which is what makes detached embedding work safe to race.
        let result =
            sqlx::query("UPDATE knowledge SET embedding = ? WHERE id = ? AND embedding IS NULL")
                .bind(blob)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn nearest(
        &self,
        query: &[f32],
        limit: usize,
        source_types: Option<&[SourceType]>,
    ) -> anyhow::Result<Vec<ScoredRecord>> {
        let rows = sqlx::query_as::<_, KnowledgeRow>(
            "SELECT * FROM knowledge WHERE embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::new();
        for row in rows {
            if let Some(filter) = source_types
                && !row.source().is_some_and(|s| filter.contains(&s))
            {
                continue;
            }
            let Some(stored) = row.embedding_vec() else {
                continue;
            };
            let Some(distance) = vector::cosine_distance(query, &stored) else {
                anyhow::bail!(
                    "embedding dimension mismatch: query has {} dimensions, record {} has {}",
                    query.len(),
                    row.id,
                    stored.len()
                );
            };
            scored.push(ScoredRecord { record: row, distance });
        }

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn counts(&self) -> anyhow::Result<StoreCounts> {
        let messages =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
                .fetch_one(&self.pool)
                .await?;
        let knowledge =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM knowledge")
                .fetch_one(&self.pool)
                .await?;
        let embedded = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM knowledge WHERE embedding IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let chats = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chats")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreCounts {
            messages,
            knowledge,
            embedded,
            pending: knowledge - embedded,
            chats,
        })
    }
}
