//! Row types and idempotent schema creation.

use {
    chrono::{DateTime, Utc},
    sqlx::SqlitePool,
};

use recall_common::SourceType;

use crate::vector;

/// One canonical message row. Natural key: `(source, message_id)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub source: String,
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub body: String,
    pub kind: String,
    pub is_outbound: bool,
    pub is_group: bool,
    pub timestamp: String,
    pub quoted_id: Option<String>,
    pub raw: String,
    /// Weak, non-owning link to the knowledge record derived from this
    /// message, for traceability.
    pub knowledge_id: Option<i64>,
}

/// One unified knowledge record row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KnowledgeRow {
    pub id: i64,
    pub source_type: String,
    pub source_id: String,
    pub content_hash: String,
    pub raw_content: String,
    pub processed_content: String,
    pub metadata: String,
    pub embedding: Option<Vec<u8>>,
    pub source_timestamp: String,
    pub created_at: String,
}

impl KnowledgeRow {
    pub fn source(&self) -> Option<SourceType> {
        SourceType::parse(&self.source_type)
    }

    pub fn embedding_vec(&self) -> Option<Vec<f32>> {
        self.embedding.as_deref().map(vector::decode)
    }

    pub fn metadata_value(&self) -> serde_json::Value {
        serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null)
    }

    pub fn source_timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.source_timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Create all tables and indexes if they do not exist. Safe to run on every
/// startup.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            source       TEXT    NOT NULL,
            message_id   TEXT    NOT NULL,
            chat_id      TEXT    NOT NULL,
            sender_id    TEXT    NOT NULL,
            sender_name  TEXT,
            body         TEXT    NOT NULL,
            kind         TEXT    NOT NULL,
            is_outbound  INTEGER NOT NULL DEFAULT 0,
            is_group     INTEGER NOT NULL DEFAULT 0,
            timestamp    TEXT    NOT NULL,
            quoted_id    TEXT,
            raw          TEXT    NOT NULL DEFAULT '{}',
            knowledge_id INTEGER,
            PRIMARY KEY (source, message_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            source_type       TEXT NOT NULL,
            source_id         TEXT NOT NULL,
            content_hash      TEXT NOT NULL,
            raw_content       TEXT NOT NULL,
            processed_content TEXT NOT NULL,
            metadata          TEXT NOT NULL DEFAULT '{}',
            embedding         BLOB,
            source_timestamp  TEXT NOT NULL,
            created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            UNIQUE (source_type, source_id),
            UNIQUE (content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Stable-order backfill scans page over this partial index.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_knowledge_pending
         ON knowledge (id) WHERE embedding IS NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            chat_id   TEXT PRIMARY KEY,
            name      TEXT,
            last_seen TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages (chat_id, timestamp)")
        .execute(pool)
        .await?;

    Ok(())
}
