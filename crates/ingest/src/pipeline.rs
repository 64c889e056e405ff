//! The ingestion pipeline: canonical messages in, idempotent store writes
//! and knowledge records out.
//!
//! Every entry point returns aggregate [`IngestReport`] counters; a single
//! bad record is counted and the run continues. Only an unreadable file or
//! directory fails a whole run. Overlapping runs are safe because every
//! write is idempotent by natural key.

use std::{io::BufReader, path::Path, sync::Arc};

use {
    tracing::{debug, info, warn},
    walkdir::WalkDir,
};

use {
    recall_common::{
        CanonicalMessage, IngestReport, NewKnowledgeRecord, content_hash,
    },
    recall_embeddings::{EmbedJob, EmbeddingQueueHandle},
    recall_store::ContentStore,
};

use crate::{
    export::{ExportConfig, parse_export},
    live::{LiveRecord, normalize_live},
    sessions::parse_session,
};

/// Which messages become knowledge records. Non-empty content is always
/// required; `outbound_only` additionally restricts the knowledge base to
/// the owner's own messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct InclusionPolicy {
    pub outbound_only: bool,
}

impl InclusionPolicy {
    fn admits(&self, msg: &CanonicalMessage) -> bool {
        !msg.body.trim().is_empty() && (!self.outbound_only || msg.is_outbound)
    }
}

pub struct Ingestor {
    store: Arc<dyn ContentStore>,
    policy: InclusionPolicy,
    /// When set, freshly created knowledge records are handed to the
    /// detached embedding queue (at-most-once, best-effort).
    embed_queue: Option<EmbeddingQueueHandle>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            policy: InclusionPolicy::default(),
            embed_queue: None,
        }
    }

    pub fn with_policy(mut self, policy: InclusionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_embedding_queue(mut self, handle: EmbeddingQueueHandle) -> Self {
        self.embed_queue = Some(handle);
        self
    }

    /// Ingest already-normalized canonical messages.
    pub async fn ingest_messages(
        &self,
        messages: Vec<CanonicalMessage>,
    ) -> anyhow::Result<IngestReport> {
        let mut report = IngestReport::default();

        for msg in messages {
            self.store.insert_message(&msg).await?;
            self.store.upsert_chat(&msg.chat_id, None).await?;
            report.processed += 1;

            if !self.policy.admits(&msg) {
                report.skipped += 1;
                continue;
            }

            let record = derive_knowledge(&msg);
            match self.store.insert_knowledge(&record).await? {
                Some(knowledge_id) => {
                    self.store
                        .link_knowledge(msg.source, &msg.message_id, knowledge_id)
                        .await?;
                    if let Some(queue) = &self.embed_queue {
                        queue.dispatch(EmbedJob {
                            knowledge_id,
                            text: record.processed_content.clone(),
                        });
                    }
                },
                // Deduplicated against an existing record: a successful no-op.
                None => debug!(
                    source = msg.source.as_str(),
                    message_id = %msg.message_id,
                    "knowledge record already present"
                ),
            }
        }

        Ok(report)
    }

    /// Ingest a batch of buffered bridge records.
    pub async fn ingest_live(&self, records: Vec<LiveRecord>) -> anyhow::Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut normalized = Vec::with_capacity(records.len());

        for record in records {
            match normalize_live(record) {
                Ok(msg) => normalized.push(msg),
                Err(err) => {
                    warn!(error = %err, "dropping unnormalizable bridge record");
                    report.errors += 1;
                },
            }
        }

        report.merge(self.ingest_messages(normalized).await?);
        info!(
            processed = report.processed,
            errors = report.errors,
            "ingested live buffer"
        );
        Ok(report)
    }

    /// Ingest one export transcript file. Unreadable file: fatal.
    pub async fn ingest_export_file(
        &self,
        path: &Path,
        config: &ExportConfig,
    ) -> anyhow::Result<IngestReport> {
        let text = tokio::fs::read_to_string(path).await?;
        let (messages, counts) = parse_export(&text, config);

        let mut report = self.ingest_messages(messages).await?;
        report.skipped += counts.dropped_system + counts.orphan_lines;
        info!(
            path = %path.display(),
            processed = report.processed,
            skipped = report.skipped,
            "ingested export transcript"
        );
        Ok(report)
    }

    /// Ingest one session log. The session id is the file stem. Unreadable
    /// file: fatal.
    pub async fn ingest_session_file(&self, path: &Path) -> anyhow::Result<IngestReport> {
        let session_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let file = std::fs::File::open(path)?;
        let parse = parse_session(&session_id, BufReader::new(file))?;

        let mut report = self.ingest_messages(parse.messages).await?;
        report.skipped += parse.skipped;
        report.errors += parse.errors;
        info!(
            session = %session_id,
            processed = report.processed,
            errors = report.errors,
            "ingested session log"
        );
        Ok(report)
    }

    /// Ingest every `.jsonl` session log under a directory. An unreadable
    /// directory is fatal; individual bad lines are not.
    pub async fn ingest_session_dir(&self, dir: &Path) -> anyhow::Result<IngestReport> {
        let mut report = IngestReport::default();

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "jsonl") {
                paths.push(path.to_path_buf());
            }
        }
        paths.sort();

        for path in paths {
            report.merge(self.ingest_session_file(&path).await?);
        }
        Ok(report)
    }
}

fn derive_knowledge(msg: &CanonicalMessage) -> NewKnowledgeRecord {
    let mut metadata = serde_json::json!({
        "chat_id": msg.chat_id,
        "sender_id": msg.sender_id,
        "sender_name": msg.sender_name,
        "kind": msg.kind.as_str(),
        "is_group": msg.is_group,
    });
    if let Some(tools) = msg.raw.get("tool_blocks")
        && let Some(map) = metadata.as_object_mut()
    {
        map.insert("tool_blocks".to_string(), tools.clone());
    }

    NewKnowledgeRecord {
        source_type: msg.source,
        source_id: msg.message_id.clone(),
        // Hash of the raw content at write time: identical text arriving via
        // two different pipelines collapses to one record.
        content_hash: content_hash(&msg.body),
        raw_content: msg.body.clone(),
        processed_content: msg.body.trim().to_string(),
        metadata,
        source_timestamp: msg.timestamp,
    }
}
