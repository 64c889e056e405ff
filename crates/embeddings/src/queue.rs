//! Bounded fire-and-forget embedding queue.
//!
//! Ingestion in "with embeddings" mode hands jobs off here and never awaits
//! them, so ingest latency is decoupled from embedding latency. Delivery is
//! at-most-once and best-effort: a full queue drops the job, and jobs still
//! in flight are lost if the process exits. That is acceptable because the
//! batch backfill pass picks up anything the queue missed.

use {
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

use crate::coordinator::EmbeddingCoordinator;

/// One embedding request for a freshly ingested knowledge record.
#[derive(Debug)]
pub struct EmbedJob {
    pub knowledge_id: i64,
    pub text: String,
}

/// Sending side of the queue. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingQueueHandle {
    tx: mpsc::Sender<EmbedJob>,
}

impl EmbeddingQueueHandle {
    /// Hand a job to the worker without waiting. Returns whether the job was
    /// accepted; a rejected job is simply dropped (with a warning).
    pub fn dispatch(&self, job: EmbedJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(knowledge_id = job.knowledge_id, "embedding queue full, dropping job");
                false
            },
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(knowledge_id = job.knowledge_id, "embedding queue closed, dropping job");
                false
            },
        }
    }
}

/// Spawn the queue worker. The worker drains jobs strictly sequentially and
/// exits when every handle is dropped; the join handle is returned so tests
/// and shutdown paths can wait for the drain.
pub fn spawn_queue(
    coordinator: EmbeddingCoordinator,
    capacity: usize,
) -> (EmbeddingQueueHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<EmbedJob>(capacity);

    let worker = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match coordinator.embed_record(job.knowledge_id, &job.text).await {
                Ok(true) => debug!(knowledge_id = job.knowledge_id, "embedded inline record"),
                // Already embedded by a concurrent pass: nothing to do.
                Ok(false) => debug!(knowledge_id = job.knowledge_id, "embedding already set"),
                // No automatic retry; the backfill pass will catch it.
                Err(err) => {
                    warn!(knowledge_id = job.knowledge_id, error = %err, "inline embedding failed");
                },
            }
        }
    });

    (EmbeddingQueueHandle { tx }, worker)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use {async_trait::async_trait, chrono::Utc};

    use recall_common::{NewKnowledgeRecord, SourceType, content_hash};
    use recall_store::{ContentStore, SqliteContentStore};

    use crate::provider::EmbeddingProvider;

    use super::*;

    struct UnitProvider;

    #[async_trait]
    impl EmbeddingProvider for UnitProvider {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn model_name(&self) -> &str {
            "unit-mock"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    async fn insert_record(store: &SqliteContentStore, id: &str, content: &str) -> i64 {
        store
            .insert_knowledge(&NewKnowledgeRecord {
                source_type: SourceType::Bridge,
                source_id: id.to_string(),
                content_hash: content_hash(content),
                raw_content: content.to_string(),
                processed_content: content.to_string(),
                metadata: serde_json::json!({}),
                source_timestamp: Utc::now(),
            })
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn dispatched_job_is_embedded_by_worker() {
        let store = Arc::new(SqliteContentStore::open_in_memory().await.unwrap());
        let id = insert_record(&store, "q1", "queued text").await;

        let coordinator = EmbeddingCoordinator::new(store.clone(), Arc::new(UnitProvider));
        let (handle, worker) = spawn_queue(coordinator, 8);

        assert!(handle.dispatch(EmbedJob {
            knowledge_id: id,
            text: "queued text".to_string(),
        }));

        drop(handle);
        worker.await.unwrap();

        let row = store.get_knowledge(id).await.unwrap().unwrap();
        assert!(row.embedding.is_some());
    }

    #[tokio::test]
    async fn full_queue_drops_jobs_at_most_once() {
        let store = Arc::new(SqliteContentStore::open_in_memory().await.unwrap());
        let coordinator = EmbeddingCoordinator::new(store, Arc::new(UnitProvider));

        // Capacity 1 and no running worker yet consuming fast enough to
        // matter: the second try_send can find the queue full.
        let (tx, rx) = mpsc::channel::<EmbedJob>(1);
        let handle = EmbeddingQueueHandle { tx };
        assert!(handle.dispatch(EmbedJob {
            knowledge_id: 1,
            text: "a".into(),
        }));
        assert!(!handle.dispatch(EmbedJob {
            knowledge_id: 2,
            text: "b".into(),
        }));

        drop(rx);
        drop(coordinator);
    }
}
