//! Embedding coordinator: every eligible knowledge record eventually gets a
//! fixed-dimension embedding, without blocking ingestion and without
//! embedding anything twice.

use std::sync::Arc;

use tracing::{info, warn};

use recall_store::ContentStore;

use crate::provider::EmbeddingProvider;

pub const DEFAULT_BATCH_SIZE: i64 = 10;

/// Outcome of one backfill run. A batch-level failure aborts the rest of the
/// run, but every batch committed before it stays persisted.
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    /// Records embedded and persisted before the run ended.
    pub processed: usize,
    /// The failure that aborted the run, if any.
    pub error: Option<String>,
}

impl BackfillReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub struct EmbeddingCoordinator {
    store: Arc<dyn ContentStore>,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: i64,
}

impl EmbeddingCoordinator {
    pub fn new(store: Arc<dyn ContentStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            provider,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Single-record path: embed one text synchronously.
    pub async fn generate(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.provider.embed(text).await
    }

    /// Embed one text and persist it against a knowledge record. Setting an
    /// embedding is idempotent, so racing with a concurrent backfill pass is
    /// harmless. Returns whether the row was updated.
    pub async fn embed_record(&self, knowledge_id: i64, text: &str) -> anyhow::Result<bool> {
        let embedding = self.provider.embed(text).await?;
        self.store.set_embedding(knowledge_id, &embedding).await
    }

    /// Backfill embeddings for all records that lack one, in sequential
    /// batches (bounded memory, no parallel batches by design).
    ///
    /// Store-level failures propagate as `Err`; a failed batch call ends the
    /// run early and is reported in the returned [`BackfillReport`].
    pub async fn backfill(&self) -> anyhow::Result<BackfillReport> {
        let mut report = BackfillReport::default();

        loop {
            let batch = self.store.pending_embeddings(self.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let texts: Vec<String> = batch.iter().map(|p| p.content.clone()).collect();
            let vectors = match self.provider.embed_batch(&texts).await {
                Ok(vectors) => vectors,
                Err(err) => {
                    warn!(error = %err, processed = report.processed, "embedding batch failed, aborting backfill");
                    report.error = Some(err.to_string());
                    return Ok(report);
                },
            };

            // Vectors are paired with records positionally; the backend
            // contract is one vector per input in request order. Pairing by
            // id would be the hardened alternative, but the endpoint carries
            // no ids to pair on, so a length check is the guard we have.
            if vectors.len() != batch.len() {
                report.error = Some(format!(
                    "backend returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                ));
                warn!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "embedding batch size mismatch, aborting backfill"
                );
                return Ok(report);
            }

            for (pending, embedding) in batch.iter().zip(vectors.iter()) {
                if embedding.len() != self.provider.dimensions() {
                    report.error = Some(format!(
                        "embedding for record {} has {} dimensions, expected {}",
                        pending.id,
                        embedding.len(),
                        self.provider.dimensions()
                    ));
                    return Ok(report);
                }
                self.store.set_embedding(pending.id, embedding).await?;
                report.processed += 1;
            }
        }

        info!(processed = report.processed, "embedding backfill complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use {async_trait::async_trait, chrono::Utc};

    use recall_common::{NewKnowledgeRecord, SourceType, content_hash};
    use recall_store::SqliteContentStore;

    use super::*;

    /// Deterministic provider that counts batch calls and can fail from a
    /// given call onward.
    struct CountingProvider {
        calls: AtomicUsize,
        fail_from_call: Option<usize>,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from_call: None,
            }
        }

        fn failing_from(call: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from_call: Some(call),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.embed_batch(std::slice::from_ref(&text.to_string()))
                .await?
                .pop()
                .ok_or_else(|| anyhow::anyhow!("empty"))
        }

        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_from_call.is_some_and(|n| call >= n) {
                anyhow::bail!("backend unavailable");
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }

        fn model_name(&self) -> &str {
            "counting-mock"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    /// Provider that drops one vector from every batch response.
    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0, 0.0]).collect())
        }

        fn model_name(&self) -> &str {
            "short-mock"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    async fn store_with_pending(n: usize) -> Arc<SqliteContentStore> {
        let store = SqliteContentStore::open_in_memory().await.unwrap();
        for i in 0..n {
            let content = format!("pending record {i}");
            store
                .insert_knowledge(&NewKnowledgeRecord {
                    source_type: SourceType::Bridge,
                    source_id: format!("r{i}"),
                    content_hash: content_hash(&content),
                    raw_content: content.clone(),
                    processed_content: content,
                    metadata: serde_json::json!({}),
                    source_timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn backfill_pages_in_batches_and_reports_total() {
        let store = store_with_pending(5).await;
        let provider = Arc::new(CountingProvider::new());
        let coordinator = EmbeddingCoordinator::new(store.clone(), provider.clone())
            .with_batch_size(2);

        let report = coordinator.backfill().await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.processed, 5);
        // 5 records at batch size 2: pages of 2, 2, 1.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.counts().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn failed_batch_keeps_earlier_progress() {
        let store = store_with_pending(5).await;
        // First batch succeeds, second fails.
        let provider = Arc::new(CountingProvider::failing_from(2));
        let coordinator = EmbeddingCoordinator::new(store.clone(), provider)
            .with_batch_size(2);

        let report = coordinator.backfill().await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.processed, 2);
        // The first batch stays committed; the rest remain pending.
        assert_eq!(store.counts().await.unwrap().pending, 3);
    }

    #[tokio::test]
    async fn response_count_mismatch_aborts_run() {
        let store = store_with_pending(3).await;
        let coordinator =
            EmbeddingCoordinator::new(store.clone(), Arc::new(ShortProvider)).with_batch_size(3);

        let report = coordinator.backfill().await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.processed, 0);
        assert!(report.error.unwrap().contains("2 vectors for 3 inputs"));
        assert_eq!(store.counts().await.unwrap().pending, 3);
    }

    #[tokio::test]
    async fn empty_store_is_a_complete_noop() {
        let store = store_with_pending(0).await;
        let coordinator = EmbeddingCoordinator::new(store, Arc::new(CountingProvider::new()));
        let report = coordinator.backfill().await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.processed, 0);
    }
}
