//! Thresholded cosine-similarity search.

use std::sync::Arc;

use tracing::debug;

use {
    recall_common::SourceType,
    recall_embeddings::EmbeddingProvider,
    recall_store::{ContentStore, KnowledgeRow},
};

pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Candidate pool size K.
    pub limit: usize,
    /// Minimum similarity a candidate must meet to be returned.
    pub threshold: f32,
    /// When set, only records from these sources are considered.
    pub source_types: Option<Vec<SourceType>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            threshold: DEFAULT_THRESHOLD,
            source_types: None,
        }
    }
}

/// A knowledge record with its similarity to the query, in `[-1, 1]` where
/// 1 means identical direction.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: KnowledgeRow,
    pub similarity: f32,
}

pub struct Retriever {
    store: Arc<dyn ContentStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(store: Arc<dyn ContentStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Embed the query and return the closest records.
    ///
    /// Ranking takes the top `limit` records by similarity first, then drops
    /// any of those that fall below `threshold`. A record ranked just outside
    /// the top `limit` is never considered, even when it would clear the
    /// threshold, so fewer than `limit` hits may come back. The query is
    /// assumed to come from the same embedding-model family as the corpus; a
    /// dimension mismatch is a caller error and surfaces from the store.
    pub async fn search(
        &self,
        query_text: &str,
        options: &SearchOptions,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let query = self.provider.embed(query_text).await?;
        let hits = self.ranked(&query, options.limit, options).await?;
        debug!(
            query_len = query_text.len(),
            hits = hits.len(),
            "similarity search complete"
        );
        Ok(hits)
    }

    /// Same ranking and threshold contract as [`search`](Self::search), but
    /// starting from an existing vector. `exclude_id` removes the record the
    /// vector came from; one extra candidate is requested to compensate, and
    /// the result is trimmed back to `limit`.
    pub async fn search_by_embedding(
        &self,
        query: &[f32],
        exclude_id: Option<i64>,
        options: &SearchOptions,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let overfetch = options.limit + usize::from(exclude_id.is_some());
        let mut hits = self.ranked(query, overfetch, options).await?;
        if let Some(id) = exclude_id {
            hits.retain(|hit| hit.record.id != id);
        }
        hits.truncate(options.limit);
        Ok(hits)
    }

    async fn ranked(
        &self,
        query: &[f32],
        limit: usize,
        options: &SearchOptions,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let scored = self
            .store
            .nearest(query, limit, options.source_types.as_deref())
            .await?;

        Ok(scored
            .into_iter()
            .map(|s| SearchHit {
                similarity: 1.0 - s.distance,
                record: s.record,
            })
            .filter(|hit| hit.similarity >= options.threshold)
            .collect())
    }
}
