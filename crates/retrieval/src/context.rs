//! Token-budgeted context assembly: turn ranked search hits into one string
//! ready to be pasted into a prompt.

use tracing::debug;

use recall_common::SourceType;

use crate::search::{Retriever, SearchHit, SearchOptions};

/// Rough character budget per token. An approximation for English-ish text,
/// good enough for prompt sizing.
pub const CHARS_PER_TOKEN: usize = 4;

pub const DEFAULT_CONTEXT_LIMIT: usize = 10;
pub const DEFAULT_MAX_TOKENS: usize = 2000;
pub const DEFAULT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub max_tokens: usize,
    /// Surplus candidate pool size handed to search.
    pub limit: usize,
    pub threshold: f32,
    pub separator: String,
    pub source_types: Option<Vec<SourceType>>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            limit: DEFAULT_CONTEXT_LIMIT,
            threshold: crate::search::DEFAULT_THRESHOLD,
            separator: DEFAULT_SEPARATOR.to_string(),
            source_types: None,
        }
    }
}

/// Provenance of one snippet that made it into the assembled text.
#[derive(Debug, Clone)]
pub struct ContextSource {
    pub knowledge_id: i64,
    pub source_type: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub text: String,
    pub sources: Vec<ContextSource>,
}

impl Retriever {
    /// Search with a surplus candidate pool, then greedily concatenate
    /// bodies best-similarity first until the character budget
    /// (`max_tokens * CHARS_PER_TOKEN`) would be exceeded.
    ///
    /// Assembly stops at the first candidate that does not fit; shorter
    /// candidates ranked after it are not tried, so the result is a prefix
    /// of the ranked list rather than a length-optimal subset.
    pub async fn get_context(
        &self,
        query: &str,
        options: &ContextOptions,
    ) -> anyhow::Result<AssembledContext> {
        let hits = self
            .search(
                query,
                &SearchOptions {
                    limit: options.limit,
                    threshold: options.threshold,
                    source_types: options.source_types.clone(),
                },
            )
            .await?;

        let budget = options.max_tokens * CHARS_PER_TOKEN;
        let assembled = assemble(&hits, budget, &options.separator);
        debug!(
            candidates = hits.len(),
            used = assembled.sources.len(),
            chars = assembled.text.len(),
            "assembled context"
        );
        Ok(assembled)
    }
}

fn assemble(hits: &[SearchHit], budget: usize, separator: &str) -> AssembledContext {
    let mut out = AssembledContext::default();

    for hit in hits {
        let body = hit.record.processed_content.as_str();
        let needed = if out.text.is_empty() {
            body.len()
        } else {
            separator.len() + body.len()
        };
        if out.text.len() + needed > budget {
            break;
        }
        if !out.text.is_empty() {
            out.text.push_str(separator);
        }
        out.text.push_str(body);
        out.sources.push(ContextSource {
            knowledge_id: hit.record.id,
            source_type: hit.record.source_type.clone(),
            similarity: hit.similarity,
        });
    }

    out
}
