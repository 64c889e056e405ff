//! Embedding generation for the knowledge store: a provider trait, an
//! OpenAI-compatible HTTP implementation, a coordinator that backfills
//! missing embeddings in sequential batches, and a bounded fire-and-forget
//! queue for inline ingestion.

pub mod coordinator;
pub mod openai;
pub mod provider;
pub mod queue;

pub use {
    coordinator::{BackfillReport, EmbeddingCoordinator},
    openai::OpenAiEmbeddingProvider,
    provider::EmbeddingProvider,
    queue::{EmbedJob, EmbeddingQueueHandle, spawn_queue},
};
