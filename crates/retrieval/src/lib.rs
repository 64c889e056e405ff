//! Similarity search over the knowledge store and token-budgeted context
//! assembly for prompt construction.

pub mod context;
pub mod search;

pub use {
    context::{AssembledContext, ContextOptions, ContextSource},
    search::{Retriever, SearchHit, SearchOptions},
};
