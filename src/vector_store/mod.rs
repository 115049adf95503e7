//! Vector index clients: the only persistent store behind the chat backend.

use anyhow::Result;
use async_trait::async_trait;

use crate::embeddings::{EmbeddingRecord, Match};

pub mod memory;
pub mod pinecone;

pub use memory::MemoryIndex;
pub use pinecone::{PineconeConfig, PineconeIndex};

/// Stores vectors with metadata and answers nearest-neighbor queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces records keyed by id.
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<()>;

    /// Returns up to `top_k` matches ordered by descending score, metadata included.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>>;
}
