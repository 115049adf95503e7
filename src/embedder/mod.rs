//! Embedding clients that turn text into fixed-length vectors.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

pub mod openai;

pub use openai::OpenAiEmbedder;

/// Converts text into embedding vectors.
///
/// Implementations return exactly one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds every input, splitting into provider-sized batches as needed.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single string.
    async fn embed_one(&self, input: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("embedding provider returned no embedding"))
    }
}
