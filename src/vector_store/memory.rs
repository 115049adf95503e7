//! In-process vector index for local development and tests.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::VectorIndex;
use crate::embeddings::{EmbeddingRecord, Match};

/// Cosine-similarity index held in memory. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl MemoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the index holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of the stored records in insertion order.
    pub async fn records(&self) -> Vec<EmbeddingRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let mut guard = self.records.write().await;
        for record in records {
            match guard.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => guard.push(record),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        let guard = self.records.read().await;
        let mut matches: Vec<Match> = guard
            .iter()
            .filter(|record| record.values.len() == vector.len())
            .map(|record| Match {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: Some(record.metadata.clone()),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 when either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
