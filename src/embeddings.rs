//! Shared embedding data structures used by ingestion, retrieval, and vector stores.

use serde::{Deserialize, Serialize};

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Text the vector was computed from (normalized when normalization is on).
    pub text: String,
}

/// Unit persisted in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Random identifier, unique across the index.
    pub id: String,
    /// Model embedding vector.
    pub values: Vec<f32>,
    /// Attached metadata.
    pub metadata: RecordMetadata,
}

impl EmbeddingRecord {
    /// Creates a record with a fresh UUIDv4 identifier.
    pub fn new(text: String, values: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            values,
            metadata: RecordMetadata { text },
        }
    }
}

/// Nearest-neighbor result returned by a vector index query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Record identifier.
    #[serde(default)]
    pub id: String,
    /// Similarity score; higher is closer.
    pub score: f32,
    /// Stored metadata, when the index returned it.
    #[serde(default)]
    pub metadata: Option<RecordMetadata>,
}

impl Match {
    /// Stored text, if present and non-empty.
    pub fn text(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .map(|meta| meta.text.as_str())
            .filter(|text| !text.is_empty())
    }
}

/// Per-item result of an ingestion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedText {
    /// Text as embedded and stored.
    pub text: String,
    /// Vector written to the index.
    pub embedding: Vec<f32>,
}
