//! Ingestion pipeline: normalize, embed, and upsert text items.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::{IngestMode, IngestSettings};
use crate::embedder::Embedder;
use crate::embeddings::{EmbeddedText, EmbeddingRecord};
use crate::validation::TextItem;
use crate::vector_store::VectorIndex;

/// Canonical form used for stored text and, optionally, questions.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Embeds `items` and writes one new record per item to `index`.
///
/// Records are additive: identical text ingested twice is stored twice.
/// In [`IngestMode::Sequential`] a failure leaves earlier items written.
pub async fn ingest(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    settings: &IngestSettings,
    items: Vec<TextItem>,
) -> Result<Vec<EmbeddedText>> {
    let texts: Vec<String> = items
        .into_iter()
        .map(|item| {
            if settings.normalize {
                normalize_text(&item.text)
            } else {
                item.text
            }
        })
        .collect();
    let embedded = match settings.mode {
        IngestMode::Batched => ingest_batched(embedder, index, texts).await?,
        IngestMode::Sequential => ingest_sequential(embedder, index, texts).await?,
    };
    info!(items = embedded.len(), mode = ?settings.mode, "ingested text items");
    Ok(embedded)
}

async fn ingest_batched(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    texts: Vec<String>,
) -> Result<Vec<EmbeddedText>> {
    let vectors = embedder.embed(&texts).await?;
    anyhow::ensure!(
        vectors.len() == texts.len(),
        "embedding provider returned {} vectors for {} inputs",
        vectors.len(),
        texts.len()
    );
    let records: Vec<EmbeddingRecord> = texts
        .into_iter()
        .zip(vectors)
        .map(|(text, values)| EmbeddingRecord::new(text, values))
        .collect();
    let embedded = records
        .iter()
        .map(|record| EmbeddedText {
            text: record.metadata.text.clone(),
            embedding: record.values.clone(),
        })
        .collect();
    index.upsert(records).await?;
    Ok(embedded)
}

async fn ingest_sequential(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    texts: Vec<String>,
) -> Result<Vec<EmbeddedText>> {
    let total = texts.len();
    let mut embedded = Vec::with_capacity(total);
    for (idx, text) in texts.into_iter().enumerate() {
        let record = match embedder.embed_one(&text).await {
            Ok(values) => EmbeddingRecord::new(text, values),
            Err(err) => {
                warn!(item = idx, written = embedded.len(), total, "embedding failed mid-batch");
                return Err(err);
            }
        };
        let result = EmbeddedText {
            text: record.metadata.text.clone(),
            embedding: record.values.clone(),
        };
        if let Err(err) = index.upsert(vec![record]).await {
            warn!(item = idx, written = embedded.len(), total, "upsert failed mid-batch");
            return Err(err);
        }
        embedded.push(result);
    }
    Ok(embedded)
}
