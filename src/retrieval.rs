//! Question answering: embed the question, retrieve neighbors, assemble a
//! context-augmented prompt, and ask the completion provider.

use std::num::NonZeroUsize;

use anyhow::Result;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::completion::{ChatMessage, CompletionProvider};
use crate::config::{ContextStyle, EmptyContextFallback, RetrievalSettings, NO_CONTEXT};
use crate::embedder::Embedder;
use crate::embeddings::Match;
use crate::ingest::normalize_text;
use crate::validation::ChatQuery;
use crate::vector_store::VectorIndex;

/// LRU of question text to embedding, shared across requests.
pub struct QueryCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
}

impl QueryCache {
    /// Returns `None` for a zero capacity, which disables caching.
    pub fn new(capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|capacity| Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    async fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.inner.lock().await.get(key).cloned()
    }

    async fn put(&self, key: String, embedding: Vec<f32>) {
        self.inner.lock().await.put(key, embedding);
    }
}

/// Collaborators needed to answer a question.
pub struct Retriever<'a> {
    /// Embeds the question.
    pub embedder: &'a dyn Embedder,
    /// Supplies neighbors.
    pub index: &'a dyn VectorIndex,
    /// Writes the reply.
    pub completer: &'a dyn CompletionProvider,
    /// Optional query-embedding cache.
    pub cache: Option<&'a QueryCache>,
    /// Tuning knobs.
    pub settings: &'a RetrievalSettings,
}

impl Retriever<'_> {
    /// Runs the full pipeline and returns the reply text.
    pub async fn answer(&self, query: &ChatQuery) -> Result<String> {
        let search_text = if self.settings.normalize_query {
            normalize_text(&query.query)
        } else {
            query.query.clone()
        };
        let embedding = self.embed_query(search_text).await?;
        let matches = self.index.query(&embedding, self.settings.top_k).await?;
        let context = select_context(&matches, self.settings);
        info!(
            matches = matches.len(),
            above_threshold = matches
                .iter()
                .filter(|m| m.score > self.settings.score_threshold)
                .count(),
            "retrieved context"
        );
        let messages = build_messages(self.settings, &context, &query.query);
        let reply = self.completer.complete(&messages).await?;
        Ok(reply
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| self.settings.fallback_reply.clone()))
    }

    async fn embed_query(&self, text: String) -> Result<Vec<f32>> {
        if let Some(cache) = self.cache {
            if let Some(hit) = cache.get(&text).await {
                debug!("query embedding cache hit");
                return Ok(hit);
            }
        }
        let embedding = self.embedder.embed_one(&text).await?;
        if let Some(cache) = self.cache {
            cache.put(text, embedding.clone()).await;
        }
        Ok(embedding)
    }
}

/// Builds the context block from matches that clear the score threshold.
pub fn select_context(matches: &[Match], settings: &RetrievalSettings) -> String {
    let kept: Vec<&str> = matches
        .iter()
        .filter(|m| m.score > settings.score_threshold)
        .filter_map(Match::text)
        .collect();
    if kept.is_empty() {
        return match settings.empty_context {
            EmptyContextFallback::NoneFound => NO_CONTEXT.to_string(),
            EmptyContextFallback::BestMatch => matches
                .iter()
                .filter(|m| m.text().is_some())
                .max_by(|a, b| {
                    a.score
                        .partial_cmp(&b.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .and_then(Match::text)
                .unwrap_or(NO_CONTEXT)
                .to_string(),
        };
    }
    match settings.context_style {
        ContextStyle::Plain => kept.join("\n"),
        ContextStyle::Bulleted => kept
            .iter()
            .map(|text| format!("- {text}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Two-message conversation: the system instruction, then context plus question.
pub fn build_messages(settings: &RetrievalSettings, context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(settings.system_prompt.clone()),
        ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {question}")),
    ]
}
