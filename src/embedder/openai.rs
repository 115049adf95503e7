//! OpenAI-based embedding client implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;
use crate::upstream;

/// Embeddings client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    has_key: bool,
    max_attempts: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a new OpenAI embeddings client.
    ///
    /// An empty `api_key` is accepted here; calls made with it fail instead.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_attempts: usize,
        batch_size: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");
        let mut headers = HeaderMap::new();
        let has_key = !api_key.trim().is_empty();
        if has_key {
            let auth = format!("Bearer {}", api_key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
            );
        }
        let client = upstream::build_client("OpenAI", timeout, headers)?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimensions,
            has_key,
            max_attempts: max_attempts.max(1),
            batch_size: batch_size.max(1),
        })
    }

    /// Sends one batch of strings to OpenAI and returns embedding vectors.
    pub async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        anyhow::ensure!(self.has_key, "OPENAI_API_KEY is not configured");
        anyhow::ensure!(
            inputs.len() <= self.batch_size,
            "batch of {} exceeds configured max {}",
            inputs.len(),
            self.batch_size
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        let mut parsed: EmbeddingResponse = upstream::send_json(
            &self.client,
            Method::POST,
            &self.endpoint,
            Some(&request),
            self.max_attempts,
            "OpenAI embeddings",
        )
        .await?;
        parsed.data.sort_by_key(|entry| entry.index);
        anyhow::ensure!(
            parsed.data.len() == inputs.len(),
            "OpenAI returned {} embeddings for {} inputs",
            parsed.data.len(),
            inputs.len()
        );
        if let Some(expected) = self.dimensions {
            if let Some(entry) = parsed.data.iter().find(|e| e.embedding.len() != expected) {
                anyhow::bail!(
                    "OpenAI returned a {}-dimension embedding; expected {}",
                    entry.embedding.len(),
                    expected
                );
            }
        }
        Ok(parsed
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            debug!(inputs = refs.len(), model = %self.model, "requesting embeddings");
            out.extend(self.embed_batch(&refs).await?);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
