//! Pinecone data-plane client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::VectorIndex;
use crate::embeddings::{EmbeddingRecord, Match, RecordMetadata};
use crate::upstream;

const API_VERSION: &str = "2024-07";

/// Connection settings for a Pinecone index.
#[derive(Debug, Clone)]
pub struct PineconeConfig {
    /// Value for the `Api-Key` header.
    pub api_key: String,
    /// Index name, used to look up the data-plane host.
    pub index_name: String,
    /// Data-plane host; skips the control-plane lookup when set.
    pub index_host: Option<String>,
    /// Control-plane base URL.
    pub controller_url: String,
    /// Optional namespace for every upsert and query.
    pub namespace: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per call (1 disables retries).
    pub max_attempts: usize,
}

/// Vector index backed by a managed Pinecone index.
pub struct PineconeIndex {
    client: Client,
    config: PineconeConfig,
    host: OnceCell<String>,
}

impl PineconeIndex {
    /// Builds the client. Credentials and the index host are checked on first use.
    pub fn new(config: PineconeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.api_key.trim().is_empty() {
            headers.insert(
                HeaderName::from_static("api-key"),
                HeaderValue::from_str(config.api_key.trim()).context("invalid Pinecone API key")?,
            );
        }
        headers.insert(
            HeaderName::from_static("x-pinecone-api-version"),
            HeaderValue::from_static(API_VERSION),
        );
        let client = upstream::build_client("Pinecone", config.timeout, headers)?;
        let host = OnceCell::new_with(
            config
                .index_host
                .as_deref()
                .filter(|h| !h.trim().is_empty())
                .map(base_url),
        );
        Ok(Self {
            client,
            config,
            host,
        })
    }

    async fn host(&self) -> Result<&str> {
        anyhow::ensure!(
            !self.config.api_key.trim().is_empty(),
            "PINECONE_API_KEY is not configured"
        );
        let host = self
            .host
            .get_or_try_init(|| self.describe_index())
            .await?;
        Ok(host.as_str())
    }

    async fn describe_index(&self) -> Result<String> {
        let name = self.config.index_name.trim();
        anyhow::ensure!(!name.is_empty(), "PINECONE_INDEX_NAME is not configured");
        let url = format!(
            "{}/indexes/{}",
            self.config.controller_url.trim_end_matches('/'),
            name
        );
        let description: IndexDescription = upstream::send_json(
            &self.client,
            Method::GET,
            &url,
            None::<&()>,
            self.config.max_attempts,
            "Pinecone describe index",
        )
        .await?;
        let host = base_url(&description.host);
        info!(index = name, %host, "resolved Pinecone index host");
        Ok(host)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let host = self.host().await?;
        let expected = records.len();
        let request = UpsertRequest {
            vectors: &records,
            namespace: self.config.namespace.as_deref(),
        };
        let response: UpsertResponse = upstream::send_json(
            &self.client,
            Method::POST,
            &format!("{host}/vectors/upsert"),
            Some(&request),
            self.config.max_attempts,
            "Pinecone upsert",
        )
        .await?;
        debug!(
            upserted = response.upserted_count,
            expected, "Pinecone upsert complete"
        );
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        let host = self.host().await?;
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.config.namespace.as_deref(),
        };
        let response: QueryResponse = upstream::send_json(
            &self.client,
            Method::POST,
            &format!("{host}/query"),
            Some(&request),
            self.config.max_attempts,
            "Pinecone query",
        )
        .await?;
        Ok(response.into_matches())
    }
}

fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [EmbeddingRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

impl QueryResponse {
    fn into_matches(self) -> Vec<Match> {
        self.matches
            .into_iter()
            .map(|m| Match {
                id: m.id,
                score: m.score,
                metadata: m
                    .metadata
                    .and_then(|meta| meta.text)
                    .map(|text| RecordMetadata { text }),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<PineconeMetadata>,
}

#[derive(Debug, Deserialize)]
struct PineconeMetadata {
    #[serde(default)]
    text: Option<String>,
}
