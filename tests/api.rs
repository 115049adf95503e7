//! Router-level tests for the `/embed` and `/chat` endpoints.
//!
//! The three external collaborators are replaced with in-process fakes so the
//! tests observe exactly which upstream calls each request makes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use ragchat::{
    router, AppState, ChatMessage, ChatReply, CompletionProvider, EmbedResponse, Embedder,
    EmbeddingRecord, ErrorBody, IngestMode, IngestSettings, Match, MemoryIndex, RetrievalSettings,
    Role, VectorIndex,
};
use serde_json::{json, Value};
use tower::ServiceExt; // For oneshot()

const DIMENSIONS: usize = 512;
const STOPWORDS: &[&str] = &["what", "is", "your", "the", "a", "do", "you", "our"];

/// Bag-of-words embedder: each content word lights one hashed bucket.
#[derive(Default)]
struct HashEmbedder {
    calls: AtomicUsize,
    embedded: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
}

impl HashEmbedder {
    fn failing() -> Self {
        Self::failing_after(0)
    }

    fn failing_after(inputs: usize) -> Self {
        let embedder = Self::default();
        *embedder.fail_after.lock().unwrap() = Some(inputs);
        embedder
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut values = vec![0.0f32; DIMENSIONS];
        for word in text
            .split(|ch: char| !ch.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|word| !word.is_empty() && !STOPWORDS.contains(&word.as_str()))
        {
            values[bucket(&word)] += 1.0;
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        values
    }
}

fn bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMENSIONS as u64) as usize
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let before = self.embedded.fetch_add(inputs.len(), Ordering::SeqCst);
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            anyhow::ensure!(
                before + inputs.len() <= limit,
                "OpenAI embeddings request failed (503 Service Unavailable): upstream overloaded"
            );
        }
        Ok(inputs.iter().map(|text| Self::vector(text)).collect())
    }
}

/// Memory index that counts calls and can be told to fail.
#[derive(Default)]
struct CountingIndex {
    inner: MemoryIndex,
    upserts: AtomicUsize,
    queries: AtomicUsize,
    fail_upserts_after: Mutex<Option<usize>>,
    fail_queries: AtomicBool,
}

impl CountingIndex {
    fn fail_upserts_after(&self, accepted: usize) {
        *self.fail_upserts_after.lock().unwrap() = Some(accepted);
    }

    async fn stored_texts(&self) -> Vec<String> {
        self.inner
            .records()
            .await
            .into_iter()
            .map(|record| record.metadata.text)
            .collect()
    }
}

#[async_trait]
impl VectorIndex for CountingIndex {
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let before = self.upserts.fetch_add(1, Ordering::SeqCst);
        if let Some(accepted) = *self.fail_upserts_after.lock().unwrap() {
            anyhow::ensure!(
                before < accepted,
                "Pinecone upsert request failed (503 Service Unavailable): index write rejected"
            );
        }
        self.inner.upsert(records).await
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(
            !self.fail_queries.load(Ordering::SeqCst),
            "Pinecone query request failed (500 Internal Server Error): query timed out"
        );
        self.inner.query(vector, top_k).await
    }
}

/// Records every conversation and replies deterministically from it.
#[derive(Default)]
struct RecordingCompleter {
    conversations: Mutex<Vec<Vec<ChatMessage>>>,
    silent: AtomicBool,
    fail: AtomicBool,
}

impl RecordingCompleter {
    fn calls(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }

    fn last_user_message(&self) -> String {
        let conversations = self.conversations.lock().unwrap();
        let last = conversations.last().expect("no completion requested");
        last.iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .expect("no user message")
    }
}

#[async_trait]
impl CompletionProvider for RecordingCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        self.conversations.lock().unwrap().push(messages.to_vec());
        anyhow::ensure!(
            !self.fail.load(Ordering::SeqCst),
            "OpenAI chat completions request failed (401 Unauthorized): invalid api key"
        );
        if self.silent.load(Ordering::SeqCst) {
            return Ok(Some("   ".to_string()));
        }
        let user = messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.len())
            .unwrap_or_default();
        Ok(Some(format!("  answer from a {user}-byte prompt \n")))
    }
}

struct Harness {
    embedder: Arc<HashEmbedder>,
    index: Arc<CountingIndex>,
    completer: Arc<RecordingCompleter>,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        Self::build(HashEmbedder::default(), |state| state)
    }

    fn build(embedder: HashEmbedder, configure: impl FnOnce(AppState) -> AppState) -> Self {
        let embedder = Arc::new(embedder);
        let index = Arc::new(CountingIndex::default());
        let completer = Arc::new(RecordingCompleter::default());
        let state = AppState::new(embedder.clone(), index.clone(), completer.clone());
        let app = router(configure(state));
        Self {
            embedder,
            index,
            completer,
            app,
        }
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_raw(uri, serde_json::to_string(&body).unwrap()).await
    }

    async fn post_raw(&self, uri: &str, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn chat(&self, query: &str) -> (StatusCode, Value) {
        self.post("/chat", json!({ "query": query })).await
    }

    fn upstream_calls(&self) -> usize {
        self.embedder.calls()
            + self.index.upserts.load(Ordering::SeqCst)
            + self.index.queries.load(Ordering::SeqCst)
            + self.completer.calls()
    }
}

fn error_message(body: Value) -> String {
    serde_json::from_value::<ErrorBody>(body).unwrap().error
}

#[tokio::test]
async fn root_returns_greeting() {
    let harness = Harness::new();
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"Hello, World!");
}

#[tokio::test]
async fn embed_returns_one_vector_per_item() {
    let harness = Harness::new();
    let (status, body) = harness
        .post(
            "/embed",
            json!([
                {"text": "  Refund Policy: 30 days  "},
                {"text": "Store hours are 9 to 5"},
                {"text": "Shipping is free over $50"}
            ]),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let body: EmbedResponse = serde_json::from_value(body).unwrap();
    assert_eq!(body.message, "Texts embedded successfully");
    assert_eq!(body.embeddings.len(), 3);
    assert!(body.embeddings.iter().all(|e| e.embedding.len() == DIMENSIONS));
    assert_eq!(body.embeddings[0].text, "refund policy: 30 days");
    assert_eq!(
        harness.index.stored_texts().await,
        vec![
            "refund policy: 30 days",
            "store hours are 9 to 5",
            "shipping is free over $50"
        ]
    );
    assert_eq!(harness.embedder.calls(), 1);
    assert_eq!(harness.index.upserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_embed_payloads_are_rejected_before_upstream_calls() {
    let harness = Harness::new();
    for body in [
        json!({"text": "not an array"}),
        json!([]),
        json!([{"text": "fine"}, {"content": "no text field"}]),
        json!([{"text": 12}]),
        json!([{"text": ""}]),
    ] {
        let (status, response) = harness.post("/embed", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(error_message(response).starts_with("Invalid input format"));
    }

    let (status, response) = harness.post_raw("/embed", "[{\"text\":".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!error_message(response).is_empty());

    assert_eq!(harness.upstream_calls(), 0);
    assert!(harness.index.inner.is_empty().await);
}

#[tokio::test]
async fn embed_payload_limit_is_enforced() {
    let harness = Harness::build(HashEmbedder::default(), |state| {
        state.with_ingest_settings(IngestSettings {
            max_items: 2,
            ..IngestSettings::default()
        })
    });
    let (status, _) = harness
        .post("/embed", json!([{"text": "a"}, {"text": "b"}, {"text": "c"}]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(harness.upstream_calls(), 0);
}

#[tokio::test]
async fn invalid_chat_queries_make_no_upstream_calls() {
    let harness = Harness::new();
    for body in [
        json!({}),
        json!({"query": ""}),
        json!({"query": "   "}),
        json!({"query": 42}),
        json!({"question": "wrong field"}),
        json!(["what is your refund policy"]),
    ] {
        let (status, response) = harness.post("/chat", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(error_message(response), "Invalid query input");
    }
    assert_eq!(harness.upstream_calls(), 0);
}

#[tokio::test]
async fn chat_retrieves_matching_record_into_prompt() {
    let harness = Harness::new();
    let (status, _) = harness
        .post(
            "/embed",
            json!([
                {"text": "Refund policy"},
                {"text": "Store hours are nine to five on weekdays"}
            ]),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = harness.chat("What is your refund policy?").await;
    assert_eq!(status, StatusCode::OK);
    let reply: ChatReply = serde_json::from_value(body).unwrap();
    assert!(reply.response.starts_with("answer from a"));

    let prompt = harness.completer.last_user_message();
    assert_eq!(
        prompt,
        "Context:\nrefund policy\n\nQuestion: What is your refund policy?"
    );
    let conversations = harness.completer.conversations.lock().unwrap();
    assert_eq!(conversations[0][0].role, Role::System);
    assert_eq!(
        conversations[0][0].content,
        RetrievalSettings::default().system_prompt
    );
}

#[tokio::test]
async fn chat_without_relevant_context_still_answers() {
    let harness = Harness::new();
    let (status, body) = harness.chat("Do you sell gift cards?").await;
    assert_eq!(status, StatusCode::OK);
    let reply: ChatReply = serde_json::from_value(body).unwrap();
    assert!(!reply.response.is_empty());
    assert!(harness
        .completer
        .last_user_message()
        .starts_with("Context:\nNone found\n\n"));
}

#[tokio::test]
async fn best_match_fallback_uses_low_scoring_text() {
    let harness = Harness::build(HashEmbedder::default(), |state| {
        state.with_retrieval_settings(RetrievalSettings {
            empty_context: ragchat::EmptyContextFallback::BestMatch,
            ..RetrievalSettings::default()
        })
    });
    harness
        .post("/embed", json!([{"text": "Gift cards never expire and refunds take a week"}]))
        .await;

    let (status, _) = harness.chat("gift cards").await;
    assert_eq!(status, StatusCode::OK);
    assert!(harness
        .completer
        .last_user_message()
        .contains("gift cards never expire"));
}

#[tokio::test]
async fn empty_completion_returns_canned_reply() {
    let harness = Harness::new();
    harness.completer.silent.store(true, Ordering::SeqCst);
    let (status, body) = harness.chat("anything at all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"response": "Sorry, no appropriate response could be generated."})
    );
}

#[tokio::test]
async fn repeated_chat_is_idempotent() {
    let harness = Harness::new();
    harness
        .post("/embed", json!([{"text": "Refund policy"}]))
        .await;
    let (_, first) = harness.chat("What is your refund policy?").await;
    let (_, second) = harness.chat("What is your refund policy?").await;
    assert_eq!(first, second);
    assert_eq!(harness.embedder.calls(), 3);
}

#[tokio::test]
async fn query_cache_skips_repeat_embeddings() {
    let harness = Harness::build(HashEmbedder::default(), |state| state.with_query_cache(16));
    let (first, _) = harness.chat("What is your refund policy?").await;
    let (second, _) = harness.chat("  what is your REFUND policy?").await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(harness.embedder.calls(), 1);
    assert_eq!(harness.index.queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn embedding_failure_surfaces_as_500() {
    let harness = Harness::build(HashEmbedder::failing(), |state| state);

    let (status, body) = harness
        .post("/embed", json!([{"text": "refund policy"}, {"text": "hours"}]))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(body),
        "OpenAI embeddings request failed (503 Service Unavailable): upstream overloaded"
    );
    assert_eq!(harness.index.upserts.load(Ordering::SeqCst), 0);

    let (status, body) = harness.chat("refund policy").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(body).contains("503"));
    assert_eq!(harness.completer.calls(), 0);
}

#[tokio::test]
async fn sequential_ingest_failure_keeps_earlier_items() {
    let harness = Harness::build(HashEmbedder::failing_after(1), |state| {
        state.with_ingest_settings(IngestSettings {
            mode: IngestMode::Sequential,
            ..IngestSettings::default()
        })
    });
    let (status, body) = harness
        .post(
            "/embed",
            json!([{"text": "first"}, {"text": "second"}, {"text": "third"}]),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!error_message(body).is_empty());
    assert_eq!(harness.index.stored_texts().await, vec!["first"]);
    assert_eq!(harness.embedder.calls(), 2);
}

#[tokio::test]
async fn completion_failure_surfaces_as_500() {
    let harness = Harness::new();
    harness.completer.fail.store(true, Ordering::SeqCst);
    let (status, body) = harness.chat("refund policy").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(body),
        "OpenAI chat completions request failed (401 Unauthorized): invalid api key"
    );
}

#[tokio::test]
async fn sequential_index_write_failure_keeps_earlier_items() {
    let harness = Harness::build(HashEmbedder::default(), |state| {
        state.with_ingest_settings(IngestSettings {
            mode: IngestMode::Sequential,
            ..IngestSettings::default()
        })
    });
    harness.index.fail_upserts_after(1);
    let (status, body) = harness
        .post(
            "/embed",
            json!([{"text": "first"}, {"text": "second"}, {"text": "third"}]),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(body),
        "Pinecone upsert request failed (503 Service Unavailable): index write rejected"
    );
    assert_eq!(harness.index.stored_texts().await, vec!["first"]);
    assert_eq!(harness.index.upserts.load(Ordering::SeqCst), 2);
    assert_eq!(harness.embedder.calls(), 2);
}

#[tokio::test]
async fn batched_index_write_failure_stores_nothing() {
    let harness = Harness::new();
    harness.index.fail_upserts_after(0);
    let (status, body) = harness
        .post("/embed", json!([{"text": "refund policy"}, {"text": "hours"}]))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(body).contains("index write rejected"));
    assert!(harness.index.inner.is_empty().await);
    assert_eq!(harness.index.upserts.load(Ordering::SeqCst), 1);
    assert_eq!(harness.embedder.calls(), 1);
}

#[tokio::test]
async fn index_query_failure_skips_completion() {
    let harness = Harness::new();
    harness.index.fail_queries.store(true, Ordering::SeqCst);
    let (status, body) = harness.chat("What is your refund policy?").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(body),
        "Pinecone query request failed (500 Internal Server Error): query timed out"
    );
    assert_eq!(harness.index.queries.load(Ordering::SeqCst), 1);
    assert_eq!(harness.completer.calls(), 0);
}
