//! HTTP surface: routes, shared state, and request handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::completion::CompletionProvider;
use crate::config::{IngestSettings, RetrievalSettings};
use crate::embedder::Embedder;
use crate::embeddings::EmbeddedText;
use crate::error::ApiError;
use crate::ingest::ingest;
use crate::retrieval::{QueryCache, Retriever};
use crate::validation::{self, InvalidInput, INVALID_ITEMS, INVALID_QUERY};
use crate::vector_store::VectorIndex;

const GREETING: &str = "Hello, World!";
const EMBED_SUCCESS: &str = "Texts embedded successfully";

/// Client handles and settings shared by every request.
#[derive(Clone)]
pub struct AppState {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    completer: Arc<dyn CompletionProvider>,
    query_cache: Option<Arc<QueryCache>>,
    ingest: Arc<IngestSettings>,
    retrieval: Arc<RetrievalSettings>,
}

impl AppState {
    /// State with default settings and no query cache.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        completer: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            embedder,
            index,
            completer,
            query_cache: None,
            ingest: Arc::new(IngestSettings::default()),
            retrieval: Arc::new(RetrievalSettings::default()),
        }
    }

    /// Replaces the ingestion settings.
    pub fn with_ingest_settings(mut self, settings: IngestSettings) -> Self {
        self.ingest = Arc::new(settings);
        self
    }

    /// Replaces the retrieval settings.
    pub fn with_retrieval_settings(mut self, settings: RetrievalSettings) -> Self {
        self.retrieval = Arc::new(settings);
        self
    }

    /// Caches up to `capacity` query embeddings (0 disables).
    pub fn with_query_cache(mut self, capacity: usize) -> Self {
        self.query_cache = QueryCache::new(capacity).map(Arc::new);
        self
    }

    fn retriever(&self) -> Retriever<'_> {
        Retriever {
            embedder: self.embedder.as_ref(),
            index: self.index.as_ref(),
            completer: self.completer.as_ref(),
            cache: self.query_cache.as_deref(),
            settings: &self.retrieval,
        }
    }
}

/// Successful `/embed` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedResponse {
    /// Fixed confirmation text.
    pub message: String,
    /// One entry per ingested item, in request order.
    pub embeddings: Vec<EmbeddedText>,
}

/// Successful `/chat` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Model reply or the canned fallback.
    pub response: String,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/embed", post(embed_handler))
        .route("/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `app` on `listener` until Ctrl-C or SIGTERM.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, "ragchat API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")
}

async fn root() -> &'static str {
    GREETING
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn embed_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let Json(body) =
        payload.map_err(|rejection| InvalidInput(format!("{INVALID_ITEMS} {}", rejection.body_text())))?;
    let items = validation::validate_items(&body, state.ingest.max_items)?;
    let embeddings = ingest(
        state.embedder.as_ref(),
        state.index.as_ref(),
        &state.ingest,
        items,
    )
    .await?;
    Ok(Json(EmbedResponse {
        message: EMBED_SUCCESS.to_string(),
        embeddings,
    }))
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(body) =
        payload.map_err(|rejection| InvalidInput(format!("{INVALID_QUERY}: {}", rejection.body_text())))?;
    let query = validation::validate_query(&body)?;
    let response = state.retriever().answer(&query).await?;
    Ok(Json(ChatReply { response }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
