use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ragchat::config::{LlmProviderKind, VectorBackend};
use ragchat::server::{self, AppState};
use ragchat::{
    telemetry, AnthropicChat, CompletionProvider, MemoryIndex, OpenAiChat, OpenAiEmbedder,
    PineconeConfig, PineconeIndex, ServerCli, VectorIndex,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // values already in the environment win over the file
    dotenvy::dotenv().ok();
    let cli = ServerCli::parse();
    telemetry::init(cli.log_format)?;

    let timeout = cli.http_timeout();
    let embedder = Arc::new(OpenAiEmbedder::new(
        cli.openai_api_key.clone(),
        cli.openai_base_url.clone(),
        cli.embedding_model.clone(),
        Some(cli.embedding_dimensions),
        timeout,
        cli.max_attempts,
        cli.embed_batch_size,
    )?);

    let index: Arc<dyn VectorIndex> = match cli.vector_backend {
        VectorBackend::Pinecone => Arc::new(PineconeIndex::new(PineconeConfig {
            api_key: cli.pinecone_api_key.clone(),
            index_name: cli.pinecone_index_name.clone(),
            index_host: cli.pinecone_index_host.clone(),
            controller_url: cli.pinecone_controller_url.clone(),
            namespace: cli.pinecone_namespace.clone(),
            timeout,
            max_attempts: cli.max_attempts,
        })?),
        VectorBackend::Memory => {
            warn!("using the in-memory vector index; stored text is lost on restart");
            Arc::new(MemoryIndex::new())
        }
    };

    let completer: Arc<dyn CompletionProvider> = match cli.llm_provider {
        LlmProviderKind::Openai => Arc::new(OpenAiChat::new(
            cli.openai_api_key.clone(),
            cli.openai_base_url.clone(),
            cli.chat_model.clone(),
            Some(cli.max_completion_tokens),
            timeout,
            cli.max_attempts,
        )?),
        LlmProviderKind::Anthropic => Arc::new(AnthropicChat::new(
            cli.anthropic_api_key.clone(),
            cli.anthropic_model.clone(),
            cli.max_completion_tokens,
            timeout,
            cli.max_attempts,
        )?),
    };

    info!(
        embedding_model = %cli.embedding_model,
        dimensions = cli.embedding_dimensions,
        llm_provider = ?cli.llm_provider,
        vector_backend = ?cli.vector_backend,
        "starting ragchat API"
    );
    let state = AppState::new(embedder, index, completer)
        .with_ingest_settings(cli.ingest_settings())
        .with_retrieval_settings(cli.retrieval_settings())
        .with_query_cache(cli.embedding_cache_size);

    let addr = cli.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    server::serve(listener, server::router(state)).await
}
