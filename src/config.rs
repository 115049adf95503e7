//! Server configuration: command-line flags with environment fallbacks, plus
//! the ingestion and retrieval knobs derived from them.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};

/// Instruction sent as the system message with every chat request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the AI chatbot of this website. Only answer based on the provided company knowledge and context. If unsure, still try to help using any relevant context retrieved.";
/// Reply used when the completion provider returns no text.
pub const DEFAULT_FALLBACK_REPLY: &str = "Sorry, no appropriate response could be generated.";
/// Context placeholder when retrieval finds nothing usable.
pub const NO_CONTEXT: &str = "None found";

/// How `/embed` talks to the embedding provider and the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IngestMode {
    /// Embed every item first, then write all records in one upsert.
    Batched,
    /// Embed and upsert one item at a time.
    Sequential,
}

/// Layout of the retrieved context block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContextStyle {
    /// Matches joined by newlines.
    Plain,
    /// Each match on its own `- ` prefixed line.
    Bulleted,
}

/// What the prompt carries when no match clears the score threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmptyContextFallback {
    /// The literal `None found`.
    NoneFound,
    /// The best match's text, whatever its score.
    BestMatch,
}

/// Completion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmProviderKind {
    /// OpenAI chat completions.
    Openai,
    /// Anthropic messages.
    Anthropic,
}

/// Vector index backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VectorBackend {
    /// Managed Pinecone index.
    Pinecone,
    /// Process-local index; data is lost on restart.
    Memory,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Knobs for the ingestion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    /// Trim and lowercase text before embedding and storing it.
    pub normalize: bool,
    /// Batched or per-item embedding and upserts.
    pub mode: IngestMode,
    /// Largest accepted `/embed` payload.
    pub max_items: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            normalize: true,
            mode: IngestMode::Batched,
            max_items: 256,
        }
    }
}

/// Knobs for retrieval and prompt assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    /// Trim and lowercase the question before embedding it.
    pub normalize_query: bool,
    /// Neighbors requested from the index.
    pub top_k: usize,
    /// Matches must score strictly above this to become context.
    pub score_threshold: f32,
    /// Context block layout.
    pub context_style: ContextStyle,
    /// Behavior when no match clears the threshold.
    pub empty_context: EmptyContextFallback,
    /// System message content.
    pub system_prompt: String,
    /// Reply when the completion comes back empty.
    pub fallback_reply: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            normalize_query: true,
            top_k: 5,
            score_threshold: 0.7,
            context_style: ContextStyle::Plain,
            empty_context: EmptyContextFallback::NoneFound,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

/// Command-line interface for the chat API server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ragchat-api",
    about = "HTTP API that embeds text into a vector index and answers questions from it"
)]
pub struct ServerCli {
    /// Interface to listen on.
    #[arg(long, env = "RAGCHAT_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// OpenAI API key used for embeddings (and completions with the openai provider).
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub openai_api_key: String,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(long, env = "RAGCHAT_OPENAI_BASE", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Embedding model identifier; ingestion and queries must share it.
    #[arg(long, env = "RAGCHAT_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Embedding dimensionality; must match the index.
    #[arg(long, env = "RAGCHAT_EMBEDDING_DIMENSIONS", default_value_t = 512)]
    pub embedding_dimensions: usize,

    /// Max inputs per embedding request.
    #[arg(long, env = "RAGCHAT_EMBED_BATCH", default_value_t = 64)]
    pub embed_batch_size: usize,

    /// Completion backend.
    #[arg(long, env = "RAGCHAT_LLM_PROVIDER", value_enum, default_value_t = LlmProviderKind::Openai)]
    pub llm_provider: LlmProviderKind,

    /// OpenAI chat model.
    #[arg(long, env = "RAGCHAT_CHAT_MODEL", default_value = "gpt-3.5-turbo")]
    pub chat_model: String,

    /// Anthropic API key (used with --llm-provider anthropic).
    #[arg(long, env = "ANTHROPIC_API_KEY", default_value = "", hide_env_values = true)]
    pub anthropic_api_key: String,

    /// Anthropic model identifier.
    #[arg(long, env = "RAGCHAT_ANTHROPIC_MODEL", default_value = "claude-3-haiku-20240307")]
    pub anthropic_model: String,

    /// Maximum tokens requested from the completion model.
    #[arg(long, env = "RAGCHAT_MAX_COMPLETION_TOKENS", default_value_t = 512)]
    pub max_completion_tokens: usize,

    /// Vector index backend.
    #[arg(long, env = "RAGCHAT_VECTOR_BACKEND", value_enum, default_value_t = VectorBackend::Pinecone)]
    pub vector_backend: VectorBackend,

    /// Pinecone API key.
    #[arg(long, env = "PINECONE_API_KEY", default_value = "", hide_env_values = true)]
    pub pinecone_api_key: String,

    /// Pinecone index name.
    #[arg(long, env = "PINECONE_INDEX_NAME", default_value = "")]
    pub pinecone_index_name: String,

    /// Pinecone data-plane host; looked up from the index name when unset.
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pub pinecone_index_host: Option<String>,

    /// Pinecone control-plane URL.
    #[arg(long, env = "RAGCHAT_PINECONE_CONTROLLER", default_value = "https://api.pinecone.io")]
    pub pinecone_controller_url: String,

    /// Pinecone namespace.
    #[arg(long, env = "PINECONE_NAMESPACE")]
    pub pinecone_namespace: Option<String>,

    /// Neighbors fetched per question.
    #[arg(long, env = "RAGCHAT_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Minimum similarity score (exclusive) for a match to become context.
    #[arg(long, env = "RAGCHAT_SCORE_THRESHOLD", default_value_t = 0.7)]
    pub score_threshold: f32,

    /// Trim and lowercase ingested text.
    #[arg(long, env = "RAGCHAT_NORMALIZE_TEXT", default_value_t = true, action = ArgAction::Set)]
    pub normalize_text: bool,

    /// Trim and lowercase questions before embedding.
    #[arg(long, env = "RAGCHAT_NORMALIZE_QUERY", default_value_t = true, action = ArgAction::Set)]
    pub normalize_query: bool,

    /// Ingestion strategy.
    #[arg(long, env = "RAGCHAT_INGEST_MODE", value_enum, default_value_t = IngestMode::Batched)]
    pub ingest_mode: IngestMode,

    /// Context block layout.
    #[arg(long, env = "RAGCHAT_CONTEXT_STYLE", value_enum, default_value_t = ContextStyle::Plain)]
    pub context_style: ContextStyle,

    /// Context used when nothing clears the score threshold.
    #[arg(long, env = "RAGCHAT_EMPTY_CONTEXT", value_enum, default_value_t = EmptyContextFallback::NoneFound)]
    pub empty_context: EmptyContextFallback,

    /// System instruction for the completion model.
    #[arg(long, env = "RAGCHAT_SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    /// Largest accepted `/embed` payload.
    #[arg(long, env = "RAGCHAT_MAX_ITEMS", default_value_t = 256)]
    pub max_items_per_request: usize,

    /// Max cached query embeddings kept in memory (0 disables caching).
    #[arg(long, env = "RAGCHAT_EMBEDDING_CACHE", default_value_t = 1024)]
    pub embedding_cache_size: usize,

    /// Seconds before upstream requests time out.
    #[arg(long, env = "RAGCHAT_HTTP_TIMEOUT_SECS", default_value_t = 60)]
    pub http_timeout_secs: u64,

    /// Attempts per upstream call; 1 disables retries.
    #[arg(long, env = "RAGCHAT_MAX_ATTEMPTS", default_value_t = 1)]
    pub max_attempts: usize,

    /// Log output format.
    #[arg(long, env = "RAGCHAT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl ServerCli {
    /// Socket address the server binds.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Upstream request timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// Ingestion knobs.
    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            normalize: self.normalize_text,
            mode: self.ingest_mode,
            max_items: self.max_items_per_request.max(1),
        }
    }

    /// Retrieval knobs.
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            normalize_query: self.normalize_query,
            top_k: self.top_k.max(1),
            score_threshold: self.score_threshold,
            context_style: self.context_style,
            empty_context: self.empty_context,
            system_prompt: self.system_prompt.clone(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}
