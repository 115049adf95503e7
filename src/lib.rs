#![warn(missing_docs)]
//! Core library for the ragchat retrieval-augmented chat backend.

pub mod completion;
pub mod config;
pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod retrieval;
pub mod server;
pub mod telemetry;
mod upstream;
pub mod validation;
pub mod vector_store;

pub use completion::{AnthropicChat, ChatMessage, CompletionProvider, OpenAiChat, Role};
pub use config::{
    ContextStyle, EmptyContextFallback, IngestMode, IngestSettings, RetrievalSettings, ServerCli,
};
pub use embedder::{Embedder, OpenAiEmbedder};
pub use embeddings::{EmbeddedText, EmbeddingRecord, Match, RecordMetadata};
pub use error::{ApiError, ErrorBody};
pub use server::{router, AppState, ChatReply, EmbedResponse};
pub use validation::{ChatQuery, InvalidInput, TextItem};
pub use vector_store::{MemoryIndex, PineconeConfig, PineconeIndex, VectorIndex};
