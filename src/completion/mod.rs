//! Chat completion providers used to answer questions.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod anthropic;
mod openai;

pub use anthropic::AnthropicChat;
pub use openai::OpenAiChat;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Deployment-level instruction.
    System,
    /// End-user turn.
    User,
    /// Model turn.
    Assistant,
}

/// One entry of the conversation sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Builds a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Builds a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Trait implemented by concrete LLM providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generates a reply for the conversation. `None` when the provider
    /// answered without any text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>>;
}
