//! Anthropic messages client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, CompletionProvider, Role};
use crate::upstream;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Completion provider backed by the Anthropic messages API.
pub struct AnthropicChat {
    client: Client,
    model: String,
    max_tokens: usize,
    has_key: bool,
    max_attempts: usize,
}

impl AnthropicChat {
    /// Builds the client; an empty key fails on first call.
    pub fn new(
        api_key: String,
        model: String,
        max_tokens: usize,
        timeout: Duration,
        max_attempts: usize,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let has_key = !api_key.trim().is_empty();
        if has_key {
            headers.insert(
                HeaderName::from_static("x-api-key"),
                HeaderValue::from_str(api_key.trim()).context("invalid Anthropic API key")?,
            );
        }
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static("2023-06-01"),
        );
        let client = upstream::build_client("Anthropic", timeout, headers)?;
        Ok(Self {
            client,
            model,
            max_tokens: max_tokens.max(1),
            has_key,
            max_attempts: max_attempts.max(1),
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        anyhow::ensure!(self.has_key, "ANTHROPIC_API_KEY is not configured");
        let body = AnthropicRequest::from_messages(&self.model, self.max_tokens, messages);
        let parsed: AnthropicResponse = upstream::send_json(
            &self.client,
            Method::POST,
            MESSAGES_URL,
            Some(&body),
            self.max_attempts,
            "Anthropic messages",
        )
        .await?;
        Ok(parsed.into_answer())
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
}

impl<'a> AnthropicRequest<'a> {
    /// Anthropic takes the system prompt as a top-level field, not a message.
    fn from_messages(model: &'a str, max_tokens: usize, messages: &'a [ChatMessage]) -> Self {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let turns = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage {
                role: if m.role == Role::Assistant {
                    "assistant"
                } else {
                    "user"
                },
                content: &m.content,
            })
            .collect();
        Self {
            model,
            max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: turns,
        }
    }
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicResponseBlock>,
}

impl AnthropicResponse {
    fn into_answer(self) -> Option<String> {
        let answer = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        (!answer.is_empty()).then_some(answer)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
