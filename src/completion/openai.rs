//! OpenAI chat completions client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, CompletionProvider};
use crate::upstream;

/// Completion provider backed by the OpenAI chat completions API.
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: Option<usize>,
    has_key: bool,
    max_attempts: usize,
}

impl OpenAiChat {
    /// Builds the client; an empty key fails on first call.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: Option<usize>,
        timeout: Duration,
        max_attempts: usize,
    ) -> Result<Self> {
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
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            max_tokens,
            has_key,
            max_attempts: max_attempts.max(1),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        anyhow::ensure!(self.has_key, "OPENAI_API_KEY is not configured");
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
        };
        let parsed: ChatResponse = upstream::send_json(
            &self.client,
            Method::POST,
            &self.endpoint,
            Some(&body),
            self.max_attempts,
            "OpenAI chat completions",
        )
        .await?;
        Ok(parsed.into_answer())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn into_answer(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_serializes_roles_lowercase() {
        let messages = [ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            max_tokens: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }

    #[test]
    fn first_choice_content_is_the_answer() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Refunds take 5 days."}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_answer().as_deref(), Some("Refunds take 5 days."));
    }

    #[test]
    fn null_content_and_no_choices_yield_none() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert_eq!(parsed.into_answer(), None);
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(parsed.into_answer(), None);
    }
}
