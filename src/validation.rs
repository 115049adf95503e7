//! Request-shape checks run before any upstream call.
//!
//! Bodies arrive as untyped JSON; every malformed shape maps to one
//! descriptive 400.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message returned for any malformed `/embed` body.
pub const INVALID_ITEMS: &str =
    "Invalid input format, expected an array of objects with a 'text' field.";
/// Message returned for any malformed `/chat` body.
pub const INVALID_QUERY: &str = "Invalid query input";

/// Input unit for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextItem {
    /// Raw text; never empty once validated.
    pub text: String,
}

/// Question submitted to `/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatQuery {
    /// Caller's question, as sent.
    pub query: String,
}

/// Rejected request body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidInput(pub String);

/// Accepts a non-empty array of objects with a non-blank string `text`.
pub fn validate_items(body: &Value, max_items: usize) -> Result<Vec<TextItem>, InvalidInput> {
    let Some(items) = body.as_array() else {
        return Err(InvalidInput(INVALID_ITEMS.to_string()));
    };
    if items.is_empty() {
        return Err(InvalidInput(format!("{INVALID_ITEMS} The array is empty.")));
    }
    if items.len() > max_items {
        return Err(InvalidInput(format!(
            "{INVALID_ITEMS} Received {} items; the limit is {max_items}.",
            items.len()
        )));
    }
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| match item.get("text").and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => Ok(TextItem {
                text: text.to_string(),
            }),
            _ => Err(InvalidInput(format!(
                "{INVALID_ITEMS} Item {idx} has no non-empty string 'text'."
            ))),
        })
        .collect()
}

/// Accepts an object whose `query` is a non-blank string.
pub fn validate_query(body: &Value) -> Result<ChatQuery, InvalidInput> {
    match body.get("query").and_then(Value::as_str) {
        Some(query) if !query.trim().is_empty() => Ok(ChatQuery {
            query: query.to_string(),
        }),
        _ => Err(InvalidInput(INVALID_QUERY.to_string())),
    }
}
