//! Shared HTTP plumbing for the managed services this backend calls.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Builds a JSON client with the provided default headers.
pub(crate) fn build_client(
    service: &str,
    timeout: Duration,
    mut headers: HeaderMap,
) -> Result<Client> {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .with_context(|| format!("failed to build {service} HTTP client"))
}

/// Sends a JSON request and decodes a JSON response, retrying transient
/// failures until `max_attempts` calls have been made.
pub(crate) async fn send_json<B, R>(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<&B>,
    max_attempts: usize,
    label: &str,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0usize;
    loop {
        let mut request = client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return resp
                        .json::<R>()
                        .await
                        .with_context(|| format!("failed to parse {label} response"));
                }
                let body = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt + 1 < max_attempts {
                    attempt += 1;
                    warn!(%status, attempt, "{label} request failed; retrying");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                anyhow::bail!("{label} request failed ({status}): {body}");
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt + 1 < max_attempts {
                    attempt += 1;
                    debug!(error = %err, attempt, "{label} transport error; retrying");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return Err(anyhow::Error::new(err).context(format!("{label} request failed")));
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}
