//! Transport shared by the HTTP providers.

use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;
use warden_core::{Result, WardenError};

const DEFAULT_RETRY_AFTER_SECS: u64 = 30;
const MAX_ERROR_BODY_CHARS: usize = 300;
/// Socket-level bound per attempt. The router bounds the whole call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Send `request` and decode a successful JSON body into `T`.
pub(crate) async fn send_json<T: DeserializeOwned>(provider: &str, request: RequestBuilder) -> Result<T> {
    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() {
            WardenError::LlmProvider(format!("{provider} request timed out: {e}"))
        } else {
            WardenError::LlmProvider(e.to_string())
        }
    })?;

    let status = resp.status();
    if !status.is_success() {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = resp.text().await.unwrap_or_default();
        return Err(status_error(status, retry_after, &body));
    }

    resp.json::<T>()
        .await
        .map_err(|e| WardenError::LlmParse(format!("{provider} response body: {e}")))
}

/// Map a non-success status onto the error the router knows how to handle.
/// Messages start with `HTTP <code>` so transient codes are retried.
pub(crate) fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> WardenError {
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        StatusCode::TOO_MANY_REQUESTS => WardenError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        StatusCode::NOT_FOUND => WardenError::ModelNotFound(body),
        _ => WardenError::LlmProvider(format!("HTTP {status}: {body}")),
    }
}
