//! Shared HTTP client construction, request descriptors, and status mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::error::{GenError, Result};
use crate::util::retry::RetryHint;

/// Default per-request timeout for the shared client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the HTTP client a [`crate::Studio`] owns.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()?)
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = json_headers();
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Headers for an unauthenticated JSON API.
pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

pub fn trim_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// A replayable request: target, method, headers and body.
///
/// The backoff executor rebuilds the `reqwest` request from this descriptor on
/// every attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub provider: String,
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Overrides the client-wide timeout for this request.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(provider: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// POST with a JSON body.
    pub fn post_json(
        provider: impl Into<String>,
        url: impl Into<String>,
        body: &serde_json::Value,
    ) -> Result<Self> {
        let mut request = Self::new(provider, Method::POST, url);
        request.headers = json_headers();
        request.body = Some(serde_json::to_vec(body)?);
        Ok(request)
    }

    pub fn get(provider: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(provider, Method::GET, url)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Perform exactly one attempt, mapping non-success statuses to errors.
    pub async fn send_once(&self, client: &reqwest::Client) -> Result<reqwest::Response> {
        debug!(provider = %self.provider, method = %self.method, "Sending request");

        let mut builder = client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        check_status(&self.provider, response).await
    }
}

/// Pass successful responses through; turn everything else into a [`GenError`].
pub async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(status_to_error(provider, status, &body))
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorPayload>,
}

/// `error` is an object for Google APIs and a bare string for Hugging Face.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Structured {
        status: Option<String>,
        message: Option<String>,
    },
    Message(String),
}

/// Map a failed HTTP status and body to an error.
///
/// 429 and Google's `RESOURCE_EXHAUSTED` quota status are rate limits; the
/// provider's retry hint, if any, travels with the error.
pub fn status_to_error(provider: &str, status: u16, body: &str) -> GenError {
    let payload = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error);

    let quota_exhausted = matches!(
        &payload,
        Some(ErrorPayload::Structured { status: Some(s), .. }) if s == "RESOURCE_EXHAUSTED"
    );

    if status == 429 || quota_exhausted {
        return GenError::RateLimited {
            status,
            retry_after_ms: RetryHint::from_error_body(body).delay_ms(),
        };
    }

    let message = match payload {
        Some(ErrorPayload::Structured {
            message: Some(message),
            ..
        })
        | Some(ErrorPayload::Message(message)) => message,
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => truncate(body.trim(), 500),
    };

    GenError::provider(provider, status, message)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
