//! Retry with exponential backoff and provider-suggested delays.

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{GenError, Result};
use crate::provider::http::HttpRequest;

/// Retry policy configuration.
///
/// One policy covers every backend: rate-limit responses (HTTP 429 or a
/// `RESOURCE_EXHAUSTED` error body) and transport faults are retried, any
/// other failure is returned as-is.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single sleep, hinted or computed.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Policy with a different attempt budget and default timings.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Execute an async operation with retry.
    ///
    /// Returns the first success. Retryable failures sleep and try again until
    /// `max_attempts` is spent, then surface as
    /// [`GenError::RateLimitExhausted`] or [`GenError::TransportExhausted`].
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.max_attempts == 0 {
            return Err(GenError::InvalidArgument(
                "retry policy must allow at least one attempt".to_string(),
            ));
        }

        let mut state = RetryState::new(self);

        loop {
            state.attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }
            if state.attempt >= self.max_attempts {
                return Err(exhausted(error, state.attempt));
            }

            let hint = match &error {
                GenError::RateLimited { retry_after_ms, .. } => {
                    retry_after_ms.map(Duration::from_millis)
                }
                _ => None,
            };
            let sleep = state.next_sleep(self, hint);

            warn!(
                attempt = state.attempt,
                max_attempts = self.max_attempts,
                delay_ms = sleep.as_millis() as u64,
                hinted = hint.is_some(),
                error = %error,
                "Retrying after error"
            );

            tokio::time::sleep(sleep).await;
        }
    }

    /// Perform an HTTP request under this policy.
    pub async fn send(
        &self,
        client: &reqwest::Client,
        request: &HttpRequest,
    ) -> Result<reqwest::Response> {
        self.execute(|| request.send_once(client)).await
    }

    /// Perform an HTTP request and read its body as text, both under this
    /// policy. A body that fails mid-read is retried like a transport fault.
    pub async fn send_text(&self, client: &reqwest::Client, request: &HttpRequest) -> Result<String> {
        self.execute(|| async move {
            let response = request.send_once(client).await?;
            Ok::<_, GenError>(response.text().await?)
        })
        .await
    }

    /// Like [`BackoffPolicy::send_text`], returning the response headers and raw bytes.
    pub async fn send_bytes(
        &self,
        client: &reqwest::Client,
        request: &HttpRequest,
    ) -> Result<(HeaderMap, Vec<u8>)> {
        self.execute(|| async move {
            let response = request.send_once(client).await?;
            let headers = response.headers().clone();
            let bytes = response.bytes().await?;
            Ok::<_, GenError>((headers, bytes.to_vec()))
        })
        .await
    }
}

fn exhausted(error: GenError, attempts: u32) -> GenError {
    match error {
        GenError::RateLimited { status, .. } => GenError::RateLimitExhausted { status, attempts },
        other => GenError::TransportExhausted {
            attempts,
            source: Box::new(other),
        },
    }
}

/// Per-call retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    delay: Duration,
    last_sleep: Duration,
}

impl RetryState {
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self {
            attempt: 0,
            delay: policy.initial_backoff.min(policy.max_backoff),
            last_sleep: Duration::ZERO,
        }
    }

    /// Attempts performed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The computed exponential delay for the next retry.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep to use before the next attempt, advancing the exponential delay.
    ///
    /// A provider hint replaces the computed delay for this one retry. The
    /// result is capped at `max_backoff` and never shorter than the previous
    /// sleep.
    pub fn next_sleep(&mut self, policy: &BackoffPolicy, hint: Option<Duration>) -> Duration {
        let candidate = hint.unwrap_or(self.delay).min(policy.max_backoff);
        let sleep = candidate.max(self.last_sleep);
        self.last_sleep = sleep;

        let grown = (self.delay.as_nanos() as f64 * policy.multiplier.max(1.0)).round();
        self.delay = Duration::from_nanos(grown.min(u64::MAX as f64) as u64).min(policy.max_backoff);

        sleep
    }
}

/// Provider-suggested retry delay (`google.rpc.RetryInfo.retryDelay`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryHint {
    /// Textual duration with a trailing `s` unit, e.g. `"22s"` or `"1.5s"`.
    Seconds(String),
    /// Split duration, as protobuf `Duration` is encoded in object form.
    Duration { seconds: i64, nanos: i64 },
    #[default]
    None,
}

#[derive(Deserialize)]
struct HintEnvelope {
    error: Option<HintError>,
}

#[derive(Deserialize)]
struct HintError {
    #[serde(default)]
    details: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRetryDelay {
    Text(String),
    Parts {
        #[serde(default)]
        seconds: Option<Value>,
        #[serde(default)]
        nanos: Option<Value>,
    },
}

impl RetryHint {
    /// Decode the hint from a provider error body. Anything unrecognised is `None`.
    pub fn from_error_body(body: &str) -> Self {
        serde_json::from_str::<HintEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.error)
            .map(|error| Self::from_details(&error.details))
            .unwrap_or_default()
    }

    /// Decode the hint from an `error.details` array.
    pub fn from_details(details: &[Value]) -> Self {
        details
            .iter()
            .find(|detail| {
                detail
                    .get("@type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.contains("RetryInfo"))
            })
            .and_then(|detail| detail.get("retryDelay"))
            .map(Self::from_value)
            .unwrap_or_default()
    }

    /// Decode a bare `retryDelay` value.
    pub fn from_value(value: &Value) -> Self {
        match RawRetryDelay::deserialize(value) {
            Ok(RawRetryDelay::Text(text)) => Self::Seconds(text),
            Ok(RawRetryDelay::Parts { seconds, nanos }) if seconds.is_some() || nanos.is_some() => {
                match (integer(seconds.as_ref()), integer(nanos.as_ref())) {
                    (Some(seconds), Some(nanos)) => Self::Duration { seconds, nanos },
                    _ => Self::None,
                }
            }
            _ => Self::None,
        }
    }

    /// The suggested delay, if the hint is present and well-formed.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Seconds(text) => {
                let seconds: f64 = text.trim().strip_suffix('s')?.trim().parse().ok()?;
                if !seconds.is_finite() || seconds < 0.0 {
                    return None;
                }
                Some(Duration::from_millis((seconds * 1000.0).round() as u64))
            }
            Self::Duration { seconds, nanos } => {
                if *seconds < 0 || *nanos < 0 {
                    return None;
                }
                let millis = (*seconds as u64)
                    .saturating_mul(1000)
                    .saturating_add((*nanos as u64).div_ceil(1_000_000));
                Some(Duration::from_millis(millis))
            }
            Self::None => None,
        }
    }

    pub fn delay_ms(&self) -> Option<u64> {
        self.delay()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Missing components count as zero; proto3 JSON may encode int64 as a string.
fn integer(value: Option<&Value>) -> Option<i64> {
    match value {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}
