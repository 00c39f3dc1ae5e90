//! Gradio space client (connect-and-predict) and the space-backed media providers.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::{FLUX, ZEROSCOPE};
use crate::error::{GenError, Result};
use crate::types::{Backend, GenerationRequest, GenerationResult};
use crate::util::retry::BackoffPolicy;
use crate::util::timeout::with_timeout;

use super::http::{bearer_headers, json_headers, trim_trailing_slash, HttpRequest};
use super::media::extract_media_url;
use super::GenerationProvider;

/// Route prefix used by Gradio 4.x/5.x servers for the REST call API.
pub const DEFAULT_API_PREFIX: &str = "/gradio_api";
/// Spaces run on shared hardware; a prediction can take minutes.
pub const DEFAULT_PREDICT_TIMEOUT: Duration = Duration::from_secs(600);

/// Ordered prediction inputs.
///
/// Gradio's call API takes positional data. Named inputs keep their insertion
/// order so callers can describe parameters by name and still send them
/// positionally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictArgs {
    values: Vec<(Option<String>, Value)>,
}

impl PredictArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(mut self, value: impl Into<Value>) -> Self {
        self.values.push((None, value.into()));
        self
    }

    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((Some(name.into()), value.into()));
        self
    }

    /// Replace the value of an existing named input. Returns false if absent.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self
            .values
            .iter_mut()
            .find(|(n, _)| n.as_deref() == Some(name))
        {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Apply request parameters onto inputs with matching names.
    pub fn apply_overrides(&mut self, overrides: &Map<String, Value>) {
        for (name, value) in overrides {
            if !self.set(name, value.clone()) {
                debug!(parameter = %name, "Ignoring parameter unknown to this space");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .map(|(_, v)| v)
    }

    pub fn to_data(&self) -> Vec<Value> {
        self.values.iter().map(|(_, v)| v.clone()).collect()
    }
}

/// The `data` array a completed prediction returns.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictResult {
    pub data: Vec<Value>,
}

#[derive(Deserialize)]
struct CallResponse {
    event_id: String,
}

/// Client bound to one hosted space.
#[derive(Debug, Clone)]
pub struct GradioClient {
    client: reqwest::Client,
    space: String,
    base_url: String,
    api_prefix: String,
    token: Option<String>,
    timeout: Duration,
    retry_policy: BackoffPolicy,
}

impl GradioClient {
    /// Bind to a space by id (`owner/name`), resolving its hosted URL.
    pub fn connect(client: reqwest::Client, space: &str) -> Result<Self> {
        let base_url = space_url(space)?;
        Ok(Self::with_base_url(client, space, base_url))
    }

    /// Bind to a space served from an explicit URL.
    pub fn with_base_url(client: reqwest::Client, space: &str, base_url: impl Into<String>) -> Self {
        Self {
            client,
            space: space.to_string(),
            base_url: base_url.into(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            token: None,
            timeout: DEFAULT_PREDICT_TIMEOUT,
            retry_policy: BackoffPolicy::default(),
        }
    }

    /// Token for private or rate-limited spaces.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: BackoffPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        match &self.token {
            Some(token) => bearer_headers(token),
            None => json_headers(),
        }
    }

    fn call_url(&self, endpoint: &str) -> String {
        format!(
            "{}{}/call/{}",
            trim_trailing_slash(&self.base_url),
            trim_trailing_slash(&self.api_prefix),
            endpoint.trim_start_matches('/')
        )
    }

    /// Submit a prediction and wait for its completion event.
    pub async fn predict(&self, endpoint: &str, args: &PredictArgs) -> Result<PredictResult> {
        let call_url = self.call_url(endpoint);
        let request = HttpRequest::post_json(
            self.space.clone(),
            call_url.clone(),
            &json!({ "data": args.to_data() }),
        )?
        .with_headers(self.headers());

        debug!(space = %self.space, endpoint, "Submitting prediction");

        let body = self.retry_policy.send_text(&self.client, &request).await?;
        let call: CallResponse = serde_json::from_str(&body).map_err(|e| {
            GenError::malformed(format!("space {} returned no event id: {e}", self.space))
        })?;

        let results = HttpRequest::get(self.space.clone(), format!("{call_url}/{}", call.event_id))
            .with_headers(self.headers())
            .with_timeout(self.timeout);

        // The result stream is fetched and read under the same policy as the
        // submission; the overall wait is bounded by the prediction timeout.
        let results = &results;
        let data = with_timeout(
            self.timeout,
            self.retry_policy.execute(|| async move {
                let response = results.send_once(&self.client).await?;
                self.read_events(response).await
            }),
        )
        .await?;

        Ok(PredictResult { data })
    }

    async fn read_events(&self, response: reqwest::Response) -> Result<Vec<Value>> {
        let mut parser = EventParser::default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            buffer.extend_from_slice(&chunk?);

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = String::from_utf8_lossy(&raw);
                if let Some(event) = parser.feed_line(line.trim_end_matches(['\r', '\n'])) {
                    if let Some(data) = self.settle(event)? {
                        return Ok(data);
                    }
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer);
            if let Some(event) = parser.feed_line(line.trim_end_matches('\r')) {
                if let Some(data) = self.settle(event)? {
                    return Ok(data);
                }
            }
        }
        if let Some(event) = parser.finish() {
            if let Some(data) = self.settle(event)? {
                return Ok(data);
            }
        }

        Err(GenError::malformed(format!(
            "space {} closed the event stream without a result",
            self.space
        )))
    }

    /// `Some(data)` on completion, an error on failure, `None` to keep reading.
    fn settle(&self, event: SseEvent) -> Result<Option<Vec<Value>>> {
        match event.event.as_str() {
            "complete" => {
                let data: Value = serde_json::from_str(&event.data)?;
                match data {
                    Value::Array(items) => Ok(Some(items)),
                    other => Err(GenError::malformed(format!(
                        "space {} completed with non-array data: {other}",
                        self.space
                    ))),
                }
            }
            "error" => {
                let message = match serde_json::from_str::<Value>(&event.data) {
                    Ok(Value::String(s)) => s,
                    Ok(Value::Null) => "prediction failed".to_string(),
                    _ if event.data.trim().is_empty() => "prediction failed".to_string(),
                    _ => event.data.trim().to_string(),
                };
                Err(GenError::provider(self.space.clone(), 200, message))
            }
            other => {
                debug!(space = %self.space, event = other, "Prediction progress");
                Ok(None)
            }
        }
    }
}

/// Resolve `owner/name` to the space's `*.hf.space` host.
pub fn space_url(space: &str) -> Result<String> {
    let (owner, name) = space
        .split_once('/')
        .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
        .ok_or_else(|| {
            GenError::InvalidArgument(format!("space id must look like owner/name, got {space:?}"))
        })?;

    let host: String = format!("{owner}-{name}")
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    Ok(format!("https://{host}.hf.space"))
}

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Line-oriented server-sent events parser.
#[derive(Debug, Default)]
pub struct EventParser {
    event: Option<String>,
    data: Vec<String>,
}

impl EventParser {
    /// Feed one line (without its terminator). A blank line dispatches.
    pub fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.finish();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    /// Dispatch whatever is pending.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Seed in `0..1_000_000`, as the spaces' own UIs pick one.
pub fn random_seed() -> u64 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos(),
    );
    hasher.finish() % 1_000_000
}

fn seed_for(request: &GenerationRequest) -> u64 {
    request.parameter_u64("seed").unwrap_or_else(random_seed)
}

/// FLUX text-to-image space.
#[derive(Debug, Clone)]
pub struct FluxImageProvider {
    client: GradioClient,
}

impl FluxImageProvider {
    pub const SPACE: &'static str = "NihalGazi/FLUX-Unlimited";
    pub const ENDPOINT: &'static str = "/generate_image";

    pub fn new(client: GradioClient) -> Self {
        Self { client }
    }

    pub fn connect(http: reqwest::Client) -> Result<Self> {
        Ok(Self::new(GradioClient::connect(http, Self::SPACE)?))
    }

    /// Inputs in the order the space's form declares them.
    pub fn args(request: &GenerationRequest) -> PredictArgs {
        let mut args = PredictArgs::new()
            .named("prompt", request.prompt())
            .named("width", 1024)
            .named("height", 1024)
            .named("seed", seed_for(request))
            .named("randomize", true)
            .named("server_choice", "Google US Server");
        args.apply_overrides(request.parameters());
        args
    }
}

#[async_trait]
impl GenerationProvider for FluxImageProvider {
    fn name(&self) -> &str {
        FLUX
    }

    fn backend(&self) -> Backend {
        Backend::Image
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let result = self
            .client
            .predict(Self::ENDPOINT, &Self::args(request))
            .await?;
        let url = extract_media_url(&result.data)?;
        info!(space = %self.client.space(), "Image URL received");
        Ok(GenerationResult::Image { url })
    }
}

/// Zeroscope text-to-video space.
#[derive(Debug, Clone)]
pub struct ZeroscopeVideoProvider {
    client: GradioClient,
}

impl ZeroscopeVideoProvider {
    pub const SPACE: &'static str = "hysts/zeroscope-v2";
    pub const ENDPOINT: &'static str = "/run";

    pub fn new(client: GradioClient) -> Self {
        Self { client }
    }

    pub fn connect(http: reqwest::Client) -> Result<Self> {
        Ok(Self::new(GradioClient::connect(http, Self::SPACE)?))
    }

    /// Base inputs, plus guidance and frame size when `advanced` is set or
    /// any of those is given explicitly.
    pub fn args(request: &GenerationRequest) -> PredictArgs {
        let mut args = PredictArgs::new()
            .named("prompt", request.prompt())
            .named("seed", seed_for(request))
            .named("num_frames", 24)
            .named("num_inference_steps", 10);

        let advanced = request.parameter_bool("advanced").unwrap_or(false)
            || ["guidance_scale", "width", "height"]
                .iter()
                .any(|name| request.parameter(name).is_some());
        if advanced {
            args = args
                .named("guidance_scale", 7.5)
                .named("width", 576)
                .named("height", 320);
        }

        let mut overrides = request.parameters().clone();
        overrides.remove("advanced");
        args.apply_overrides(&overrides);
        args
    }
}

#[async_trait]
impl GenerationProvider for ZeroscopeVideoProvider {
    fn name(&self) -> &str {
        ZEROSCOPE
    }

    fn backend(&self) -> Backend {
        Backend::Video
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let result = self
            .client
            .predict(Self::ENDPOINT, &Self::args(request))
            .await?;
        let url = extract_media_url(&result.data)
            .map_err(|e| GenError::malformed(format!("No video URL returned from space: {e}")))?;
        info!(space = %self.client.space(), "Video URL received");
        Ok(GenerationResult::Video { url })
    }
}
