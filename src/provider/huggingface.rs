//! Hugging Face Inference API text-to-image provider.

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use tracing::{debug, info};

use crate::config::HUGGINGFACE;
use crate::error::{GenError, Result};
use crate::types::{data_uri, Backend, GenerationRequest, GenerationResult};
use crate::util::retry::BackoffPolicy;

use super::http::{bearer_headers, trim_trailing_slash, HttpRequest};
use super::GenerationProvider;

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";

/// Posts `{ "inputs": prompt }` and receives raw image bytes.
#[derive(Debug, Clone)]
pub struct HuggingFaceImageProvider {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
    model: String,
    retry_policy: BackoffPolicy,
}

impl HuggingFaceImageProvider {
    pub fn new(client: reqwest::Client, api_token: String) -> Self {
        Self {
            client,
            api_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retry_policy: BackoffPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: BackoffPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}", trim_trailing_slash(&self.base_url), self.model)
    }

    /// Generate an image and return its raw bytes and MIME type.
    pub async fn generate_bytes(&self, prompt: &str) -> Result<(Vec<u8>, String)> {
        if self.api_token.trim().is_empty() {
            return Err(GenError::Configuration(
                "Hugging Face API token is not configured. Set HUGGINGFACE_API_KEY and restart."
                    .to_string(),
            ));
        }

        let request = HttpRequest::post_json(HUGGINGFACE, self.endpoint(), &json!({ "inputs": prompt }))?
            .with_headers(bearer_headers(&self.api_token));

        debug!(model = %self.model, "Hugging Face text-to-image");

        let (headers, bytes) = self.retry_policy.send_bytes(&self.client, &request).await?;
        let mime_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| "image/png".to_string());

        if bytes.is_empty() {
            return Err(GenError::malformed("Hugging Face returned an empty image body"));
        }

        Ok((bytes, mime_type))
    }
}

#[async_trait]
impl GenerationProvider for HuggingFaceImageProvider {
    fn name(&self) -> &str {
        HUGGINGFACE
    }

    fn backend(&self) -> Backend {
        Backend::Image
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let (bytes, mime_type) = self.generate_bytes(request.prompt()).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        info!(model = %self.model, size = bytes.len(), "Hugging Face image generated");

        Ok(GenerationResult::Image {
            url: data_uri(&mime_type, &encoded),
        })
    }
}
