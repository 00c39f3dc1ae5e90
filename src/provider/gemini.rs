//! Google Gemini `generateContent` provider: grounded articles and images.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::GEMINI;
use crate::error::{GenError, Result};
use crate::types::{data_uri, Backend, GenerationRequest, GenerationResult, Source};
use crate::util::retry::BackoffPolicy;

use super::http::{trim_trailing_slash, HttpRequest};
use super::GenerationProvider;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const ARTICLE_MODEL: &str = "gemini-2.5-flash-preview-09-2025";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Asks for raw article HTML with a `<h1><strong>` title, matching what
/// [`crate::content`] expects.
pub const ARTICLE_SYSTEM_INSTRUCTION: &str = "You are a professional content writer specializing in generating engaging, well-structured, and informative blog posts. Generate a compelling blog post of approximately 400-500 words on the user's provided topic. Return **ONLY the raw content as well-formed HTML markup**, without any markdown code block delimiters (like ```html). The main title MUST be wrapped in both <h1> and <strong> tags (e.g., <h1><strong>Title Content</strong></h1>). Use `<h2>` for subheadings, and `<p>` for paragraphs. Use `<strong>` for other bold text and `<ul>`/`<li>` for lists. Ensure the content is easy to read and highly relevant to the latest public information.";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\s*```\s*$")
        .expect("code fence regex must compile")
});

/// What the provider asks Gemini for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeminiMode {
    Article,
    Image,
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    mode: GeminiMode,
    retry_policy: BackoffPolicy,
}

impl GeminiProvider {
    /// Grounded article writer.
    pub fn article(client: reqwest::Client, api_key: String) -> Self {
        Self::new(client, api_key, GeminiMode::Article, ARTICLE_MODEL)
    }

    /// Image generation through the Gemini image model.
    pub fn image(client: reqwest::Client, api_key: String) -> Self {
        Self::new(client, api_key, GeminiMode::Image, IMAGE_MODEL)
    }

    fn new(client: reqwest::Client, api_key: String, mode: GeminiMode, model: &str) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
            mode,
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

    pub fn mode(&self) -> GeminiMode {
        self.mode
    }

    /// The key travels in a header so it never appears in logged URLs.
    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            trim_trailing_slash(&self.base_url),
            self.model
        )
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.api_key) {
            headers.insert(API_KEY_HEADER, value);
        }
        headers
    }

    /// Request body for a prompt in the provider's mode.
    pub fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        match self.mode {
            GeminiMode::Article => json!({
                "contents": [{
                    "parts": [{"text": format!("Write a detailed, engaging blog post about: {prompt}")}]
                }],
                "tools": [{"google_search": {}}],
                "systemInstruction": {
                    "parts": [{"text": ARTICLE_SYSTEM_INSTRUCTION}]
                },
            }),
            GeminiMode::Image => json!({
                "contents": [{"parts": [{"text": prompt}]}],
                "generationConfig": {"responseModalities": ["IMAGE", "TEXT"]},
            }),
        }
    }

    async fn generate_content(&self, prompt: &str) -> Result<GeminiResponse> {
        if self.api_key.trim().is_empty() {
            return Err(GenError::Configuration(
                "Gemini API key is not configured. Set GEMINI_API_KEY and restart.".to_string(),
            ));
        }

        let body = self.build_request_body(prompt);
        let request =
            HttpRequest::post_json(GEMINI, self.endpoint(), &body)?.with_headers(self.headers());

        debug!(model = %self.model, mode = ?self.mode, "Gemini generateContent");

        let text = self.retry_policy.send_text(&self.client, &request).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        GEMINI
    }

    fn backend(&self) -> Backend {
        match self.mode {
            GeminiMode::Article => Backend::Article,
            GeminiMode::Image => Backend::Image,
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let response = self.generate_content(request.prompt()).await?;
        let result = match self.mode {
            GeminiMode::Article => parse_article(response)?,
            GeminiMode::Image => parse_image(response)?,
        };
        info!(model = %self.model, backend = %result.backend(), "Gemini generation succeeded");
        Ok(result)
    }
}

fn parse_article(response: GeminiResponse) -> Result<GenerationResult> {
    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        GenError::malformed("Gemini returned no candidates for the article request")
    })?;

    let html = candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| GenError::malformed("Gemini returned an empty article"))?;

    let sources = candidate
        .grounding_metadata
        .map(GroundingMetadata::into_sources)
        .unwrap_or_default();

    Ok(GenerationResult::Article {
        html: strip_code_fence(&html).to_string(),
        sources,
    })
}

fn parse_image(response: GeminiResponse) -> Result<GenerationResult> {
    let inline = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.inline_data))
        .ok_or_else(|| GenError::malformed("No image data found in the Gemini response"))?;

    let mime_type = inline
        .mime_type
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "image/png".to_string());

    Ok(GenerationResult::Image {
        url: data_uri(&mime_type, &inline.data),
    })
}

/// Drop a surrounding markdown fence the model sometimes adds anyway.
pub fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

// Internal Gemini response types

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    inline_data: Option<GeminiInlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: Option<String>,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_attributions: Vec<GroundingEntry>,
    /// Newer API versions report sources here instead.
    #[serde(default)]
    grounding_chunks: Vec<GroundingEntry>,
}

#[derive(Deserialize)]
struct GroundingEntry {
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GroundingMetadata {
    /// Sources with both a uri and a title, in provider order.
    fn into_sources(self) -> Vec<Source> {
        let entries = if self.grounding_attributions.is_empty() {
            self.grounding_chunks
        } else {
            self.grounding_attributions
        };

        entries
            .into_iter()
            .filter_map(|entry| entry.web)
            .filter_map(|web| match (web.uri, web.title) {
                (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                    Some(Source { uri, title })
                }
                _ => None,
            })
            .collect()
    }
}
