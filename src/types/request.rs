//! Generation requests.

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::error::{GenError, Result};

/// The kind of media a request asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    Article,
    Image,
    Video,
}

/// A single user submission.
///
/// Example:
/// ```
/// use genstudio::types::{Backend, GenerationRequest};
///
/// let request = GenerationRequest::builder()
///     .prompt("A lighthouse at dawn")
///     .backend(Backend::Image)
///     .build()
///     .with_parameter("width", 768);
/// assert_eq!(request.parameter_u64("width"), Some(768));
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    #[builder(into)]
    prompt: String,
    backend: Backend,
    /// Backend-specific options, e.g. `seed`, `width`, `num_frames`.
    #[builder(default)]
    #[serde(default)]
    parameters: Map<String, Value>,
}

impl GenerationRequest {
    pub fn article(prompt: impl Into<String>) -> Self {
        Self::builder().prompt(prompt).backend(Backend::Article).build()
    }

    pub fn image(prompt: impl Into<String>) -> Self {
        Self::builder().prompt(prompt).backend(Backend::Image).build()
    }

    pub fn video(prompt: impl Into<String>) -> Self {
        Self::builder().prompt(prompt).backend(Backend::Video).build()
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn parameter_u64(&self, name: &str) -> Option<u64> {
        self.parameter(name).and_then(Value::as_u64)
    }

    pub fn parameter_f64(&self, name: &str) -> Option<f64> {
        self.parameter(name).and_then(Value::as_f64)
    }

    pub fn parameter_bool(&self, name: &str) -> Option<bool> {
        self.parameter(name).and_then(Value::as_bool)
    }

    pub fn parameter_str(&self, name: &str) -> Option<&str> {
        self.parameter(name).and_then(Value::as_str)
    }

    /// Reject prompts that are empty after trimming.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(GenError::InvalidArgument(format!(
                "Please enter a prompt to generate {}.",
                match self.backend {
                    Backend::Article => "an article",
                    Backend::Image => "an image",
                    Backend::Video => "a video",
                }
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_from_lowercase_names() {
        assert_eq!("video".parse::<Backend>().unwrap(), Backend::Video);
        assert_eq!(Backend::Article.to_string(), "article");
        assert!("podcast".parse::<Backend>().is_err());
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let err = GenerationRequest::article("   \n").validate().unwrap_err();
        assert!(matches!(err, GenError::InvalidArgument(ref m) if m.contains("an article")));
        assert!(GenerationRequest::video("waves").validate().is_ok());
    }

    #[test]
    fn typed_parameter_accessors() {
        let request = GenerationRequest::video("waves")
            .with_parameter("num_frames", 24)
            .with_parameter("guidance_scale", 7.5)
            .with_parameter("advanced", true)
            .with_parameter("server", "Google US Server");

        assert_eq!(request.parameter_u64("num_frames"), Some(24));
        assert_eq!(request.parameter_f64("guidance_scale"), Some(7.5));
        assert_eq!(request.parameter_bool("advanced"), Some(true));
        assert_eq!(request.parameter_str("server"), Some("Google US Server"));
        assert_eq!(request.parameter_u64("seed"), None);
    }
}
