//! Generation provider trait and implementations.

pub mod http;
pub mod media;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "huggingface")]
pub mod huggingface;

#[cfg(feature = "gradio")]
pub mod gradio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StudioConfig;
use crate::error::{GenError, Result};
use crate::types::{Backend, GenerationRequest, GenerationResult};
use crate::util::retry::BackoffPolicy;

/// Core trait implemented by every generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name (e.g., "gemini", "flux").
    fn name(&self) -> &str;

    /// The kind of content this provider produces.
    fn backend(&self) -> Backend;

    /// Run one generation.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;
}

/// Which service renders image requests.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ImageBackend {
    /// FLUX hosted space, no credentials needed.
    #[default]
    Flux,
    HuggingFace,
    Gemini,
}

/// A concrete provider implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ProviderKind {
    GeminiArticle,
    GeminiImage,
    HuggingFaceImage,
    FluxImage,
    ZeroscopeVideo,
}

impl ProviderKind {
    /// The provider that serves `backend` given the image backend choice.
    pub fn for_backend(backend: Backend, image_backend: ImageBackend) -> Self {
        match backend {
            Backend::Article => Self::GeminiArticle,
            Backend::Video => Self::ZeroscopeVideo,
            Backend::Image => match image_backend {
                ImageBackend::Flux => Self::FluxImage,
                ImageBackend::HuggingFace => Self::HuggingFaceImage,
                ImageBackend::Gemini => Self::GeminiImage,
            },
        }
    }
}

/// Create a provider, resolving credentials and base URLs from `config`.
///
/// Missing credentials fail here, before any network call.
#[allow(unused_variables)]
pub fn create_provider(
    kind: ProviderKind,
    config: &StudioConfig,
    client: &reqwest::Client,
    retry_policy: &BackoffPolicy,
) -> Result<Box<dyn GenerationProvider>> {
    match kind {
        #[cfg(feature = "gemini")]
        ProviderKind::GeminiArticle | ProviderKind::GeminiImage => {
            use crate::config::GEMINI;

            let api_key = config.require_api_key(GEMINI)?;
            let provider = if kind == ProviderKind::GeminiArticle {
                gemini::GeminiProvider::article(client.clone(), api_key)
            } else {
                gemini::GeminiProvider::image(client.clone(), api_key)
            };
            let provider = match config.get_base_url(GEMINI) {
                Some(url) => provider.with_base_url(url),
                None => provider,
            };
            Ok(Box::new(provider.with_retry_policy(retry_policy.clone())))
        }
        #[cfg(feature = "huggingface")]
        ProviderKind::HuggingFaceImage => {
            use crate::config::HUGGINGFACE;

            let api_token = config.require_api_key(HUGGINGFACE)?;
            let provider = huggingface::HuggingFaceImageProvider::new(client.clone(), api_token)
                .with_retry_policy(retry_policy.clone());
            Ok(Box::new(match config.get_base_url(HUGGINGFACE) {
                Some(url) => provider.with_base_url(url),
                None => provider,
            }))
        }
        #[cfg(feature = "gradio")]
        ProviderKind::FluxImage => {
            let space = space_client(
                config,
                client,
                retry_policy,
                crate::config::FLUX,
                gradio::FluxImageProvider::SPACE,
            )?;
            Ok(Box::new(gradio::FluxImageProvider::new(space)))
        }
        #[cfg(feature = "gradio")]
        ProviderKind::ZeroscopeVideo => {
            let space = space_client(
                config,
                client,
                retry_policy,
                crate::config::ZEROSCOPE,
                gradio::ZeroscopeVideoProvider::SPACE,
            )?;
            Ok(Box::new(gradio::ZeroscopeVideoProvider::new(space)))
        }
        #[allow(unreachable_patterns)]
        _ => Err(GenError::Configuration(format!(
            "Provider '{kind}' not enabled via feature flags"
        ))),
    }
}

/// Spaces are public; a Hugging Face token, when configured, raises quota.
#[cfg(feature = "gradio")]
fn space_client(
    config: &StudioConfig,
    client: &reqwest::Client,
    retry_policy: &BackoffPolicy,
    provider: &str,
    space: &str,
) -> Result<gradio::GradioClient> {
    let gradio = match config.get_base_url(provider) {
        Some(url) => gradio::GradioClient::with_base_url(client.clone(), space, url),
        None => gradio::GradioClient::connect(client.clone(), space)?,
    };
    Ok(gradio
        .with_token(config.get_api_key(crate::config::HUGGINGFACE))
        .with_retry_policy(retry_policy.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_follows_image_backend_choice() {
        assert_eq!(
            ProviderKind::for_backend(Backend::Article, ImageBackend::HuggingFace),
            ProviderKind::GeminiArticle
        );
        assert_eq!(
            ProviderKind::for_backend(Backend::Image, ImageBackend::default()),
            ProviderKind::FluxImage
        );
        assert_eq!(
            ProviderKind::for_backend(Backend::Image, ImageBackend::Gemini),
            ProviderKind::GeminiImage
        );
        assert_eq!(
            ProviderKind::for_backend(Backend::Video, ImageBackend::Gemini),
            ProviderKind::ZeroscopeVideo
        );
    }

    #[test]
    fn image_backend_parses_kebab_case() {
        assert_eq!("hugging-face".parse::<ImageBackend>().unwrap(), ImageBackend::HuggingFace);
        assert_eq!(ImageBackend::Flux.to_string(), "flux");
        assert!("dall-e".parse::<ImageBackend>().is_err());
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn gemini_providers_need_a_key() {
        let config = StudioConfig::new();
        let client = reqwest::Client::new();
        let err = create_provider(
            ProviderKind::GeminiArticle,
            &config,
            &client,
            &BackoffPolicy::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, GenError::Configuration(_)));

        config.set_api_key(crate::config::GEMINI, "k".into());
        let provider = create_provider(
            ProviderKind::GeminiImage,
            &config,
            &client,
            &BackoffPolicy::default(),
        )
        .unwrap();
        assert_eq!(provider.backend(), Backend::Image);
    }

    #[cfg(feature = "gradio")]
    #[test]
    fn spaces_need_no_credentials() {
        let provider = create_provider(
            ProviderKind::ZeroscopeVideo,
            &StudioConfig::new(),
            &reqwest::Client::new(),
            &BackoffPolicy::default(),
        )
        .unwrap();
        assert_eq!(provider.name(), "zeroscope");
        assert_eq!(provider.backend(), Backend::Video);
    }
}
