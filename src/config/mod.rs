//! Configuration: API keys and endpoint overrides per provider.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::{GenError, Result};

/// Provider key for the Gemini text/image API.
pub const GEMINI: &str = "gemini";
/// Provider key for the Hugging Face inference API.
pub const HUGGINGFACE: &str = "huggingface";
/// Provider key for the FLUX image space.
pub const FLUX: &str = "flux";
/// Provider key for the Zeroscope video space.
pub const ZEROSCOPE: &str = "zeroscope";

/// Later entries win when several aliases are set.
const API_KEY_ENV: [(&str, &str); 6] = [
    ("GOOGLE_API_KEY", GEMINI),
    ("VITE_GEMINI_API_KEY", GEMINI),
    ("GEMINI_API_KEY", GEMINI),
    ("HF_TOKEN", HUGGINGFACE),
    ("VITE_HUGGINGFACE_API_KEY", HUGGINGFACE),
    ("HUGGINGFACE_API_KEY", HUGGINGFACE),
];

const BASE_URL_ENV: [(&str, &str); 4] = [
    ("GEMINI_BASE_URL", GEMINI),
    ("HUGGINGFACE_BASE_URL", HUGGINGFACE),
    ("FLUX_SPACE_URL", FLUX),
    ("ZEROSCOPE_SPACE_URL", ZEROSCOPE),
];

/// Credentials and endpoint overrides, read once at startup.
///
/// The application entry point constructs one and hands it to
/// [`crate::Studio`]; nothing in the crate reads the environment on its own.
#[derive(Debug, Clone, Default)]
pub struct StudioConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
}

impl StudioConfig {
    /// Create empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables, honouring a `.env` file if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_process_env()
    }

    /// Load a specific env file into the process environment, then read it.
    ///
    /// Variables already set in the environment are not overridden.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::from_path(path.as_ref()).map_err(|e| {
            GenError::Configuration(format!(
                "failed to load {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self::from_process_env())
    }

    fn from_process_env() -> Self {
        let config = Self::new();

        for (env_var, provider) in &API_KEY_ENV {
            if let Ok(key) = std::env::var(env_var) {
                if !key.trim().is_empty() {
                    config.set_api_key(provider, key);
                }
            }
        }

        for (env_var, provider) in &BASE_URL_ENV {
            if let Ok(url) = std::env::var(env_var) {
                if !url.trim().is_empty() {
                    config.set_base_url(provider, url);
                }
            }
        }

        config
    }

    pub fn set_api_key(&self, provider: &str, key: String) {
        if let Ok(mut keys) = self.api_keys.write() {
            keys.insert(provider.to_string(), key);
        }
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.read().ok()?.get(provider).cloned()
    }

    /// Resolve a key or fail with a configuration error naming the variable to set.
    pub fn require_api_key(&self, provider: &str) -> Result<String> {
        self.get_api_key(provider).ok_or_else(|| {
            let hint = API_KEY_ENV
                .iter()
                .rev()
                .find(|(_, p)| *p == provider)
                .map(|(var, _)| format!(" Set {var} and restart."))
                .unwrap_or_default();
            GenError::Configuration(format!("{provider} API key is not configured.{hint}"))
        })
    }

    pub fn set_base_url(&self, provider: &str, url: String) {
        if let Ok(mut urls) = self.base_urls.write() {
            urls.insert(provider.to_string(), url);
        }
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls.read().ok()?.get(provider).cloned()
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }
}
