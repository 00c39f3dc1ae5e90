//! The studio: one explicitly constructed client serving every backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::StudioConfig;
use crate::error::{GenError, Result};
use crate::provider::http::{build_client, DEFAULT_TIMEOUT};
use crate::provider::{create_provider, GenerationProvider, ImageBackend, ProviderKind};
use crate::types::{Backend, GenerationRequest, GenerationResult};
use crate::util::retry::BackoffPolicy;

/// Construction options for a [`Studio`].
#[derive(Debug, Clone)]
pub struct StudioOptions {
    /// Backends to set up. Credentials are checked only for these.
    pub backends: Vec<Backend>,
    pub image_backend: ImageBackend,
    /// Client-wide HTTP timeout.
    pub timeout: Duration,
    pub retry_policy: BackoffPolicy,
}

impl Default for StudioOptions {
    fn default() -> Self {
        Self {
            backends: vec![Backend::Article, Backend::Image, Backend::Video],
            image_backend: ImageBackend::default(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: BackoffPolicy::default(),
        }
    }
}

/// Owns the HTTP client and one provider per enabled backend.
///
/// At most one submission runs at a time; a concurrent [`Studio::submit`]
/// fails with [`GenError::InvalidState`] instead of queuing.
pub struct Studio {
    providers: HashMap<Backend, Box<dyn GenerationProvider>>,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<(Backend, &str)> =
            self.providers.iter().map(|(b, p)| (*b, p.name())).collect();
        names.sort_by_key(|(b, _)| b.to_string());
        f.debug_struct("Studio")
            .field("providers", &names)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl Studio {
    /// Build a studio, failing fast on missing credentials.
    pub fn from_config(config: &StudioConfig, options: StudioOptions) -> Result<Self> {
        let client = build_client(options.timeout)?;
        let mut providers: HashMap<Backend, Box<dyn GenerationProvider>> = HashMap::new();

        for backend in &options.backends {
            let kind = ProviderKind::for_backend(*backend, options.image_backend);
            let provider = create_provider(kind, config, &client, &options.retry_policy)?;
            debug!(backend = %backend, provider = provider.name(), "Provider ready");
            providers.insert(*backend, provider);
        }

        Ok(Self::from_providers(providers))
    }

    /// Build a studio around already-constructed providers.
    pub fn from_providers(providers: HashMap<Backend, Box<dyn GenerationProvider>>) -> Self {
        Self {
            providers,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Name of the provider serving `backend`, if enabled.
    pub fn provider_name(&self, backend: Backend) -> Option<&str> {
        self.providers.get(&backend).map(|p| p.name())
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validate the request, route it to its backend and wait for the result.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        request.validate()?;

        let provider = self.providers.get(&request.backend()).ok_or_else(|| {
            GenError::Configuration(format!(
                "the {} backend is not enabled on this studio",
                request.backend()
            ))
        })?;

        let _guard = InFlightGuard::acquire(&self.in_flight)?;

        info!(backend = %request.backend(), provider = provider.name(), "Generation started");
        let result = provider.generate(request).await?;
        info!(backend = %result.backend(), "Generation finished");

        Ok(result)
    }
}

/// Holds the studio's in-flight flag; clears it when dropped.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                GenError::InvalidState("a generation request is already in flight".to_string())
            })?;
        Ok(Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
