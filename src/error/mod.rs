//! Error types for genstudio.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all genstudio operations.
#[derive(Error, Debug)]
pub enum GenError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single rate-limited attempt. The backoff executor consumes these and
    /// turns the last one into [`GenError::RateLimitExhausted`].
    #[error("Rate limited (status {status}): retry after {retry_after_ms:?}ms")]
    RateLimited {
        status: u16,
        retry_after_ms: Option<u64>,
    },

    #[error("Rate limit still in effect after {attempts} attempts (last status {status})")]
    RateLimitExhausted { status: u16, attempts: u32 },

    #[error("Request failed after {attempts} attempts: {source}")]
    TransportExhausted {
        attempts: u32,
        #[source]
        source: Box<GenError>,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider error: {provider} (status {status}): {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl GenError {
    /// Create a provider error for a non-success HTTP status.
    pub fn provider(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Network(e) if e.is_builder() => ErrorCategory::Configuration,
            Self::RateLimited { .. } | Self::RateLimitExhausted { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::TransportExhausted { .. } => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Provider { status, .. } => match status {
                401 | 403 => ErrorCategory::Configuration,
                _ => ErrorCategory::Provider,
            },
            Self::MalformedResponse(_) => ErrorCategory::Response,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidArgument(_) | Self::InvalidState(_) => ErrorCategory::Usage,
            Self::Io(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether a single attempt that failed this way may be retried.
    ///
    /// Only rate limits and transport faults qualify. A request that could not
    /// be built (bad URL, bad header) fails on its first attempt. Terminal
    /// variants produced by the executor itself are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) => true,
            Self::Network(e) => is_transport_fault(e),
            _ => false,
        }
    }

    /// Whether this is a per-attempt rate-limit signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::RateLimitExhausted { .. } => RecoverySuggestion::RetryLater,
            Self::InvalidArgument(_) => RecoverySuggestion::RephrasePrompt,
            _ => match self.category() {
                ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
                ErrorCategory::RateLimit | ErrorCategory::Network => {
                    RecoverySuggestion::RetryWithBackoff
                }
                ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
                _ => RecoverySuggestion::ContactSupport,
            },
        }
    }
}

/// Connect failures, timeouts, and failures while sending or reading a body.
///
/// Without compression, a body cut short mid-read surfaces as a decode error.
fn is_transport_fault(error: &reqwest::Error) -> bool {
    !error.is_builder()
        && (error.is_connect()
            || error.is_timeout()
            || error.is_request()
            || error.is_body()
            || error.is_decode())
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GenError>;
