//! Error classification and recovery hints.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    RateLimit,
    Network,
    Timeout,
    Provider,
    Response,
    Serialization,
    Usage,
    Unknown,
}

/// Suggested recovery action, suitable for a user-facing hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    RetryLater,
    CheckConfiguration,
    IncreaseTimeout,
    RephrasePrompt,
    ContactSupport,
}

impl RecoverySuggestion {
    /// Short human-readable hint.
    pub fn hint(self) -> &'static str {
        match self {
            Self::RetryWithBackoff => "the request can be retried",
            Self::RetryLater => "the provider quota is exhausted; try again later",
            Self::CheckConfiguration => "check the configured API keys and endpoints",
            Self::IncreaseTimeout => "the provider is slow; increase the timeout",
            Self::RephrasePrompt => "adjust the prompt and submit again",
            Self::ContactSupport => "the provider returned something unexpected",
        }
    }
}
