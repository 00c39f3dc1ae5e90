//! Convenience re-exports for common use.

pub use crate::config::StudioConfig;
pub use crate::content::{ArticleDraft, EditMode};
pub use crate::error::{GenError, Result};
pub use crate::provider::{GenerationProvider, ImageBackend};
pub use crate::studio::{Studio, StudioOptions};
pub use crate::types::{Backend, GenerationRequest, GenerationResult, Source};
pub use crate::util::retry::BackoffPolicy;
