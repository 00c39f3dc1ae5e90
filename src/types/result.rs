//! Generation results.

use serde::{Deserialize, Serialize};

use super::Backend;

/// A web citation returned alongside generated text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

/// The outcome of a successful generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationResult {
    /// Article markup plus the grounding sources, in provider order.
    Article { html: String, sources: Vec<Source> },
    /// An http(s) URL or a `data:` URI.
    Image { url: String },
    Video { url: String },
}

impl GenerationResult {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Article { .. } => Backend::Article,
            Self::Image { .. } => Backend::Image,
            Self::Video { .. } => Backend::Video,
        }
    }

    /// The media location for image and video results.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Image { url } | Self::Video { url } => Some(url),
            Self::Article { .. } => None,
        }
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            Self::Article { html, .. } => Some(html),
            _ => None,
        }
    }

    pub fn sources(&self) -> &[Source] {
        match self {
            Self::Article { sources, .. } => sources,
            _ => &[],
        }
    }
}

/// Build a `data:` URI from a MIME type and base64 payload.
pub fn data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}
