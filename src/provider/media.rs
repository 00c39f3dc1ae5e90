//! Media URL extraction from space prediction results.
//!
//! Spaces return the generated file in several shapes depending on the app and
//! Gradio version. Each known shape has an extractor; they are tried in order
//! and the first match wins.

use serde_json::Value;

use crate::error::{GenError, Result};

/// Pulls a media URL out of one output value.
pub type Extractor = fn(&Value) -> Option<String>;

/// Known output shapes, most specific first.
pub const EXTRACTORS: &[(&str, Extractor)] = &[
    ("video.url", video_url),
    ("url", direct_url),
    ("image.url", image_url),
    ("data.url", nested_data_url),
    ("bare http string", bare_string),
];

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn video_url(value: &Value) -> Option<String> {
    string_at(value, "/video/url")
}

fn direct_url(value: &Value) -> Option<String> {
    string_at(value, "/url")
}

fn image_url(value: &Value) -> Option<String> {
    string_at(value, "/image/url")
}

fn nested_data_url(value: &Value) -> Option<String> {
    string_at(value, "/data/url")
}

fn bare_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        .map(str::to_string)
}

/// Extract the media URL from the first output of a prediction's `data` array.
pub fn extract_media_url(data: &[Value]) -> Result<String> {
    let first = data
        .first()
        .ok_or_else(|| GenError::malformed("prediction returned no outputs"))?;

    EXTRACTORS
        .iter()
        .find_map(|(_, extract)| extract(first))
        .ok_or_else(|| {
            let shapes: Vec<&str> = EXTRACTORS.iter().map(|(name, _)| *name).collect();
            GenError::malformed(format!(
                "no media URL in prediction output (tried {})",
                shapes.join(", ")
            ))
        })
}

/// Same as [`extract_media_url`], for a full `{ "data": [...] }` response.
pub fn extract_from_response(response: &Value) -> Result<String> {
    let data = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| GenError::malformed("prediction response has no data array"))?;
    extract_media_url(data)
}
