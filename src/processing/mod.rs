//! Image transform pipeline.
//!
//! Stages always run in the order resize, crop, tint regardless of how the
//! options were written, then the result is re-encoded as JPEG. Everything
//! here is synchronous and CPU-bound; async callers should go through
//! `spawn_blocking`.

pub mod color;
pub mod transform;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use color::HexColor;
pub use transform::{process, ProcessedImage};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("invalid hex color '{0}', expected #RRGGBB")]
    InvalidColor(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeOptions {
    /// Target width. Missing or non-positive falls back to the default width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropOptions {
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

/// Per-job transform instructions. A `None` stage is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropOptions>,
    /// Raw color text. A non-string JSON value is kept as its JSON text so
    /// it fails color parsing and the tint stage is skipped.
    #[serde(default, deserialize_with = "lenient_color", skip_serializing_if = "Option::is_none")]
    pub tint: Option<String>,
}

fn lenient_color<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
