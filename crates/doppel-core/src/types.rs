use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoding of a captured image as submitted to the match service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// A single encoded photo from the capture device.
///
/// Lives only for the duration of one match request; session state never
/// holds onto the pixel data.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub captured_at: Instant,
}

/// One candidate returned by the match service, in service ranking order.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    /// Opaque identifier understood by the lookup service.
    pub match_id: String,
    /// Similarity score as reported by the service (0-100 scale).
    pub similarity: f32,
    /// Thumbnail image bytes; empty when the service sent none.
    pub thumbnail: Vec<u8>,
}

/// Arbitrary JSON object returned by the lookup service for one match.
///
/// The field set is owned by the remote service; nothing here is
/// interpreted locally beyond being a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichmentResult(pub serde_json::Map<String, serde_json::Value>);

impl EnrichmentResult {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for EnrichmentResult {
    fn from(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(fields)
    }
}

/// Produces one photo per call. Implemented by the V4L2 camera in
/// production and by in-memory sources in tests.
pub trait ImageSource: Send {
    fn capture(&mut self) -> Result<CapturedImage, CaptureError>;
}

/// Failure to produce a photo from the capture device.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("device produced no usable frame: {0}")]
    NoFrame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_format_content_type() {
        assert_eq!(ImageFormat::Jpeg.content_type(), "image/jpeg");
        assert_eq!(ImageFormat::Png.content_type(), "image/png");
    }

    #[test]
    fn test_enrichment_result_transparent_serde() {
        let parsed: EnrichmentResult =
            serde_json::from_str(r#"{"name": "Jane Doe", "age": 34}"#).unwrap();
        assert_eq!(parsed.get("name").and_then(|v| v.as_str()), Some("Jane Doe"));
        assert_eq!(parsed.get("age").and_then(|v| v.as_i64()), Some(34));

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["name"], "Jane Doe");
    }

    #[test]
    fn test_enrichment_result_empty() {
        let empty: EnrichmentResult = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.get("anything"), None);
    }
}
