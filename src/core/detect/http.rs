//! HTTP-backed object detector
//!
//! Posts a base64-encoded image to an inference endpoint and selects the
//! highest-confidence box from the response. The wire contract:
//!
//! - Request: `POST <endpoint>` with `{"image": "<base64>"}`
//! - Response: `{"detections": [{"label", "confidence", "box": {x, y, width, height}}]}`
//!   with box coordinates in source-image pixel space

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    BoundingBox, Detection, DetectionOutcome, DetectorError, DetectorResult, ObjectDetector,
};

/// Object detector that delegates inference to an external HTTP service
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    label: String,
    confidence: f32,
    #[serde(rename = "box")]
    bbox: WireBox,
}

#[derive(Debug, Deserialize)]
struct WireBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl HttpDetector {
    /// Create a new detector. An unset endpoint yields
    /// `DetectorError::NotConfigured` on every call rather than failing
    /// construction, so the server can boot without a detection backend.
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl ObjectDetector for HttpDetector {
    async fn detect(&self, image: &[u8]) -> DetectorResult<DetectionOutcome> {
        let endpoint = self.endpoint.as_deref().ok_or(DetectorError::NotConfigured)?;

        let body = json!({ "image": BASE64.encode(image) });
        let mut request = self.client.post(endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DetectorError::InvalidResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;

        debug!(boxes = parsed.detections.len(), "inference response received");

        // Max-confidence selection. Max-area is deliberately not used.
        let best = parsed
            .detections
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        Ok(match best {
            Some(wire) => DetectionOutcome::Hit(Detection {
                label: wire.label,
                confidence: wire.confidence,
                bbox: BoundingBox {
                    x: wire.bbox.x,
                    y: wire.bbox.y,
                    width: wire.bbox.width,
                    height: wire.bbox.height,
                },
            }),
            None => DetectionOutcome::Miss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_detector_errors() {
        let detector = HttpDetector::new(None, None);
        let result = detector.detect(b"img").await;
        assert!(matches!(result, Err(DetectorError::NotConfigured)));
    }

    #[test]
    fn test_inference_response_parses() {
        let json = r#"{
            "detections": [
                {"label": "fox", "confidence": 0.91, "box": {"x": 10.0, "y": 20.0, "width": 30.0, "height": 40.0}},
                {"label": "cat", "confidence": 0.42, "box": {"x": 0.0, "y": 0.0, "width": 5.0, "height": 5.0}}
            ]
        }"#;
        let parsed: InferenceResponse = serde_json::from_str(json).expect("Should parse");
        assert_eq!(parsed.detections.len(), 2);
        assert_eq!(parsed.detections[0].label, "fox");
        assert_eq!(parsed.detections[1].bbox.width, 5.0);
    }

    #[test]
    fn test_empty_response_parses_to_no_detections() {
        let parsed: InferenceResponse = serde_json::from_str("{}").expect("Should parse");
        assert!(parsed.detections.is_empty());
    }
}
