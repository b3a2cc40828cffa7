//! Object detection adapter
//!
//! Wraps an external image-to-detections inference service behind the
//! [`ObjectDetector`] trait. The adapter always reports the single
//! highest-confidence detection; selecting by confidence (rather than by box
//! area) is the canonical policy for this gateway and is applied uniformly.
//!
//! The adapter applies no confidence thresholding itself. Call sites filter
//! with the threshold appropriate to their context via
//! [`DetectionOutcome::at_threshold`].

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpDetector;

/// Divisor assumed for bounding-box normalization when the source image
/// dimensions cannot be read
pub const FALLBACK_CANVAS: f32 = 1000.0;

/// A bounding box in source-image pixel space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Scale into [0,1] coordinates against the given image dimensions
    pub fn normalized(&self, image_width: f32, image_height: f32) -> NormalizedBox {
        NormalizedBox {
            x: self.x / image_width,
            y: self.y / image_height,
            width: self.width / image_width,
            height: self.height / image_height,
        }
    }
}

/// A bounding box normalized to [0,1] coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A single inference result
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Outcome of one detection pass
///
/// A miss is a normal result with its own handling at every call site, not
/// an error and not a silently absent value.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Hit(Detection),
    Miss,
}

impl DetectionOutcome {
    /// Apply the caller's confidence threshold; a hit below it becomes a miss
    pub fn at_threshold(self, threshold: f32) -> DetectionOutcome {
        match self {
            DetectionOutcome::Hit(detection) if detection.confidence >= threshold => {
                DetectionOutcome::Hit(detection)
            }
            _ => DetectionOutcome::Miss,
        }
    }
}

/// Detection adapter errors
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector endpoint is not configured")]
    NotConfigured,

    #[error("detector request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("detector returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("detector call timed out after {0}s")]
    Timeout(u64),
}

pub type DetectorResult<T> = Result<T, DetectorError>;

/// External object-detection service
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Run inference on raw image bytes and return the highest-confidence
    /// detection, or a miss when inference produces no boxes
    async fn detect(&self, image: &[u8]) -> DetectorResult<DetectionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(confidence: f32) -> DetectionOutcome {
        DetectionOutcome::Hit(Detection {
            label: "fox".to_string(),
            confidence,
            bbox: BoundingBox {
                x: 10.0,
                y: 20.0,
                width: 30.0,
                height: 40.0,
            },
        })
    }

    #[test]
    fn test_normalization_divides_by_dimensions() {
        let bbox = BoundingBox {
            x: 100.0,
            y: 50.0,
            width: 200.0,
            height: 150.0,
        };
        let normalized = bbox.normalized(1000.0, 500.0);
        assert_eq!(normalized.x, 0.1);
        assert_eq!(normalized.y, 0.1);
        assert_eq!(normalized.width, 0.2);
        assert_eq!(normalized.height, 0.3);
    }

    #[test]
    fn test_normalization_fallback_canvas() {
        let bbox = BoundingBox {
            x: 100.0,
            y: 100.0,
            width: 500.0,
            height: 250.0,
        };
        let normalized = bbox.normalized(FALLBACK_CANVAS, FALLBACK_CANVAS);
        assert_eq!(normalized.x, 0.1);
        assert_eq!(normalized.width, 0.5);
        assert_eq!(normalized.height, 0.25);
    }

    #[test]
    fn test_threshold_keeps_confident_hit() {
        assert_eq!(hit(0.5).at_threshold(0.3), hit(0.5));
    }

    #[test]
    fn test_threshold_turns_weak_hit_into_miss() {
        assert_eq!(hit(0.25).at_threshold(0.3), DetectionOutcome::Miss);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        assert_eq!(hit(0.3).at_threshold(0.3), hit(0.3));
    }

    #[test]
    fn test_zero_threshold_passes_everything() {
        assert_eq!(hit(0.0).at_threshold(0.0), hit(0.0));
        assert_eq!(
            DetectionOutcome::Miss.at_threshold(0.0),
            DetectionOutcome::Miss
        );
    }

    #[test]
    fn test_normalized_box_serializes_flat() {
        let normalized = NormalizedBox {
            x: 0.1,
            y: 0.2,
            width: 0.3,
            height: 0.4,
        };
        let json = serde_json::to_string(&normalized).expect("Should serialize");
        assert!(json.contains(r#""x":0.1"#));
        assert!(json.contains(r#""width":0.3"#));
    }
}
