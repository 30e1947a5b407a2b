//! Detector - Object Proximity Analysis
//!
//! ## Responsibilities
//!
//! - Derive a detection (object class + distance) from raw image bytes
//! - Derive per-frame detections for submitted video clips
//! - Provide the deterministic simulated backend used by this node
//!
//! Real inference hardware is not attached to this unit, so the default
//! backend synthesizes stable results from the payload contents. The
//! same payload always yields the same detection, which keeps replayed
//! submissions comparable across restarts.

use serde::{Deserialize, Serialize};

/// Outcome of analyzing one image or one video frame.
///
/// `distance` is meters from the sensor. `None` means the backend could
/// not estimate a distance for this object; such detections are still
/// recorded but never alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detected object class ("pedestrian", "vehicle", ...)
    pub object_class: String,
    /// Estimated distance in meters, if available
    pub distance: Option<f64>,
}

/// Analysis backend seam.
///
/// The server is wired against this trait so the simulated backend can
/// be swapped for a real inference client without touching ingestion.
pub trait Detector: Send + Sync {
    /// Analyze a full still image
    fn analyze_image(&self, image: &[u8]) -> Detection;

    /// Analyze one frame of a video clip
    fn analyze_frame(&self, video: &[u8], frame_index: u32) -> Detection;
}

/// Deterministic detector backend.
///
/// Hashes the payload into a digit 0-9: even digits classify as
/// pedestrian, odd as vehicle, and the digit scales linearly into a
/// 0.5m - 5.0m distance (rounded to centimeters).
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedDetector;

impl SimulatedDetector {
    pub fn new() -> Self {
        Self
    }

    fn classify(input: &[u8]) -> Detection {
        let digit = input.iter().map(|b| *b as u64).sum::<u64>() % 10;
        let object_class = if digit % 2 == 0 {
            "pedestrian"
        } else {
            "vehicle"
        };
        let distance = (0.5 + (digit as f64 / 10.0) * 5.0) * 100.0;
        let distance = distance.round() / 100.0;

        Detection {
            object_class: object_class.to_string(),
            distance: Some(distance),
        }
    }
}

impl Detector for SimulatedDetector {
    fn analyze_image(&self, image: &[u8]) -> Detection {
        let detection = Self::classify(image);
        tracing::trace!(
            object_class = %detection.object_class,
            distance = ?detection.distance,
            size = image.len(),
            "Analyzed image"
        );
        detection
    }

    fn analyze_frame(&self, video: &[u8], frame_index: u32) -> Detection {
        // Frame index is folded into the hash so consecutive frames of
        // the same clip produce distinct detections.
        let mut input = Vec::with_capacity(video.len() + 4);
        input.extend_from_slice(video);
        input.extend_from_slice(frame_index.to_string().as_bytes());
        Self::classify(&input)
    }
}
