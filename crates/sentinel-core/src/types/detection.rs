//! Detector output and the presence signal derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One raw detector result, produced once per heartbeat tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSample {
    pub timestamp: DateTime<Utc>,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Class label reported by the detector (e.g. "person").
    pub label: String,
    /// Frame captured for this sample, when the detector saved one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
}

impl DetectionSample {
    pub fn new(confidence: f32, label: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            confidence,
            label: label.into(),
            image_path: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }
}

/// Debounced presence signal emitted by the detection filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub timestamp: DateTime<Utc>,
    pub triggered: bool,
    /// Confidence of the frame that completed the window.
    pub confidence: f32,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
}

impl PresenceEvent {
    /// Build a triggered event from the frame that completed the window.
    pub fn triggered_by(sample: &DetectionSample) -> Self {
        Self {
            timestamp: sample.timestamp,
            triggered: true,
            confidence: sample.confidence,
            label: sample.label.clone(),
            image_path: sample.image_path.clone(),
        }
    }
}
