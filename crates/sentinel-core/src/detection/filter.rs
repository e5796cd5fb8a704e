//! Sliding-window debounce over detector samples.

use std::collections::VecDeque;

use crate::config::DetectionConfig;
use crate::types::{DetectionSample, PresenceEvent};

/// Label of a frame in which the detector saw nothing.
pub const NO_DETECTION_LABEL: &str = "none";

/// Edge-triggered presence filter.
///
/// Keeps the outcome of the last `temporal_frames` samples. A sample is
/// positive when its confidence reaches the threshold and its label is the
/// target class. An event is emitted only when the window goes from "not all
/// positive" to "full and all positive", so one sustained presence produces
/// exactly one event.
///
/// A change between two detected classes clears the window. A
/// [`NO_DETECTION_LABEL`] frame is an ordinary negative and does not.
#[derive(Debug)]
pub struct DetectionFilter {
    threshold: f32,
    frames: usize,
    target_label: String,
    window: VecDeque<bool>,
    last_label: Option<String>,
    latched: bool,
}

impl DetectionFilter {
    pub fn new(config: &DetectionConfig) -> Self {
        let frames = config.temporal_frames.max(1);
        Self {
            threshold: config.confidence_threshold,
            frames,
            target_label: config.target_label.to_lowercase(),
            window: VecDeque::with_capacity(frames),
            last_label: None,
            latched: false,
        }
    }

    /// Feed one sample. Returns a triggered event on the rising edge only.
    pub fn observe(&mut self, sample: &DetectionSample) -> Option<PresenceEvent> {
        let label = sample.label.to_lowercase();
        if label != NO_DETECTION_LABEL {
            if self.last_label.as_deref().is_some_and(|last| last != label) {
                self.window.clear();
            }
            self.last_label = Some(label.clone());
        }

        let positive = sample.confidence >= self.threshold && label == self.target_label;
        if self.push(positive) {
            Some(PresenceEvent::triggered_by(sample))
        } else {
            None
        }
    }

    /// Record a tick where the detector produced nothing usable.
    pub fn observe_failure(&mut self) {
        self.push(false);
    }

    /// Clear the window and the edge latch.
    pub fn reset(&mut self) {
        self.window.clear();
        self.last_label = None;
        self.latched = false;
    }

    /// Number of positives currently in the window.
    pub fn positives(&self) -> usize {
        self.window.iter().filter(|p| **p).count()
    }

    fn push(&mut self, positive: bool) -> bool {
        if self.window.len() == self.frames {
            self.window.pop_front();
        }
        self.window.push_back(positive);

        let saturated = self.window.len() == self.frames && self.window.iter().all(|p| *p);
        let rising = saturated && !self.latched;
        self.latched = saturated;
        rising
    }
}
