//! Presence detection: the external detector and the debounce filter.

mod command;
mod filter;

pub use command::CommandDetector;
pub use filter::{DetectionFilter, NO_DETECTION_LABEL};
