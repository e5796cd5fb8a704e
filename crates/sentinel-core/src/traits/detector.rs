//! Detector trait.

use async_trait::async_trait;

use crate::error::SentinelResult;
use crate::types::DetectionSample;

/// Produces one detection sample per call (typically one camera frame).
#[async_trait]
pub trait Detector: Send + Sync {
    /// Capture and classify a frame.
    async fn detect(&self) -> SentinelResult<DetectionSample>;

    /// Detector name, used in logs.
    fn name(&self) -> &str;
}
