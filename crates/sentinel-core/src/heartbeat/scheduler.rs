//! Fixed-period detection loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DetectionConfig, HeartbeatConfig};
use crate::conversation::ConversationEngine;
use crate::detection::DetectionFilter;
use crate::error::SentinelError;
use crate::traits::Detector;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The detector failed or timed out; counted as a negative frame.
    Skipped { reason: String },
    /// A sample was fed to the filter without completing a trigger.
    Observed { positive_frames: usize },
    /// Presence triggered and a new session started.
    Triggered { session_id: String },
    /// Presence triggered while a session was already open.
    Suppressed,
}

/// Samples the detector on a fixed period and starts a session on the
/// rising edge of presence.
///
/// Ticks are scheduled from the start of the previous tick. A tick that
/// overruns the period is followed immediately by the next one, without a
/// backlog of missed ticks. The scheduler keeps no conversation state; it
/// only asks the engine whether a session is open.
pub struct HeartbeatScheduler {
    detector: Arc<dyn Detector>,
    filter: DetectionFilter,
    engine: Arc<ConversationEngine>,
    interval: Duration,
    detector_timeout: Duration,
    wake: Arc<Notify>,
}

impl HeartbeatScheduler {
    pub fn new(
        heartbeat: &HeartbeatConfig,
        detection: &DetectionConfig,
        detector: Arc<dyn Detector>,
        engine: Arc<ConversationEngine>,
    ) -> Self {
        Self {
            detector,
            filter: DetectionFilter::new(detection),
            engine,
            interval: heartbeat.interval(),
            detector_timeout: heartbeat.detector_timeout(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Share an externally owned wake handle.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = wake;
        self
    }

    /// Handle that forces an immediate extra tick when notified.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Run one detection cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let sample = match tokio::time::timeout(self.detector_timeout, self.detector.detect()).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(e)) => {
                warn!(detector = self.detector.name(), error = %e, "Detector failed, skipping tick");
                self.filter.observe_failure();
                return TickOutcome::Skipped { reason: e.to_string() };
            }
            Err(_) => {
                let e = SentinelError::timeout("detect", self.detector_timeout);
                warn!(detector = self.detector.name(), error = %e, "Detector timed out, skipping tick");
                self.filter.observe_failure();
                return TickOutcome::Skipped { reason: e.to_string() };
            }
        };

        let Some(event) = self.filter.observe(&sample) else {
            return TickOutcome::Observed {
                positive_frames: self.filter.positives(),
            };
        };

        info!(confidence = event.confidence, label = %event.label, "Presence detected");
        if let Err(e) = self.engine.store().record_presence(&event) {
            warn!(error = %e, "Failed to record presence event");
        }

        if self.engine.is_active().await {
            debug!("Session already open, presence trigger suppressed");
            return TickOutcome::Suppressed;
        }

        match self.engine.start_session().await {
            Ok(started) => TickOutcome::Triggered {
                session_id: started.session_id,
            },
            Err(SentinelError::Conflict { .. }) => {
                debug!("Session opened concurrently, presence trigger suppressed");
                TickOutcome::Suppressed
            }
            Err(e) => {
                warn!(error = %e, "Failed to start session");
                TickOutcome::Skipped { reason: e.to_string() }
            }
        }
    }

    /// Tick until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let wake = self.wake.clone();

        info!(
            interval_secs = self.interval.as_secs(),
            detector = self.detector.name(),
            "Heartbeat started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = wake.notified() => {
                    info!("Wake requested, sampling now");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.tick() => {
                    debug!(?outcome, "Heartbeat tick");
                }
            }
        }

        info!("Heartbeat stopped");
    }
}
