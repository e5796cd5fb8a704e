//! Background runtime for the heartbeat, inactivity watchdog and retention job.
//!
//! Owns the lifecycle of every long-running task so the binary only has to
//! call `start()` and `shutdown()`.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SentinelConfig;
use crate::conversation::ConversationEngine;
use crate::error::{SentinelError, SentinelResult};
use crate::heartbeat::HeartbeatScheduler;
use crate::memory::{MemoryStore, PruneStats};
use crate::traits::Detector;
use crate::types::NextStep;

/// Background runtime managing task lifecycle.
///
/// # Example
///
/// ```ignore
/// use sentinel_core::SentinelRuntime;
///
/// let mut runtime = SentinelRuntime::new(config, engine, detector);
/// runtime.start().await?;
/// // ... serve requests ...
/// runtime.shutdown().await?;
/// ```
pub struct SentinelRuntime {
    config: SentinelConfig,
    engine: Arc<ConversationEngine>,
    detector: Arc<dyn Detector>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    scheduler: Option<JobScheduler>,
}

impl SentinelRuntime {
    /// Create the runtime. Nothing runs until `start()`.
    pub fn new(config: SentinelConfig, engine: Arc<ConversationEngine>, detector: Arc<dyn Detector>) -> Self {
        Self {
            config,
            engine,
            detector,
            wake: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            scheduler: None,
        }
    }

    /// Resume any interrupted session, then spawn the background tasks.
    ///
    /// Returns the step re-delivered for a resumed session.
    pub async fn start(&mut self) -> SentinelResult<Option<NextStep>> {
        if !self.tasks.is_empty() {
            return Err(SentinelError::Internal("runtime already started".to_string()));
        }

        let resumed = self.engine.resume().await?;
        if let Some(step) = &resumed {
            info!(complete = step.is_complete(), "Resumed interrupted session");
        }

        let heartbeat = HeartbeatScheduler::new(
            &self.config.heartbeat,
            &self.config.detection,
            self.detector.clone(),
            self.engine.clone(),
        )
        .with_wake(self.wake.clone());
        self.tasks.push(tokio::spawn(heartbeat.run(self.cancel.child_token())));
        self.tasks.push(tokio::spawn(
            self.engine.clone().run_inactivity_watchdog(self.cancel.child_token()),
        ));

        if self.config.store.retention_days > 0 {
            self.scheduler = Some(self.start_retention().await?);
        }

        info!(
            heartbeat_secs = self.config.heartbeat.interval_secs,
            retention_days = self.config.store.retention_days,
            "Background tasks started"
        );
        Ok(resumed)
    }

    async fn start_retention(&self) -> SentinelResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SentinelError::Internal(format!("Failed to create scheduler: {}", e)))?;

        let store = self.engine.store().clone();
        let retention_days = self.config.store.retention_days;
        let job = Job::new_async(self.config.store.prune_schedule.as_str(), move |_uuid, _lock| {
            let store = store.clone();
            Box::pin(async move {
                match prune(store.as_ref(), retention_days) {
                    Ok(stats) => info!(
                        presence_events = stats.presence_events,
                        sessions = stats.sessions,
                        turns = stats.turns,
                        images = stats.images,
                        "Retention pruning complete"
                    ),
                    Err(e) => error!(error = %e, "Retention pruning failed"),
                }
            })
        })
        .map_err(|e| SentinelError::Configuration(format!("invalid prune schedule: {}", e)))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| SentinelError::Internal(format!("Failed to add retention job: {}", e)))?;
        scheduler
            .start()
            .await
            .map_err(|e| SentinelError::Internal(format!("Failed to start scheduler: {}", e)))?;
        debug!(schedule = %self.config.store.prune_schedule, "Retention job scheduled");
        Ok(scheduler)
    }

    /// Prune expired records immediately.
    pub fn prune_now(&self) -> SentinelResult<PruneStats> {
        prune(self.engine.store().as_ref(), self.config.store.retention_days)
    }

    /// Force an immediate detection tick.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub fn engine(&self) -> &Arc<ConversationEngine> {
        &self.engine
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty() && !self.cancel.is_cancelled()
    }

    /// Stop every background task and wait for them to finish.
    pub async fn shutdown(&mut self) -> SentinelResult<()> {
        debug!("Shutting down background tasks");
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "Background task panicked");
            }
        }

        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| SentinelError::Internal(format!("Failed to shutdown scheduler: {}", e)))?;
        }

        info!("Background tasks stopped");
        Ok(())
    }
}

fn prune(store: &dyn MemoryStore, retention_days: u32) -> SentinelResult<PruneStats> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    store.prune_before(cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversationConfig;
    use crate::memory::SqliteMemoryStore;
    use crate::reasoning::ReasoningGateway;
    use crate::types::DetectionSample;
    use async_trait::async_trait;

    struct EmptyRoom;

    #[async_trait]
    impl Detector for EmptyRoom {
        async fn detect(&self) -> SentinelResult<DetectionSample> {
            Ok(DetectionSample::new(0.0, "none"))
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    fn runtime(config: SentinelConfig) -> SentinelRuntime {
        let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
        let gateway = Arc::new(ReasoningGateway::new(Vec::new()));
        let engine = Arc::new(ConversationEngine::new(&ConversationConfig::default(), store, gateway).unwrap());
        SentinelRuntime::new(config, engine, Arc::new(EmptyRoom))
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut runtime = runtime(SentinelConfig::default());
        let resumed = runtime.start().await.unwrap();
        assert!(resumed.is_none());
        assert!(runtime.is_running());

        runtime.wake();
        runtime.shutdown().await.unwrap();
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let mut config = SentinelConfig::default();
        config.store.retention_days = 0;
        let mut runtime = runtime(config);
        runtime.start().await.unwrap();
        assert!(runtime.start().await.is_err());
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_prune_schedule() {
        let mut config = SentinelConfig::default();
        config.store.prune_schedule = "not a schedule".to_string();
        let mut runtime = runtime(config);
        let err = runtime.start().await.unwrap_err();
        assert!(matches!(err, SentinelError::Configuration(_)));
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_now_on_empty_store() {
        let runtime = runtime(SentinelConfig::default());
        assert_eq!(runtime.prune_now().unwrap(), PruneStats::default());
    }
}
