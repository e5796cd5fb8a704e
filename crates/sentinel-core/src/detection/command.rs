//! Detector backed by an external command.
//!
//! The command is run once per sample and must print a single JSON object:
//!
//! ```json
//! {"confidence": 0.91, "label": "person", "image_path": "/captures/2024-05-01/143000.jpg"}
//! ```
//!
//! `label` may be omitted, in which case any positive confidence is taken to
//! be the target class. Any `person_present` verdict the program computes is
//! ignored: each run is a fresh process, so its own debounce never fills and
//! the filter here does the temporal work instead. An `error` field, a non-zero exit status, or output
//! that is not JSON is a detector failure.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::NO_DETECTION_LABEL;
use crate::config::DetectorConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::traits::Detector;
use crate::types::DetectionSample;

#[derive(Debug, Deserialize)]
struct DetectorOutput {
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    image_path: Option<PathBuf>,
    #[serde(default)]
    error: Option<String>,
}

/// Runs the configured program and parses its JSON output.
pub struct CommandDetector {
    config: DetectorConfig,
    target_label: String,
}

impl CommandDetector {
    pub fn new(config: DetectorConfig, target_label: impl Into<String>) -> Self {
        Self {
            config,
            target_label: target_label.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(expand_home(&self.config.program));
        cmd.args(self.config.args.iter().map(|a| expand_home(a)))
            .envs(&self.config.env)
            .stdin(if self.config.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn parse(&self, stdout: &str) -> SentinelResult<DetectionSample> {
        let output = parse_output(stdout)?;
        if let Some(error) = output.error {
            return Err(SentinelError::detector(error));
        }
        if !(0.0..=1.0).contains(&output.confidence) {
            return Err(SentinelError::detector_output(format!(
                "confidence {} outside [0, 1]",
                output.confidence
            )));
        }

        let label = output.label.unwrap_or_else(|| {
            if output.confidence > 0.0 {
                self.target_label.clone()
            } else {
                NO_DETECTION_LABEL.to_string()
            }
        });

        Ok(DetectionSample {
            timestamp: Utc::now(),
            confidence: output.confidence,
            label,
            image_path: output.image_path,
        })
    }
}

fn parse_output(stdout: &str) -> SentinelResult<DetectorOutput> {
    let trimmed = stdout.trim();
    if let Ok(output) = serde_json::from_str(trimmed) {
        return Ok(output);
    }
    // Tolerate chatty scripts: the result is the last line.
    let last = trimmed.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    serde_json::from_str(last.trim())
        .map_err(|e| SentinelError::detector_output(format!("detector output is not a JSON object: {}", e)))
}

fn expand_home(value: &str) -> String {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest).to_string_lossy().into_owned())
            .unwrap_or_else(|| value.to_string()),
        None => value.to_string(),
    }
}

#[async_trait]
impl Detector for CommandDetector {
    async fn detect(&self) -> SentinelResult<DetectionSample> {
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| SentinelError::detector(format!("failed to start '{}': {}", self.config.program, e)))?;

        if let (Some(input), Some(mut stdin)) = (&self.config.input, child.stdin.take()) {
            let payload = serde_json::to_vec(input)?;
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SentinelError::detector(format!(
                "'{}' exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let sample = self.parse(&stdout)?;
        debug!(confidence = sample.confidence, label = %sample.label, "Detector sample");
        Ok(sample)
    }

    fn name(&self) -> &str {
        &self.config.program
    }
}
