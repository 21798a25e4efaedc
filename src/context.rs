//! Per-run context threaded through every component call.
//!
//! One `RunContext` is created at run start and passed by reference; it
//! carries the run identity, the artifact session, the cancellation token,
//! and the in-memory session log of critical errors and step failures.
//! Nothing here is a module-level singleton.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::session::Session;
use crate::wait::CancelToken;

/// A journey-aborting condition. Appended to the session log; never
/// retried beyond the step's single built-in backoff-and-recheck.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalError {
    pub error_type: String,
    pub message: String,
    pub stage: String,
    pub timestamp: DateTime<Utc>,
}

/// A postcondition mismatch. Recorded as a diagnostic and folded into the
/// journey's overall result without aborting it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step: String,
    pub expected: String,
    pub observed: String,
    pub snapshot_sample: String,
    pub timestamp: DateTime<Utc>,
}

/// State for one run, created once and passed by reference.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    pub started: DateTime<Utc>,
    pub session: Session,
    pub cancel: CancelToken,
    critical_errors: Vec<CriticalError>,
    step_failures: Vec<StepFailure>,
}

impl RunContext {
    pub fn new(session: Session) -> Self {
        Self {
            run_id: generate_run_id(),
            started: Utc::now(),
            session,
            cancel: CancelToken::new(),
            critical_errors: Vec::new(),
            step_failures: Vec::new(),
        }
    }

    /// Record a journey-aborting error.
    pub fn record_critical(
        &mut self,
        error_type: impl Into<String>,
        message: impl Into<String>,
        stage: impl Into<String>,
    ) {
        let entry = CriticalError {
            error_type: error_type.into(),
            message: message.into(),
            stage: stage.into(),
            timestamp: Utc::now(),
        };
        error!(
            stage = %entry.stage,
            "CRITICAL: {}: {}", entry.error_type, entry.message
        );
        self.critical_errors.push(entry);
    }

    /// Record a non-fatal postcondition diagnostic.
    pub fn record_step_failure(
        &mut self,
        step: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
        snapshot_sample: impl Into<String>,
    ) {
        let entry = StepFailure {
            step: step.into(),
            expected: expected.into(),
            observed: observed.into(),
            snapshot_sample: snapshot_sample.into(),
            timestamp: Utc::now(),
        };
        warn!(
            step = %entry.step,
            "step failure: expected {}, observed {}", entry.expected, entry.observed
        );
        self.step_failures.push(entry);
    }

    pub fn critical_errors(&self) -> &[CriticalError] {
        &self.critical_errors
    }

    pub fn step_failures(&self) -> &[StepFailure] {
        &self.step_failures
    }

    pub fn has_critical_errors(&self) -> bool {
        !self.critical_errors.is_empty()
    }
}

/// Generate a unique run ID
fn generate_run_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("run_{}_{}", timestamp, std::process::id())
}
