//! Strategy-driven journey execution.
//!
//! The smart runner asks the result store for an execution strategy, runs
//! the selected journeys strictly in order, and stops at the first failure:
//! later journeys assume the device state earlier journeys produced, so
//! running past a failure only produces noise. Results are persisted on
//! both the completion and the abort path.

use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::context::{CriticalError, RunContext, StepFailure};
use crate::device::{Device, DeviceGateway, GatewayError, Logcat};
use crate::journey::{EngineSettings, Journey, JourneyEngine};
use crate::profile::AppProfile;
use crate::store::{
    ExecutionStrategy, StoreError, StoreStatistics, StrategyKind, TestResultRecord,
    TestResultStore,
};

/// Result type for harness orchestration
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error types for harness orchestration
#[derive(Debug)]
pub enum HarnessError {
    /// Device gateway error
    Gateway(GatewayError),

    /// Result store error
    Store(StoreError),

    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for HarnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarnessError::Gateway(err) => write!(f, "gateway error: {}", err),
            HarnessError::Store(err) => write!(f, "store error: {}", err),
            HarnessError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HarnessError::Gateway(err) => Some(err),
            HarnessError::Store(err) => Some(err),
            HarnessError::Io(err) => Some(err),
        }
    }
}

impl From<GatewayError> for HarnessError {
    fn from(err: GatewayError) -> Self {
        HarnessError::Gateway(err)
    }
}

impl From<StoreError> for HarnessError {
    fn from(err: StoreError) -> Self {
        HarnessError::Store(err)
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::Io(err)
    }
}

/// Final report of one run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub success: bool,
    pub run_id: String,
    pub host: String,
    pub strategy: ExecutionStrategy,
    pub results: Vec<TestResultRecord>,
    pub statistics: StoreStatistics,
    pub duration_ms: u64,
    pub critical_errors: Vec<CriticalError>,
    pub step_failures: Vec<StepFailure>,
}

/// Executes journeys in the order the result store decides.
pub struct SmartRunner<'a> {
    gateway: &'a dyn DeviceGateway,
    profile: &'a AppProfile,
    store: TestResultStore,
    force_full: bool,
    failed_only: bool,
    engine_settings: Option<EngineSettings>,
}

impl<'a> SmartRunner<'a> {
    pub fn new(
        gateway: &'a dyn DeviceGateway,
        profile: &'a AppProfile,
        store: TestResultStore,
    ) -> Self {
        Self {
            gateway,
            profile,
            store,
            force_full: false,
            failed_only: false,
            engine_settings: None,
        }
    }

    /// Bypass the resumption strategy and run everything.
    pub fn force_full(mut self, force: bool) -> Self {
        self.force_full = force;
        self
    }

    /// Re-validate only previously failed journeys.
    pub fn failed_only(mut self, failed_only: bool) -> Self {
        self.failed_only = failed_only;
        self
    }

    pub fn engine_settings(mut self, settings: EngineSettings) -> Self {
        self.engine_settings = Some(settings);
        self
    }

    /// Run the suite. The report is built and history persisted whether
    /// the run completes or aborts at the first failure.
    pub fn run(&mut self, ctx: &mut RunContext, journeys: &[Journey]) -> HarnessResult<RunReport> {
        let started = Instant::now();

        let summary = self.store.load_history();
        if summary.has_previous {
            info!(
                failed = summary.failed_count,
                passed = summary.passed_count,
                last_run = ?summary.last_run_time,
                "previous run found"
            );
        } else {
            info!("no previous test results found - running full suite");
        }

        let canonical: Vec<String> = journeys.iter().map(|j| j.name.clone()).collect();
        let strategy = if self.force_full {
            ExecutionStrategy {
                kind: StrategyKind::Full,
                reason: "force full run requested".to_string(),
                tests_to_run: canonical.clone(),
                failed_tests_count: 0,
            }
        } else if self.failed_only {
            self.store.failed_only_strategy(&canonical)
        } else {
            self.store.compute_strategy(&canonical)
        };

        info!(kind = %strategy.kind, "execution strategy: {}", strategy.reason);
        info!(tests = strategy.tests_to_run.len(), "tests to run");
        if strategy.kind == StrategyKind::ResumeFromFailed {
            if let Some(first) = strategy.tests_to_run.first() {
                info!(%first, failed = strategy.failed_tests_count, "resuming from first failed test");
            }
        }

        let mut engine = JourneyEngine::new(self.gateway, self.profile);
        if let Some(settings) = &self.engine_settings {
            engine = engine.with_settings(settings.clone());
        }

        let mut has_failures = false;
        for test_name in &strategy.tests_to_run {
            let Some(journey) = find_journey(journeys, test_name) else {
                let message = "no registered journey matches this test name";
                error!(test = %test_name, "{}", message);
                self.store
                    .record_result(test_name, false, Some(message), std::time::Duration::ZERO);
                has_failures = true;
                self.failure_report(ctx, test_name, message);
                break;
            };

            info!(test = %test_name, "running test");
            let test_started = Instant::now();
            let outcome = engine.run_journey(ctx, journey);
            let duration = test_started.elapsed();

            let error_text = outcome
                .error
                .clone()
                .or_else(|| (!outcome.passed).then(|| "postcondition failures".to_string()));
            self.store
                .record_result(test_name, outcome.passed, error_text.as_deref(), duration);

            if outcome.passed {
                info!(test = %test_name, ms = duration.as_millis() as u64, "PASSED");
            } else {
                let reason = error_text.as_deref().unwrap_or("unknown");
                error!(test = %test_name, ms = duration.as_millis() as u64, "FAILED: {}", reason);
                has_failures = true;
                self.failure_report(ctx, test_name, reason);
                error!("terminating remaining run at first failure");
                break;
            }
        }

        // History must reflect this run even after a fail-fast abort.
        self.store.persist()?;

        let statistics = self.store.statistics();
        info!(
            passed = statistics.current_passed,
            failed = statistics.current_failed,
            "run complete"
        );

        Ok(RunReport {
            success: !has_failures,
            run_id: self.store.run_id().to_string(),
            host: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            strategy,
            results: self.store.current_results().cloned().collect(),
            statistics,
            duration_ms: started.elapsed().as_millis() as u64,
            critical_errors: ctx.critical_errors().to_vec(),
            step_failures: ctx.step_failures().to_vec(),
        })
    }

    /// Multi-part failure report. Every diagnostic is captured
    /// independently so one failing probe does not hide the rest.
    fn failure_report(&self, ctx: &RunContext, test_name: &str, reason: &str) {
        error!(test = %test_name, "=== detailed failure analysis ===");
        error!(test = %test_name, "error: {}", reason);

        let mut report = format!(
            "Failed test: {}\nError: {}\nRun: {}\n\n",
            test_name, reason, ctx.run_id
        );

        // 1. Current UI state
        let device = Device::new(self.gateway);
        match device.snapshot("failure", &ctx.cancel) {
            Ok(snapshot) if !snapshot.is_empty() => {
                info!(nodes = snapshot.len(), "current UI state captured");
                report.push_str("--- UI state ---\n");
                report.push_str(&snapshot.sample(2000));
                report.push('\n');
            }
            Ok(_) => {
                warn!("UI hierarchy not available");
                report.push_str("--- UI state ---\nunavailable\n");
            }
            Err(err) => warn!(%err, "UI state probe failed"),
        }

        // 2. Recent log errors
        let logcat = Logcat::new(self.gateway);
        let log_lines = logcat.recent("(error|exception|crash|fatal)", 20);
        report.push_str("--- recent log errors ---\n");
        if log_lines.is_empty() {
            info!("no recent log errors found");
            report.push_str("none\n");
        } else {
            for line in &log_lines {
                info!("log: {}", line);
                report.push_str(line);
                report.push('\n');
            }
        }

        // 3. Application activity status
        self.probe(
            &mut report,
            "activity status",
            "adb shell dumpsys activity activities",
            Some(self.profile.package.as_str()),
        );

        // 4. Device build version
        self.probe(
            &mut report,
            "android version",
            "adb shell getprop ro.build.version.release",
            None,
        );

        // 5. Network status
        self.probe(
            &mut report,
            "network status",
            "adb shell dumpsys connectivity",
            Some("active network"),
        );

        // 6. Application memory status
        let meminfo = format!("adb shell dumpsys meminfo {}", self.profile.package);
        match self.gateway.run(&meminfo) {
            Ok(out) if out.success && !out.stdout.trim().is_empty() => {
                let head: String = out.stdout.chars().take(500).collect();
                info!("memory status:\n{}", head);
                report.push_str("--- memory status ---\n");
                report.push_str(&head);
                report.push('\n');
            }
            Ok(_) => info!("memory status unavailable"),
            Err(err) => warn!(%err, "memory probe failed"),
        }

        let path = ctx.session.log_path(&format!("failure-{}", test_name));
        if let Err(err) = std::fs::write(&path, &report) {
            warn!(%err, "failed to write failure report artifact");
        } else {
            info!(path = %path.display(), "failure report written");
        }
    }

    /// Run one diagnostic command, optionally keeping only lines that
    /// contain `filter` (case-insensitive).
    fn probe(&self, report: &mut String, title: &str, command: &str, filter: Option<&str>) {
        match self.gateway.run(command) {
            Ok(out) if out.success => {
                let text = match filter {
                    Some(needle) => {
                        let lowered = needle.to_lowercase();
                        out.stdout
                            .lines()
                            .filter(|l| l.to_lowercase().contains(&lowered))
                            .collect::<Vec<_>>()
                            .join("\n")
                    }
                    None => out.stdout.trim().to_string(),
                };
                if text.is_empty() {
                    info!("{}: no matching output", title);
                } else {
                    info!("{}:\n{}", title, text);
                    report.push_str(&format!("--- {} ---\n{}\n", title, text));
                }
            }
            Ok(out) => warn!("{} probe failed: {}", title, out.stderr.trim()),
            Err(err) => warn!(%err, "{} probe failed", title),
        }
    }
}

/// Match a test name from the strategy to a registered journey: exact
/// match first, then a normalized comparison that strips historical
/// prefixes and suffixes.
pub fn find_journey<'a>(journeys: &'a [Journey], test_name: &str) -> Option<&'a Journey> {
    journeys
        .iter()
        .find(|j| j.name == test_name)
        .or_else(|| {
            let wanted = normalize_test_name(test_name);
            journeys
                .iter()
                .find(|j| normalize_test_name(&j.name) == wanted)
        })
}

/// Normalize a test name for matching: drop a `.js` extension, the
/// `Journey-`/`Test-` prefixes, and the `-Validation` suffix, then
/// lowercase.
pub fn normalize_test_name(name: &str) -> String {
    let mut name = name.strip_suffix(".js").unwrap_or(name);
    for prefix in ["Journey-", "Test-"] {
        if let Some(stripped) = name.strip_prefix(prefix) {
            name = stripped;
        }
    }
    name = name.strip_suffix("-Validation").unwrap_or(name);
    name.to_lowercase()
}
