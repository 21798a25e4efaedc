//! Persistent test-result history and execution planning.
//!
//! The store keeps one record per test name across runs (last write wins)
//! and uses the previous run's failures to decide the next run's order.
//! The default resumption strategy restarts at the *earliest* previously
//! failed test and runs the canonical order from there to the end, because
//! later journeys assume the device state earlier journeys produced;
//! rerunning only the failed tests in isolation is offered separately.
//!
//! The history is read once at run start and written once at run end, on
//! both the success and the abort path, so the next run always sees
//! accurate history even after a fail-fast termination. Concurrent runner
//! processes against one history file are not supported.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one test in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultRecord {
    pub test_name: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
}

/// How the next run should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Run everything in canonical order
    Full,
    /// Run only previously failed tests, canonical order preserved
    FailedFirst,
    /// Run the canonical order from the earliest failed test to the end
    ResumeFromFailed,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Full => write!(f, "full"),
            StrategyKind::FailedFirst => write!(f, "failed-first"),
            StrategyKind::ResumeFromFailed => write!(f, "resume-from-failed"),
        }
    }
}

/// Execution plan computed once per run, immutable afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStrategy {
    pub kind: StrategyKind,
    pub reason: String,
    pub tests_to_run: Vec<String>,
    pub failed_tests_count: usize,
}

/// Summary block of the persisted history document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub success_rate: f64,
}

/// What a history load found.
#[derive(Debug, Clone)]
pub struct HistorySummary {
    pub has_previous: bool,
    pub failed_count: usize,
    pub passed_count: usize,
    pub last_run_time: Option<DateTime<Utc>>,
}

/// On-disk history document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryDocument {
    last_run_time: Option<DateTime<Utc>>,
    run_id: String,
    /// `[testName, record]` pairs; `failedTests` is the legacy field name
    #[serde(alias = "failedTests")]
    results: Vec<(String, TestResultRecord)>,
    #[serde(default)]
    summary: RunSummary,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types for store operations
#[derive(Debug)]
pub enum StoreError {
    /// I/O error
    Io(std::io::Error),

    /// Serialization error
    Serialization(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "I/O error: {}", err),
            StoreError::Serialization(err) => write!(f, "serialization error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            StoreError::Serialization(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    pub current_total: usize,
    pub current_passed: usize,
    pub current_failed: usize,
    pub has_previous: bool,
    pub previous_failed: usize,
    pub previous_passed: usize,
    pub last_run_time: Option<DateTime<Utc>>,
}

/// Per-test pass/fail history with cross-run persistence.
#[derive(Debug)]
pub struct TestResultStore {
    path: PathBuf,
    run_id: String,
    previous: Vec<(String, TestResultRecord)>,
    current: Vec<(String, TestResultRecord)>,
    failed: BTreeSet<String>,
    passed: BTreeSet<String>,
    has_previous: bool,
    last_run_time: Option<DateTime<Utc>>,
}

impl TestResultStore {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            run_id: run_id.into(),
            previous: Vec::new(),
            current: Vec::new(),
            failed: BTreeSet::new(),
            passed: BTreeSet::new(),
            has_previous: false,
            last_run_time: None,
        }
    }

    /// Load the previous run's results, if any. A missing or unreadable
    /// file is treated as "no history".
    pub fn load_history(&mut self) -> HistorySummary {
        if let Ok(data) = fs::read_to_string(&self.path) {
            match serde_json::from_str::<HistoryDocument>(&data) {
                Ok(doc) => {
                    for (name, record) in &doc.results {
                        if record.success {
                            self.passed.insert(name.clone());
                        } else {
                            self.failed.insert(name.clone());
                        }
                    }
                    self.last_run_time = doc.last_run_time;
                    self.previous = doc.results;
                    self.has_previous = true;
                }
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), %err, "unreadable result history, starting fresh");
                }
            }
        }

        HistorySummary {
            has_previous: self.has_previous,
            failed_count: self.failed.len(),
            passed_count: self.passed.len(),
            last_run_time: self.last_run_time,
        }
    }

    /// Record one test result for the current run.
    pub fn record_result(
        &mut self,
        test_name: &str,
        success: bool,
        error: Option<&str>,
        duration: Duration,
    ) {
        let record = TestResultRecord {
            test_name: test_name.to_string(),
            success,
            error: error.map(|e| e.to_string()),
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
        };

        if let Some(entry) = self.current.iter_mut().find(|(name, _)| name == test_name) {
            entry.1 = record;
        } else {
            self.current.push((test_name.to_string(), record));
        }

        if success {
            self.passed.insert(test_name.to_string());
            self.failed.remove(test_name);
        } else {
            self.failed.insert(test_name.to_string());
            self.passed.remove(test_name);
        }
    }

    /// Compute the resumption strategy for the given canonical test order.
    pub fn compute_strategy(&self, all_tests: &[String]) -> ExecutionStrategy {
        if !self.has_previous {
            return full(all_tests, "no previous test results found");
        }
        if self.failed.is_empty() {
            return full(all_tests, "no failed tests from previous runs");
        }

        let available: Vec<&String> = all_tests.iter().filter(|t| self.failed.contains(*t)).collect();
        if available.is_empty() {
            return full(all_tests, "no previously failed tests in current suite");
        }

        // Resume at the earliest failed test and run everything after it,
        // preserving intra-journey ordering dependencies.
        let resume_index = all_tests
            .iter()
            .position(|t| self.failed.contains(t))
            .unwrap_or(0);
        let tests_to_run: Vec<String> = all_tests[resume_index..].to_vec();

        ExecutionStrategy {
            kind: StrategyKind::ResumeFromFailed,
            reason: format!(
                "resuming from first failed test ({}) - running {} of {} tests",
                all_tests[resume_index],
                tests_to_run.len(),
                all_tests.len()
            ),
            tests_to_run,
            failed_tests_count: available.len(),
        }
    }

    /// Isolated re-validation: only the previously failed tests, in
    /// canonical order. Falls back to a full run when nothing failed.
    pub fn failed_only_strategy(&self, all_tests: &[String]) -> ExecutionStrategy {
        let available: Vec<String> = all_tests
            .iter()
            .filter(|t| self.failed.contains(*t))
            .cloned()
            .collect();
        if !self.has_previous || available.is_empty() {
            return full(all_tests, "no previously failed tests to isolate");
        }
        ExecutionStrategy {
            kind: StrategyKind::FailedFirst,
            failed_tests_count: available.len(),
            reason: format!(
                "isolated re-validation of {} previously failed tests",
                available.len()
            ),
            tests_to_run: available,
        }
    }

    /// Write the history document atomically (temp file + rename).
    ///
    /// Records from earlier runs that were not re-executed are carried
    /// forward; current-run records win on name collisions.
    pub fn persist(&self) -> StoreResult<()> {
        let mut merged: Vec<(String, TestResultRecord)> = Vec::new();
        for (name, record) in &self.previous {
            let newest = self
                .current
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| record.clone());
            merged.push((name.clone(), newest));
        }
        for (name, record) in &self.current {
            if !merged.iter().any(|(n, _)| n == name) {
                merged.push((name.clone(), record.clone()));
            }
        }

        let total = self.current.len();
        let passed = self.current.iter().filter(|(_, r)| r.success).count();
        let doc = HistoryDocument {
            last_run_time: Some(Utc::now()),
            run_id: self.run_id.clone(),
            results: merged,
            summary: RunSummary {
                total,
                passed,
                failed: total - passed,
                success_rate: if total > 0 {
                    passed as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            },
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Remove the history file and reset in-memory state.
    pub fn clear(&mut self) -> StoreResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.previous.clear();
        self.current.clear();
        self.failed.clear();
        self.passed.clear();
        self.has_previous = false;
        self.last_run_time = None;
        Ok(())
    }

    pub fn failed_from_previous(&self) -> Vec<String> {
        self.failed.iter().cloned().collect()
    }

    pub fn current_results(&self) -> impl Iterator<Item = &TestResultRecord> {
        self.current.iter().map(|(_, r)| r)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn statistics(&self) -> StoreStatistics {
        let current_passed = self.current.iter().filter(|(_, r)| r.success).count();
        StoreStatistics {
            current_total: self.current.len(),
            current_passed,
            current_failed: self.current.len() - current_passed,
            has_previous: self.has_previous,
            previous_failed: self
                .previous
                .iter()
                .filter(|(_, r)| !r.success)
                .count(),
            previous_passed: self
                .previous
                .iter()
                .filter(|(_, r)| r.success)
                .count(),
            last_run_time: self.last_run_time,
        }
    }
}

fn full(all_tests: &[String], reason: &str) -> ExecutionStrategy {
    ExecutionStrategy {
        kind: StrategyKind::Full,
        reason: reason.to_string(),
        tests_to_run: all_tests.to_vec(),
        failed_tests_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_strategy_full_without_history() {
        let store = TestResultStore::new("/nonexistent/history.json", "run_1");
        let all = names(&["A", "B", "C"]);
        let strategy = store.compute_strategy(&all);
        assert_eq!(strategy.kind, StrategyKind::Full);
        assert_eq!(strategy.tests_to_run, all);
        assert_eq!(strategy.failed_tests_count, 0);
    }

    #[test]
    fn test_strategy_resumes_from_earliest_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut first = TestResultStore::new(&path, "run_1");
        first.load_history();
        first.record_result("A", true, None, Duration::from_millis(10));
        first.record_result("B", true, None, Duration::from_millis(10));
        first.record_result("C", false, Some("boom"), Duration::from_millis(10));
        first.persist().unwrap();

        let mut second = TestResultStore::new(&path, "run_2");
        second.load_history();
        let all = names(&["A", "B", "C", "D", "E"]);
        let strategy = second.compute_strategy(&all);

        assert_eq!(strategy.kind, StrategyKind::ResumeFromFailed);
        assert_eq!(strategy.tests_to_run, names(&["C", "D", "E"]));
        assert_eq!(strategy.failed_tests_count, 1);
    }

    #[test]
    fn test_strategy_full_when_failed_set_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut first = TestResultStore::new(&path, "run_1");
        first.load_history();
        first.record_result("Old", false, Some("gone"), Duration::from_millis(5));
        first.persist().unwrap();

        let mut second = TestResultStore::new(&path, "run_2");
        second.load_history();
        let all = names(&["A", "B"]);
        let strategy = second.compute_strategy(&all);
        assert_eq!(strategy.kind, StrategyKind::Full);
        assert_eq!(strategy.tests_to_run, all);
    }

    #[test]
    fn test_failed_only_preserves_canonical_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut first = TestResultStore::new(&path, "run_1");
        first.load_history();
        first.record_result("D", false, None, Duration::from_millis(5));
        first.record_result("B", false, None, Duration::from_millis(5));
        first.persist().unwrap();

        let mut second = TestResultStore::new(&path, "run_2");
        second.load_history();
        let strategy = second.failed_only_strategy(&names(&["A", "B", "C", "D"]));
        assert_eq!(strategy.kind, StrategyKind::FailedFirst);
        assert_eq!(strategy.tests_to_run, names(&["B", "D"]));
    }

    #[test]
    fn test_persist_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = TestResultStore::new(&path, "run_1");
        store.load_history();
        store.record_result("Login", false, Some("not found"), Duration::from_millis(120));
        store.persist().unwrap();

        let mut reloaded = TestResultStore::new(&path, "run_2");
        let summary = reloaded.load_history();
        assert!(summary.has_previous);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(reloaded.failed_from_previous(), names(&["Login"]));

        let record = &reloaded.previous[0].1;
        assert_eq!(record.error.as_deref(), Some("not found"));
        assert_eq!(record.duration_ms, 120);
        assert_eq!(record.run_id, "run_1");
    }

    #[test]
    fn test_load_accepts_legacy_field_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let legacy = serde_json::json!({
            "lastRunTime": "2025-07-01T10:00:00Z",
            "runId": "run_0",
            "failedTests": [[
                "Login",
                {
                    "testName": "Login",
                    "success": false,
                    "error": "no button",
                    "durationMs": 80,
                    "timestamp": "2025-07-01T10:00:00Z",
                    "runId": "run_0"
                }
            ]],
            "summary": { "total": 1, "passed": 0, "failed": 1, "successRate": 0.0 }
        });
        fs::write(&path, legacy.to_string()).unwrap();

        let mut store = TestResultStore::new(&path, "run_1");
        let summary = store.load_history();
        assert!(summary.has_previous);
        assert_eq!(store.failed_from_previous(), names(&["Login"]));
    }

    #[test]
    fn test_persist_carries_forward_unrerun_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut first = TestResultStore::new(&path, "run_1");
        first.load_history();
        first.record_result("A", true, None, Duration::from_millis(5));
        first.record_result("B", false, None, Duration::from_millis(5));
        first.persist().unwrap();

        // Second run only re-executes B (resume semantics) and passes it.
        let mut second = TestResultStore::new(&path, "run_2");
        second.load_history();
        second.record_result("B", true, None, Duration::from_millis(5));
        second.persist().unwrap();

        let mut third = TestResultStore::new(&path, "run_3");
        let summary = third.load_history();
        assert_eq!(summary.passed_count, 2);
        assert_eq!(summary.failed_count, 0);
    }
}
