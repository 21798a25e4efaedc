//! Device event-log access: snapshots of the log buffer, bounded pattern
//! waits, and a continuous filtered tail for forensic consumption.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::device::gateway::DeviceGateway;
use crate::wait::{CancelToken, WaitOutcome, poll_until};

/// How many matching lines a pattern wait reports back.
const PATTERN_CONTEXT_LINES: usize = 10;

fn compile(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, %err, "invalid log filter pattern");
            None
        }
    }
}

/// Read-side access to the device log through the gateway.
pub struct Logcat<'a> {
    gateway: &'a dyn DeviceGateway,
}

impl<'a> Logcat<'a> {
    pub fn new(gateway: &'a dyn DeviceGateway) -> Self {
        Self { gateway }
    }

    /// Clear the device log buffer.
    pub fn clear(&self) -> bool {
        self.gateway.run_ok("adb shell logcat -c")
    }

    /// Dump the current log buffer. Empty on failure.
    pub fn dump(&self) -> String {
        self.gateway
            .run("adb shell logcat -d")
            .map(|out| out.stdout)
            .unwrap_or_default()
    }

    /// The last `last` buffer lines matching `filter` (case-insensitive).
    pub fn recent(&self, filter: &str, last: usize) -> Vec<String> {
        let Some(re) = compile(filter) else {
            return Vec::new();
        };
        let dump = self.dump();
        let matching: Vec<&str> = dump.lines().filter(|l| re.is_match(l)).collect();
        let skip = matching.len().saturating_sub(last);
        matching[skip..].iter().map(|l| l.to_string()).collect()
    }

    /// Poll the log buffer until a line matches `pattern` or the deadline
    /// passes. The outcome carries the last few matching lines either way,
    /// so failures can show what the log actually contained.
    pub fn wait_for_pattern(
        &self,
        pattern: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> WaitOutcome<Vec<String>> {
        let Some(re) = compile(pattern) else {
            return WaitOutcome {
                found: false,
                value: None,
                elapsed: Duration::ZERO,
                attempts: 0,
            };
        };

        let mut outcome = poll_until(
            || {
                let dump = self.dump();
                let lines: Vec<String> = dump
                    .lines()
                    .filter(|l| re.is_match(l))
                    .map(|l| l.to_string())
                    .collect();
                if lines.is_empty() {
                    None
                } else {
                    let skip = lines.len().saturating_sub(PATTERN_CONTEXT_LINES);
                    Some(lines[skip..].to_vec())
                }
            },
            timeout,
            Duration::from_secs(1),
            cancel,
        );

        if !outcome.found {
            // Best-effort context for the caller's diagnostic.
            outcome.value = Some(self.recent(pattern, PATTERN_CONTEXT_LINES));
        }
        outcome
    }

    /// Write the last `last` matching buffer lines to `out_file`.
    pub fn save_recent(&self, filter: &str, out_file: &Path, last: usize) -> std::io::Result<()> {
        if let Some(dir) = out_file.parent() {
            fs::create_dir_all(dir)?;
        }
        let lines = self.recent(filter, last);
        fs::write(out_file, lines.join("\n"))
    }
}

/// Continuous log tail running beside the test flow.
///
/// Spawns the log stream as a child process with a reader thread that
/// appends matching lines to a sink file. Holds no shared state with the
/// orchestration logic; its lifecycle is independent of any single test.
pub struct LiveTail {
    child: Child,
    reader: Option<JoinHandle<()>>,
}

impl LiveTail {
    /// Start tailing. `filter` restricts the sink to matching lines;
    /// `None` keeps everything.
    pub fn start(adb_path: &str, filter: Option<&str>, out_file: &Path) -> std::io::Result<Self> {
        if let Some(dir) = out_file.parent() {
            fs::create_dir_all(dir)?;
        }
        let sink = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(out_file)?;

        let mut child = Command::new(adb_path)
            .arg("logcat")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::other("log tail child has no stdout")
        })?;
        let re = filter.and_then(compile);

        let reader = std::thread::spawn(move || {
            let mut sink = sink;
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if line.is_empty() {
                    continue;
                }
                if re.as_ref().map(|re| re.is_match(&line)).unwrap_or(true) {
                    if writeln!(sink, "{}", line).is_err() {
                        break;
                    }
                }
            }
            let _ = sink.flush();
            debug!("live log tail stream closed");
        });

        Ok(Self {
            child,
            reader: Some(reader),
        })
    }

    /// Stop the tail: kill the child stream and join the reader.
    pub fn stop(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LiveTail {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::gateway::ScriptedGateway;

    const LOG: &str = "01-01 10:00:00.000 I/ActivityManager: start ok\n\
01-01 10:00:01.000 E/CaptureService: ingest failed\n\
01-01 10:00:02.000 I/CaptureService: REQUEST_SUBMITTED id=9\n\
01-01 10:00:03.000 W/Choreographer: skipped frames";

    #[test]
    fn test_recent_filters_case_insensitively() {
        let gateway = ScriptedGateway::new().stub("logcat -d", LOG);
        let logcat = Logcat::new(&gateway);

        let lines = logcat.recent("captureservice", 10);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("REQUEST_SUBMITTED"));

        // Cap keeps only the most recent matches.
        let capped = logcat.recent("captureservice", 1);
        assert_eq!(capped.len(), 1);
        assert!(capped[0].contains("REQUEST_SUBMITTED"));
    }

    #[test]
    fn test_wait_for_pattern_found_immediately() {
        let gateway = ScriptedGateway::new().stub("logcat -d", LOG);
        let logcat = Logcat::new(&gateway);

        let outcome = logcat.wait_for_pattern(
            "request_submitted",
            Duration::from_secs(5),
            &CancelToken::new(),
        );
        assert!(outcome.found);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.value.unwrap()[0].contains("REQUEST_SUBMITTED"));
    }

    #[test]
    fn test_wait_for_pattern_timeout_reports_not_found() {
        let gateway = ScriptedGateway::new().stub("logcat -d", LOG);
        let logcat = Logcat::new(&gateway);

        let outcome = logcat.wait_for_pattern(
            "NEVER_LOGGED",
            Duration::from_millis(100),
            &CancelToken::new(),
        );
        assert!(!outcome.found);
        assert_eq!(outcome.value, Some(Vec::new()));
    }

    #[test]
    fn test_live_tail_writes_matching_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("tail.log");

        // `echo logcat` stands in for the adb binary: the tail spawns
        // `<adb> logcat`, so the child prints one line and exits.
        let tail = LiveTail::start("echo", Some("logcat"), &sink).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        tail.stop();

        let contents = fs::read_to_string(&sink).unwrap();
        assert!(contents.contains("logcat"));
    }
}
