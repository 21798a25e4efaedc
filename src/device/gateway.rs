//! Device command gateway.
//!
//! The harness core never talks to a transport directly; everything goes
//! through the [`DeviceGateway`] trait, which only requires synchronous
//! command execution with captured output. [`AdbGateway`] shells out to
//! the adb binary; [`ScriptedGateway`] replays canned responses for tests.

use std::collections::VecDeque;
use std::process::Command;
use std::sync::Mutex;

/// Captured result of one device command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Whether the command exited with status 0
    pub success: bool,

    /// Captured standard output (lossy UTF-8)
    pub stdout: String,

    /// Captured standard error (lossy UTF-8)
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for gateway operations
#[derive(Debug)]
pub enum GatewayError {
    /// The command line could not be spawned at all
    Spawn { command: String, source: std::io::Error },

    /// The command string was empty or unparseable
    InvalidCommand(String),

    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Spawn { command, source } => {
                write!(f, "failed to spawn '{}': {}", command, source)
            }
            GatewayError::InvalidCommand(cmd) => write!(f, "invalid command: '{}'", cmd),
            GatewayError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Spawn { source, .. } => Some(source),
            GatewayError::InvalidCommand(_) => None,
            GatewayError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err)
    }
}

/// Synchronous command execution against a device.
///
/// Commands are full command lines (e.g. `adb shell input tap 540 960`);
/// the gateway decides how to execute them and returns captured output.
pub trait DeviceGateway: Send + Sync {
    /// Run a command and capture its output as text.
    fn run(&self, command: &str) -> GatewayResult<CommandOutput>;

    /// Run a command and capture raw stdout bytes (for binary payloads).
    fn run_raw(&self, command: &str) -> GatewayResult<Vec<u8>>;

    /// Run a command, reporting only whether it succeeded.
    fn run_ok(&self, command: &str) -> bool {
        self.run(command).map(|out| out.success).unwrap_or(false)
    }

    /// Pull a file off the device.
    fn pull_file(&self, remote_path: &str) -> GatewayResult<Vec<u8>> {
        self.run_raw(&format!("adb exec-out cat {}", remote_path))
    }

    /// Capture a screenshot as PNG bytes.
    fn screenshot(&self) -> GatewayResult<Vec<u8>> {
        self.run_raw("adb exec-out screencap -p")
    }
}

/// Split a command line into tokens, honoring double and single quotes.
/// Returns `None` for unterminated quotes or an empty line.
pub fn split_command(command: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in command.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }

    if quote.is_some() {
        return None;
    }
    if in_token {
        tokens.push(current);
    }
    if tokens.is_empty() { None } else { Some(tokens) }
}

/// Gateway that executes commands through the adb binary.
#[derive(Debug, Clone)]
pub struct AdbGateway {
    /// Path to the adb binary
    adb_path: String,

    /// Device serial for `-s`, when more than one device is attached
    serial: Option<String>,
}

impl AdbGateway {
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: None,
        }
    }

    pub fn serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Tokenize and rewrite a command line: a leading `adb` token is
    /// replaced by the configured binary path plus `-s <serial>`.
    fn build(&self, command: &str) -> GatewayResult<Command> {
        let tokens = split_command(command)
            .ok_or_else(|| GatewayError::InvalidCommand(command.to_string()))?;

        let mut iter = tokens.into_iter();
        let first = iter.next().unwrap_or_default();

        let mut cmd = if first == "adb" {
            let mut cmd = Command::new(&self.adb_path);
            if let Some(serial) = &self.serial {
                cmd.arg("-s").arg(serial);
            }
            cmd
        } else {
            Command::new(first)
        };
        cmd.args(iter);
        Ok(cmd)
    }
}

impl DeviceGateway for AdbGateway {
    fn run(&self, command: &str) -> GatewayResult<CommandOutput> {
        let output = self
            .build(command)?
            .output()
            .map_err(|source| GatewayError::Spawn {
                command: command.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_raw(&self, command: &str) -> GatewayResult<Vec<u8>> {
        let output = self
            .build(command)?
            .output()
            .map_err(|source| GatewayError::Spawn {
                command: command.to_string(),
                source,
            })?;
        Ok(output.stdout)
    }
}

/// Test-double gateway replaying canned responses.
///
/// Responses are registered against a substring of the command line. When
/// several responses share a pattern they are played back in order, with
/// the last one repeating; this lets a test script a UI that changes
/// between hierarchy dumps. Every executed command is recorded.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    rules: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    raw_rules: Mutex<Vec<(String, Vec<u8>)>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a successful response for commands containing `pattern`.
    pub fn stub(self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.push(pattern.into(), CommandOutput::ok(stdout));
        self
    }

    /// Register a failing response for commands containing `pattern`.
    pub fn stub_failure(self, pattern: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.push(pattern.into(), CommandOutput::failed(stderr));
        self
    }

    /// Register raw bytes for `run_raw` commands containing `pattern`.
    pub fn stub_raw(self, pattern: impl Into<String>, bytes: Vec<u8>) -> Self {
        if let Ok(mut raw) = self.raw_rules.lock() {
            raw.push((pattern.into(), bytes));
        }
        self
    }

    fn push(&self, pattern: String, output: CommandOutput) {
        if let Ok(mut rules) = self.rules.lock() {
            if let Some((_, queue)) = rules.iter_mut().find(|(p, _)| *p == pattern) {
                queue.push_back(output);
            } else {
                let mut queue = VecDeque::new();
                queue.push_back(output);
                rules.push((pattern, queue));
            }
        }
    }

    /// Commands executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether any executed command contains `pattern`.
    pub fn saw(&self, pattern: &str) -> bool {
        self.executed().iter().any(|c| c.contains(pattern))
    }
}

impl DeviceGateway for ScriptedGateway {
    fn run(&self, command: &str) -> GatewayResult<CommandOutput> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_string());
        }
        let Ok(mut rules) = self.rules.lock() else {
            return Ok(CommandOutput::failed("poisoned"));
        };
        for (pattern, queue) in rules.iter_mut() {
            if command.contains(pattern.as_str()) {
                let output = if queue.len() > 1 {
                    queue.pop_front().unwrap_or_default()
                } else {
                    queue.front().cloned().unwrap_or_default()
                };
                return Ok(output);
            }
        }
        // Unscripted commands succeed with empty output so incidental
        // taps and key events don't need stubs.
        Ok(CommandOutput::ok(""))
    }

    fn run_raw(&self, command: &str) -> GatewayResult<Vec<u8>> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_string());
        }
        let raw = self.raw_rules.lock().map(|r| r.clone()).unwrap_or_default();
        for (pattern, bytes) in raw {
            if command.contains(&pattern) {
                return Ok(bytes);
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_plain() {
        assert_eq!(
            split_command("adb shell input tap 540 960"),
            Some(vec![
                "adb".to_string(),
                "shell".to_string(),
                "input".to_string(),
                "tap".to_string(),
                "540".to_string(),
                "960".to_string(),
            ])
        );
    }

    #[test]
    fn test_split_command_quoted() {
        let tokens = split_command(r#"adb shell am start --es extra.TEXT "https://example.com/v?id=1""#)
            .unwrap();
        assert_eq!(tokens.last().unwrap(), "https://example.com/v?id=1");
    }

    #[test]
    fn test_split_command_rejects_unterminated_quote() {
        assert_eq!(split_command(r#"adb shell echo "oops"#), None);
        assert_eq!(split_command("   "), None);
    }

    #[test]
    fn test_scripted_gateway_sequences_responses() {
        let gateway = ScriptedGateway::new()
            .stub("uiautomator dump", "first")
            .stub("uiautomator dump", "second");

        let a = gateway.run("adb exec-out uiautomator dump /dev/tty").unwrap();
        let b = gateway.run("adb exec-out uiautomator dump /dev/tty").unwrap();
        let c = gateway.run("adb exec-out uiautomator dump /dev/tty").unwrap();
        assert_eq!(a.stdout, "first");
        assert_eq!(b.stdout, "second");
        // Last response repeats.
        assert_eq!(c.stdout, "second");
    }

    #[test]
    fn test_scripted_gateway_records_commands() {
        let gateway = ScriptedGateway::new();
        assert!(gateway.run_ok("adb shell input tap 1 2"));
        assert!(gateway.saw("input tap 1 2"));
        assert!(!gateway.saw("input text"));
    }
}
