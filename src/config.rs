//! Configuration management with environment variable support.
//!
//! Centralized configuration for the harness, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults matching a stock local setup
//! - Programmatic overrides through the settings structs
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DROID_JOURNEY_ADB` | Path to the adb binary | `adb` |
//! | `DROID_JOURNEY_SERIAL` | Device serial for `adb -s` | unset |
//! | `DROID_JOURNEY_ARTIFACTS_DIR` | Base directory for artifact sessions | `./artifacts` |
//! | `DROID_JOURNEY_HISTORY_FILE` | Test-result history file | `./artifacts/test-results-history.json` |
//! | `DROID_JOURNEY_PACKAGE` | Application package under test | `com.example.capture` |
//! | `DROID_JOURNEY_POLL_INTERVAL` | Poll interval for waits (ms) | `500` |
//! | `DROID_JOURNEY_WAIT_TIMEOUT` | Default wait deadline (ms) | `10000` |
//! | `DROID_JOURNEY_STEP_BACKOFF` | Backoff before the single recheck (ms) | `1500` |

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default adb binary
pub const DEFAULT_ADB_PATH: &str = "adb";

/// Default artifacts base directory
pub const DEFAULT_ARTIFACTS_DIR: &str = "./artifacts";

/// Default test-result history file
pub const DEFAULT_HISTORY_FILE: &str = "./artifacts/test-results-history.json";

/// Default application package under test
pub const DEFAULT_PACKAGE: &str = "com.example.capture";

/// Default poll interval (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default wait deadline (milliseconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default backoff before a step's single recheck (milliseconds)
pub const DEFAULT_STEP_BACKOFF_MS: u64 = 1_500;

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the adb binary path
pub const ENV_ADB_PATH: &str = "DROID_JOURNEY_ADB";

/// Environment variable for the device serial
pub const ENV_SERIAL: &str = "DROID_JOURNEY_SERIAL";

/// Environment variable for the artifacts base directory
pub const ENV_ARTIFACTS_DIR: &str = "DROID_JOURNEY_ARTIFACTS_DIR";

/// Environment variable for the history file
pub const ENV_HISTORY_FILE: &str = "DROID_JOURNEY_HISTORY_FILE";

/// Environment variable for the package under test
pub const ENV_PACKAGE: &str = "DROID_JOURNEY_PACKAGE";

/// Environment variable for the poll interval
pub const ENV_POLL_INTERVAL: &str = "DROID_JOURNEY_POLL_INTERVAL";

/// Environment variable for the wait deadline
pub const ENV_WAIT_TIMEOUT: &str = "DROID_JOURNEY_WAIT_TIMEOUT";

/// Environment variable for the step backoff
pub const ENV_STEP_BACKOFF: &str = "DROID_JOURNEY_STEP_BACKOFF";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for the harness
#[derive(Debug, Clone)]
pub struct Config {
    /// Device access settings
    pub device: DeviceSettings,
    /// Artifact and history locations
    pub artifacts: ArtifactSettings,
    /// Wait and retry timing
    pub timing: TimingSettings,
}

/// Device access settings
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// Path to the adb binary
    pub adb_path: String,
    /// Device serial for `adb -s`, when set
    pub serial: Option<String>,
    /// Application package under test
    pub package: String,
}

/// Artifact and history locations
#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    /// Base directory for artifact sessions
    pub base_dir: String,
    /// Test-result history file
    pub history_file: String,
}

/// Wait and retry timing
#[derive(Debug, Clone)]
pub struct TimingSettings {
    /// Poll interval for bounded waits (milliseconds)
    pub poll_interval_ms: u64,
    /// Default wait deadline (milliseconds)
    pub wait_timeout_ms: u64,
    /// Backoff before a step's single recheck (milliseconds)
    pub step_backoff_ms: u64,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            device: DeviceSettings::from_env(),
            artifacts: ArtifactSettings::from_env(),
            timing: TimingSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            device: DeviceSettings::defaults(),
            artifacts: ArtifactSettings::defaults(),
            timing: TimingSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DeviceSettings {
    /// Create device settings from environment variables
    pub fn from_env() -> Self {
        Self {
            adb_path: env::var(ENV_ADB_PATH).unwrap_or_else(|_| DEFAULT_ADB_PATH.to_string()),
            serial: env::var(ENV_SERIAL).ok().filter(|s| !s.is_empty()),
            package: env::var(ENV_PACKAGE).unwrap_or_else(|_| DEFAULT_PACKAGE.to_string()),
        }
    }

    /// Create device settings with defaults
    pub fn defaults() -> Self {
        Self {
            adb_path: DEFAULT_ADB_PATH.to_string(),
            serial: None,
            package: DEFAULT_PACKAGE.to_string(),
        }
    }
}

impl ArtifactSettings {
    /// Create artifact settings from environment variables
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_ARTIFACTS_DIR)
                .unwrap_or_else(|_| DEFAULT_ARTIFACTS_DIR.to_string()),
            history_file: env::var(ENV_HISTORY_FILE)
                .unwrap_or_else(|_| DEFAULT_HISTORY_FILE.to_string()),
        }
    }

    /// Create artifact settings with defaults
    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_ARTIFACTS_DIR.to_string(),
            history_file: DEFAULT_HISTORY_FILE.to_string(),
        }
    }
}

impl TimingSettings {
    /// Create timing settings from environment variables
    pub fn from_env() -> Self {
        Self {
            poll_interval_ms: env::var(ENV_POLL_INTERVAL)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            wait_timeout_ms: env::var(ENV_WAIT_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WAIT_TIMEOUT_MS),
            step_backoff_ms: env::var(ENV_STEP_BACKOFF)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_STEP_BACKOFF_MS),
        }
    }

    /// Create timing settings with defaults
    pub fn defaults() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            step_backoff_ms: DEFAULT_STEP_BACKOFF_MS,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Get the artifacts base directory (convenience function)
pub fn artifacts_base_dir() -> String {
    get().artifacts.base_dir.clone()
}

/// Get the history file path (convenience function)
pub fn history_file() -> String {
    get().artifacts.history_file.clone()
}

/// Get the adb binary path (convenience function)
pub fn adb_path() -> String {
    get().device.adb_path.clone()
}
