//! Artifact session management.
//!
//! Each run owns one session directory with `ui/` (hierarchy dumps,
//! screenshots) and `logs/` (filtered log tails, failure reports)
//! subdirectories. Artifact filenames are keyed by a sanitized tag plus a
//! timestamp, so forensic bundles from successive failures never collide.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config;

/// An artifact session rooted at one directory.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Root directory for this session
    pub dir: PathBuf,
    /// Whether to keep files after the session ends
    pub keep: bool,
}

impl Session {
    /// Create a new session with a unique ID under the configured
    /// artifacts base directory.
    pub fn new() -> Self {
        let id = generate_session_id();
        let dir = PathBuf::from(config::artifacts_base_dir()).join(&id);

        Self {
            id,
            dir,
            keep: false,
        }
    }

    /// Create a session with a specific name prefix.
    pub fn with_name(name: &str) -> Self {
        let id = format!("{}_{}", sanitize_tag(name), generate_timestamp());
        let dir = PathBuf::from(config::artifacts_base_dir()).join(&id);

        Self {
            id,
            dir,
            keep: false,
        }
    }

    /// Create a session in a caller-chosen directory. Such sessions are
    /// kept by default.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_session_id);

        Self {
            id,
            dir,
            keep: true,
        }
    }

    /// Set whether to keep files after the session ends.
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Create the session directory tree and write session metadata.
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.ui_dir())?;
        fs::create_dir_all(self.logs_dir())?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
            "host": host,
        });

        let metadata_path = self.dir.join(".session.json");
        fs::write(metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        Ok(())
    }

    /// Directory for UI artifacts (hierarchy dumps, screenshots).
    pub fn ui_dir(&self) -> PathBuf {
        self.dir.join("ui")
    }

    /// Directory for log artifacts (filtered tails, failure reports).
    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }

    /// Path for a UI artifact, e.g. `ui/dump-ShareIngest_pre-20250805_101500.xml`.
    pub fn ui_path(&self, kind: &str, tag: &str, ext: &str) -> PathBuf {
        self.ui_dir().join(format!(
            "{}-{}-{}.{}",
            kind,
            sanitize_tag(tag),
            generate_timestamp(),
            ext
        ))
    }

    /// Path for a log artifact, e.g. `logs/share-ingest-20250805_101500.log`.
    pub fn log_path(&self, tag: &str) -> PathBuf {
        self.logs_dir().join(format!(
            "{}-{}.log",
            sanitize_tag(tag),
            generate_timestamp()
        ))
    }

    /// Remove the session directory unless it is being kept.
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("session_{}_{}", timestamp, pid)
}

/// Generate a timestamp suffix in YYYYMMDD_HHMMSS format
pub fn generate_timestamp() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a tag for use in filenames
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert!(session.id.starts_with("session_"));
        assert!(!session.keep);
    }

    #[test]
    fn test_session_in_dir_kept_by_default() {
        let session = Session::in_dir("./artifacts/run-1");
        assert!(session.keep);
        assert_eq!(session.id, "run-1");
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("ShareIngest:pre"), "ShareIngest_pre");
        assert_eq!(sanitize_tag("a b/c"), "a_b_c");
        assert_eq!(sanitize_tag("ok-tag_9"), "ok-tag_9");
    }

    #[test]
    fn test_artifact_paths_land_in_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::in_dir(dir.path().join("s"));
        session.init().unwrap();

        let dump = session.ui_path("dump", "Launch:post", "xml");
        assert!(dump.starts_with(session.ui_dir()));
        let name = dump.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("dump-Launch_post-"));
        assert!(name.ends_with(".xml"));

        let log = session.log_path("failure");
        assert!(log.starts_with(session.logs_dir()));
    }
}
