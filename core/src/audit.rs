//! Structured audit trail, kept deliberately separate from the `tracing`
//! diagnostic stream: one append-only JSON-lines file (plus a mirrored
//! `tracing` event on the `"audit"` target) recording every Canvas API call
//! and code-execution attempt, for FERPA-relevant after-the-fact review.
//! Never logs response bodies or raw exception text — only method, a
//! digit-redacted endpoint, and a status.

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Result;

const MAX_BYTES: u64 = 10 * 1024 * 1024;
const BACKUP_COUNT: u32 = 5;
const AUDIT_FILENAME: &str = "audit.jsonl";

pub struct AuditLog {
    access_events_enabled: bool,
    execution_events_enabled: bool,
    writer: Option<Mutex<RotatingFileWriter>>,
}

impl AuditLog {
    /// Builds the audit log. If both event categories are disabled, no file
    /// handler is installed and every `log_*` call is a no-op. If the log
    /// directory can't be created, falls back to stderr-only (via `tracing`)
    /// rather than failing startup.
    pub fn init(
        log_dir: &Path,
        access_events_enabled: bool,
        execution_events_enabled: bool,
    ) -> Result<Self> {
        if !access_events_enabled && !execution_events_enabled {
            return Ok(AuditLog {
                access_events_enabled,
                execution_events_enabled,
                writer: None,
            });
        }

        let writer = match RotatingFileWriter::new(log_dir.join(AUDIT_FILENAME), MAX_BYTES, BACKUP_COUNT) {
            Ok(writer) => Some(Mutex::new(writer)),
            Err(err) => {
                tracing::warn!(error = %err, dir = %log_dir.display(), "could not open audit log directory; falling back to stderr only");
                None
            }
        };

        Ok(AuditLog {
            access_events_enabled,
            execution_events_enabled,
            writer,
        })
    }

    pub async fn log_data_access(&self, method: &str, endpoint: &str, status: &str, error: Option<&str>) {
        if !self.access_events_enabled {
            return;
        }
        let mut event = serde_json::json!({
            "event_type": "data_access",
            "method": method.to_uppercase(),
            "endpoint": sanitize_endpoint(endpoint),
            "status": status,
        });
        if let Some(error) = error {
            event["error"] = Value::String(error.to_string());
        }
        self.emit(event).await;
    }

    pub async fn log_code_execution(
        &self,
        code_hash: &str,
        sandbox_mode: &str,
        status: &str,
        duration_sec: Option<f64>,
        error: Option<&str>,
    ) {
        if !self.execution_events_enabled {
            return;
        }
        let mut event = serde_json::json!({
            "event_type": "code_execution",
            "code_hash": code_hash,
            "sandbox_mode": sandbox_mode,
            "status": status,
        });
        if let Some(duration_sec) = duration_sec {
            event["duration_sec"] = serde_json::json!((duration_sec * 1000.0).round() / 1000.0);
        }
        if let Some(error) = error {
            event["error"] = Value::String(error.to_string());
        }
        self.emit(event).await;
    }

    async fn emit(&self, mut event: Value) {
        event["timestamp"] = Value::String(chrono::Utc::now().to_rfc3339());
        let line = event.to_string();
        tracing::info!(target: "audit", "{line}");
        if let Some(writer) = &self.writer {
            let mut writer = writer.lock().await;
            if let Err(err) = writer.write_line(&line) {
                tracing::warn!(error = %err, "failed to append to audit log file");
            }
        }
    }
}

/// Replaces numeric path segments with `***` so audit entries never leak
/// Canvas user/course/assignment IDs: `/courses/12345/users/678` becomes
/// `/courses/***/users/***`.
pub fn sanitize_endpoint(endpoint: &str) -> String {
    let mut result = String::with_capacity(endpoint.len());
    let mut chars = endpoint.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek().is_some_and(|next| next.is_ascii_digit()) {
            result.push('/');
            result.push_str("***");
            while chars.peek().is_some_and(|next| next.is_ascii_digit()) {
                chars.next();
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Size-based rotating append-only writer: `audit.jsonl`, `audit.jsonl.1`, ...
/// `audit.jsonl.5`. No crate in the dependency stack implements
/// size-plus-backup-count rotation, so it's hand-rolled here.
struct RotatingFileWriter {
    path: PathBuf,
    max_bytes: u64,
    backup_count: u32,
    file: std::fs::File,
    size: u64,
}

impl RotatingFileWriter {
    fn new(path: PathBuf, max_bytes: u64, backup_count: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(RotatingFileWriter {
            path,
            max_bytes,
            backup_count,
            file,
            size,
        })
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        if self.size >= self.max_bytes {
            self.rotate()?;
        }
        writeln!(self.file, "{line}")?;
        self.size += line.len() as u64 + 1;
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        for i in (1..self.backup_count).rev() {
            let from = self.backup_path(i);
            let to = self.backup_path(i + 1);
            if from.exists() {
                std::fs::rename(from, to)?;
            }
        }
        std::fs::rename(&self.path, self.backup_path(1))?;
        self.file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.size = 0;
        Ok(())
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_redacts_numeric_segments() {
        assert_eq!(
            sanitize_endpoint("/courses/12345/users/678"),
            "/courses/***/users/***"
        );
        assert_eq!(sanitize_endpoint("/courses/self"), "/courses/self");
    }

    #[tokio::test]
    async fn disabled_categories_never_touch_disk() {
        let dir = tempdir().unwrap();
        let log = AuditLog::init(dir.path(), false, false).unwrap();
        log.log_data_access("GET", "/courses/1", "success", None).await;
        assert!(!dir.path().join(AUDIT_FILENAME).exists());
    }

    #[tokio::test]
    async fn access_event_is_appended_as_jsonl() {
        let dir = tempdir().unwrap();
        let log = AuditLog::init(dir.path(), true, false).unwrap();
        log.log_data_access("get", "/courses/42", "success", None).await;
        let contents = std::fs::read_to_string(dir.path().join(AUDIT_FILENAME)).unwrap();
        let line: Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(line["event_type"], "data_access");
        assert_eq!(line["method"], "GET");
        assert_eq!(line["endpoint"], "/courses/***");
        assert!(line["timestamp"].is_string());
    }

    #[test]
    fn rotating_writer_rolls_backups_past_max_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(AUDIT_FILENAME);
        let mut writer = RotatingFileWriter::new(path.clone(), 20, 2).unwrap();
        writer.write_line("0123456789").unwrap();
        writer.write_line("0123456789").unwrap();
        writer.write_line("next-file").unwrap();
        assert!(path.exists());
        assert!(dir.path().join("audit.jsonl.1").exists());
    }
}
