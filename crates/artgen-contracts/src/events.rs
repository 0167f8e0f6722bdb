use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type ActivityFields = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    ImageGenerated,
    ImageCommitted,
    CommitFailed,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageGenerated => "image_generated",
            Self::ImageCommitted => "image_committed",
            Self::CommitFailed => "commit_failed",
        }
    }
}

/// Append-only JSONL audit trail of generation and commit outcomes.
///
/// Every line carries `event`, `request_id` and `ts`; the event's own fields
/// are merged after those and cannot override them.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    inner: Arc<ActivityLogInner>,
}

#[derive(Debug)]
struct ActivityLogInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(ActivityLogInner {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn append(
        &self,
        kind: ActivityKind,
        request_id: &str,
        fields: ActivityFields,
    ) -> anyhow::Result<Value> {
        let mut event = fields;
        event.insert("event".to_string(), Value::String(kind.as_str().to_string()));
        event.insert(
            "request_id".to_string(),
            Value::String(request_id.to_string()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("activity log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }

    /// Like [`ActivityLog::append`] but never fails; a write error is logged.
    pub fn record(&self, kind: ActivityKind, request_id: &str, fields: ActivityFields) {
        if let Err(err) = self.append(kind, request_id, fields) {
            tracing::warn!(
                path = %self.inner.path.display(),
                event = kind.as_str(),
                error = %err,
                "failed to append activity log entry"
            );
        }
    }
}

pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn append_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("var").join("activity.jsonl");
        let log = ActivityLog::new(&path);

        let mut fields = ActivityFields::new();
        fields.insert("file_uid".to_string(), Value::from(12));
        let emitted = log.append(ActivityKind::ImageCommitted, "req-1", fields)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["event"], Value::String("image_committed".to_string()));
        assert_eq!(parsed["request_id"], Value::String("req-1".to_string()));
        assert_eq!(parsed["file_uid"], Value::from(12));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn fields_cannot_override_envelope() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = ActivityLog::new(temp.path().join("activity.jsonl"));

        let mut fields = ActivityFields::new();
        fields.insert("event".to_string(), Value::String("spoofed".to_string()));
        fields.insert("request_id".to_string(), Value::String("other".to_string()));
        let emitted = log.append(ActivityKind::CommitFailed, "req-2", fields)?;

        assert_eq!(emitted["event"], Value::String("commit_failed".to_string()));
        assert_eq!(emitted["request_id"], Value::String("req-2".to_string()));
        Ok(())
    }

    #[test]
    fn append_adds_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("activity.jsonl");
        let log = ActivityLog::new(&path);

        log.append(ActivityKind::ImageGenerated, "a", ActivityFields::new())?;
        log.record(ActivityKind::ImageCommitted, "a", ActivityFields::new());

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(second["event"], Value::String("image_committed".to_string()));
        Ok(())
    }

    #[test]
    fn record_swallows_write_errors() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        // A directory where the log file should be makes every append fail.
        let path = temp.path().join("activity.jsonl");
        fs::create_dir_all(&path)?;
        let log = ActivityLog::new(&path);
        log.record(ActivityKind::CommitFailed, "x", ActivityFields::new());
        assert!(log.append(ActivityKind::CommitFailed, "x", ActivityFields::new()).is_err());
        Ok(())
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }
}
