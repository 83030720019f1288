use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::{ModelIdentity, ResolutionRule, Signal};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompileEvent {
    ModelResolved {
        display_model: ModelIdentity,
        effective_model: ModelIdentity,
        rule: ResolutionRule,
        signal: Option<Signal>,
        sticky_model: Option<ModelIdentity>,
        sticky_updated: bool,
    },
    RequestCompiled {
        effective_model: ModelIdentity,
        width: u32,
        height: u32,
        count: u32,
        cost: u64,
        inline_references: usize,
        uploaded_references: usize,
        templated: bool,
        warnings: Vec<String>,
    },
    CompileFailed {
        error: String,
    },
}

/// Append-only `events.jsonl` audit trail for one compose session.
///
/// Each line is a compact JSON object carrying `type`, `session_id` and `ts`
/// plus the event's own fields.
#[derive(Debug, Clone)]
pub struct CompileLog {
    inner: Arc<CompileLogInner>,
}

#[derive(Debug)]
struct CompileLogInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl CompileLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(CompileLogInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: &CompileEvent) -> anyhow::Result<Value> {
        let mut record = match serde_json::to_value(event)? {
            Value::Object(map) => map,
            other => anyhow::bail!("compile event serialized to non-object: {other}"),
        };
        record.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        record.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&record)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("compile log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(record))
    }
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
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let log = CompileLog::new(&path, "session-1");

        let emitted = log.emit(&CompileEvent::CompileFailed {
            error: "prompt is empty".to_string(),
        })?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        assert!(!line.contains('\n'));
        let parsed: Value = serde_json::from_str(line)?;
        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], "compile_failed");
        assert_eq!(parsed["session_id"], "session-1");
        assert_eq!(parsed["error"], "prompt is empty");
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn emit_appends_typed_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = CompileLog::new(&path, "session-1");

        log.emit(&CompileEvent::ModelResolved {
            display_model: ModelIdentity::AutoModel,
            effective_model: ModelIdentity::ArtPro,
            rule: ResolutionRule::Default,
            signal: Some(Signal::None),
            sticky_model: None,
            sticky_updated: false,
        })?;
        log.emit(&CompileEvent::RequestCompiled {
            effective_model: ModelIdentity::ArtPro,
            width: 1280,
            height: 1280,
            count: 1,
            cost: 15,
            inline_references: 0,
            uploaded_references: 0,
            templated: false,
            warnings: Vec::new(),
        })?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<Value> = content
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "model_resolved");
        assert_eq!(lines[0]["display_model"], "Auto Model");
        assert_eq!(lines[0]["rule"], "default");
        assert_eq!(lines[1]["type"], "request_compiled");
        assert_eq!(lines[1]["cost"], 15);
        Ok(())
    }
}
