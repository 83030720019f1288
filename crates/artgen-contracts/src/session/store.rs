use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

use crate::models::ResolverState;

/// `ResolverState` per session id, kept in one JSON object on disk.
///
/// Every read reloads the file and every save merges only the sessions this
/// instance touched, so two compose sessions sharing a file do not clobber
/// each other.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    payload: Option<Map<String, Value>>,
    dirty_keys: Vec<String>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload: None,
            dirty_keys: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable entries start a fresh session.
    pub fn load(&mut self, session_id: &str) -> ResolverState {
        let Some(raw) = self.reload().get(session_id).cloned() else {
            return ResolverState::default();
        };
        match serde_json::from_value(raw) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(session_id, error = %err, "discarding malformed session state");
                ResolverState::default()
            }
        }
    }

    pub fn save(&mut self, session_id: &str, state: &ResolverState) -> anyhow::Result<()> {
        let snapshot = serde_json::to_value(state)?;
        let payload = self.reload();
        if payload.get(session_id) == Some(&snapshot) {
            return Ok(());
        }
        payload.insert(session_id.to_string(), snapshot);
        self.mark_dirty(session_id);
        self.flush()
    }

    pub fn remove(&mut self, session_id: &str) -> anyhow::Result<()> {
        if self.reload().remove(session_id).is_none() {
            return Ok(());
        }
        self.mark_dirty(session_id);
        self.flush()
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        if self.dirty_keys.is_empty() {
            return Ok(());
        }
        let Some(payload) = &self.payload else {
            return Ok(());
        };

        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        for key in &self.dirty_keys {
            match payload.get(key) {
                Some(value) => on_disk.insert(key.clone(), value.clone()),
                None => on_disk.remove(key),
            };
        }
        write_json_object(&self.path, &on_disk)?;
        self.payload = Some(on_disk);
        self.dirty_keys.clear();
        Ok(())
    }

    fn mark_dirty(&mut self, session_id: &str) {
        if !self.dirty_keys.iter().any(|key| key == session_id) {
            self.dirty_keys.push(session_id.to_string());
        }
    }

    fn reload(&mut self) -> &mut Map<String, Value> {
        let fresh = read_json_object(&self.path).unwrap_or_default();
        self.payload.insert(fresh)
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )
    .with_context(|| format!("writing session store {}", path.display()))?;
    Ok(())
}
