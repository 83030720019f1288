use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::types::GenerationRequest;
use crate::models::ModelResolution;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

pub fn build_receipt(
    request: &GenerationRequest,
    resolution: &ModelResolution,
    session_id: &str,
) -> anyhow::Result<Value> {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert("session_id".to_string(), Value::String(session_id.to_string()));
    root.insert(
        "compiled_at".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    root.insert(
        "resolution".to_string(),
        serde_json::to_value(resolution).context("serializing resolution")?,
    );
    root.insert(
        "request".to_string(),
        sanitize_payload(&serde_json::to_value(request).context("serializing request")?),
    );
    root.insert(
        "summary".to_string(),
        json!({
            "model": request.effective_model,
            "size": request.dimensions().to_string(),
            "count": request.count,
            "cost": request.cost,
            "inline_references": request.reference_payload.len() - request.uploaded_count(),
            "uploaded_references": request.uploaded_count(),
        }),
    );
    Ok(Value::Object(root))
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)
        .with_context(|| format!("writing receipt {}", path.display()))?;
    Ok(())
}

/// Replaces embedded image data with `"<omitted>"` at any depth.
pub fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, row)| {
                    let lowered = key.to_ascii_lowercase();
                    let row = if matches!(lowered.as_str(), "data" | "bytes" | "b64_json" | "image")
                    {
                        Value::String("<omitted>".to_string())
                    } else {
                        sanitize_payload(row)
                    };
                    (key.clone(), row)
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}
