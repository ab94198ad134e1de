use std::path::Path;

use serde_json::{Map, Value};

use crate::records::{Generation, Scenario};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Builds the per-generation receipt written next to the records.
///
/// Inline image payloads in `provider_request` are replaced by `<omitted>`.
pub fn build_receipt(
    scenario: &Scenario,
    generation: &Generation,
    provider_request: Option<&Map<String, Value>>,
    artifact: Option<&Map<String, Value>>,
) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert(
        "scenario".to_string(),
        serde_json::to_value(scenario).unwrap_or(Value::Null),
    );
    root.insert(
        "generation".to_string(),
        serde_json::to_value(generation).unwrap_or(Value::Null),
    );
    root.insert(
        "provider_request".to_string(),
        provider_request
            .map(|request| sanitize_payload(&Value::Object(request.clone())))
            .unwrap_or(Value::Null),
    );
    root.insert(
        "artifact".to_string(),
        artifact
            .map(|row| Value::Object(row.clone()))
            .unwrap_or(Value::Null),
    );
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "data" | "image" | "image_bytes" | "b64_json"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                if matches!(lowered.as_str(), "x-goog-api-key" | "key" | "api_key") {
                    out.insert(key.clone(), Value::String("<redacted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}
