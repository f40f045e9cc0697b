use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::request::GenerationRequest;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// One submit+poll cycle as recorded in the generation receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub model: String,
    pub operation: String,
    #[serde(default)]
    pub polls: u64,
    pub video_uri: Option<String>,
    #[serde(default)]
    pub request_payload: Map<String, Value>,
}

pub fn new_generation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Assembles the on-disk receipt for one finished generation. Inline image
/// bytes never land in the receipt; the request is summarized with a digest
/// instead and stage payloads pass through the sanitizer.
pub fn build_receipt(
    generation_id: &str,
    request: &GenerationRequest,
    input_digest: Option<&str>,
    stages: &[StageRecord],
    warnings: &[String],
    video_path: &Path,
    receipt_path: &Path,
    result_metadata: &Map<String, Value>,
) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert(
        "generation_id".to_string(),
        Value::String(generation_id.to_string()),
    );
    root.insert(
        "request".to_string(),
        request_summary(request, input_digest),
    );
    root.insert(
        "stages".to_string(),
        sanitize_payload(&serde_json::to_value(stages).unwrap_or(Value::Null)),
    );
    root.insert(
        "warnings".to_string(),
        Value::Array(warnings.iter().cloned().map(Value::String).collect()),
    );

    let mut artifacts = Map::new();
    artifacts.insert(
        "video_path".to_string(),
        Value::String(video_path.to_string_lossy().to_string()),
    );
    artifacts.insert(
        "receipt_path".to_string(),
        Value::String(receipt_path.to_string_lossy().to_string()),
    );
    root.insert("artifacts".to_string(), Value::Object(artifacts));
    root.insert(
        "result_metadata".to_string(),
        sanitize_payload(&Value::Object(result_metadata.clone())),
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

fn request_summary(request: &GenerationRequest, input_digest: Option<&str>) -> Value {
    let mut image = Map::new();
    image.insert(
        "media_type".to_string(),
        Value::String(request.image.media_type.clone()),
    );
    image.insert(
        "byte_len".to_string(),
        Value::Number((request.image.bytes.len() as u64).into()),
    );
    if let Some(digest) = input_digest {
        image.insert("sha256".to_string(), Value::String(digest.to_string()));
    }

    let mut summary = Map::new();
    summary.insert("prompt".to_string(), Value::String(request.prompt.clone()));
    summary.insert(
        "aspect_ratio".to_string(),
        Value::String(request.aspect_ratio.api_value().to_string()),
    );
    summary.insert(
        "target_length".to_string(),
        serde_json::to_value(request.target_length).unwrap_or(Value::Null),
    );
    summary.insert("image".to_string(), Value::Object(image));
    Value::Object(summary)
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
                    "bytesbase64encoded" | "bytes" | "image_bytes" | "data"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}
