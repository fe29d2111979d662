//! Document-backend helpers: JSON and BSON conversion, type tags, identifier checks.

use crate::error::{DbError, DbResult};
use crate::models::{FieldSummary, Record};
use mongodb::bson::{Bson, Document};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Pipeline stages that write to the database.
const WRITE_STAGES: &[&str] = &["$out", "$merge"];

/// Reject collection names that cannot address a user collection.
pub fn validate_collection_name(name: &str) -> DbResult<()> {
    if name.trim().is_empty() {
        return Err(DbError::validation("Collection name must not be empty"));
    }
    if name.contains('$') || name.contains('\0') {
        return Err(DbError::validation(format!(
            "Invalid collection name '{}': '$' and NUL characters are not allowed",
            name
        )));
    }
    if name.starts_with("system.") {
        return Err(DbError::validation(format!(
            "Collection '{}' is a system collection and cannot be queried",
            name
        )));
    }
    Ok(())
}

/// Parse a JSON object (extended JSON accepted) into a BSON document.
///
/// `None` and `null` both become an empty document.
pub fn json_to_document(value: Option<&JsonValue>, what: &str) -> DbResult<Document> {
    match value {
        None | Some(JsonValue::Null) => Ok(Document::new()),
        Some(JsonValue::Object(_)) => {
            let value = value.cloned().unwrap_or(JsonValue::Null);
            match Bson::try_from(value) {
                Ok(Bson::Document(doc)) => Ok(doc),
                Ok(other) => Err(DbError::validation(format!(
                    "{} must be an object, got {}",
                    what,
                    js_type_tag(&other)
                ))),
                Err(e) => Err(DbError::validation(format!("Invalid {}: {}", what, e))),
            }
        }
        Some(other) => Err(DbError::validation(format!(
            "{} must be an object, got {}",
            what,
            json_type_tag(other)
        ))),
    }
}

/// Convert an aggregation pipeline, rejecting stages that write.
pub fn pipeline_to_documents(stages: &[JsonValue]) -> DbResult<Vec<Document>> {
    let mut pipeline = Vec::with_capacity(stages.len());
    for (idx, stage) in stages.iter().enumerate() {
        let doc = json_to_document(Some(stage), &format!("pipeline stage {}", idx))?;
        if let Some(op) = doc.keys().find(|k| WRITE_STAGES.contains(&k.as_str())) {
            return Err(DbError::validation(format!(
                "Aggregation stage '{}' writes data and is not allowed",
                op
            )));
        }
        pipeline.push(doc);
    }
    Ok(pipeline)
}

/// Convert a document into the JSON the model sees.
pub fn document_to_record(doc: Document) -> Record {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

/// ObjectIds become hex strings and dates ISO-8601 strings; everything else
/// uses relaxed extended JSON.
pub fn bson_to_json(value: Bson) -> JsonValue {
    match value {
        Bson::ObjectId(oid) => JsonValue::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => JsonValue::String(s),
            Err(_) => Bson::DateTime(dt).into_relaxed_extjson(),
        },
        Bson::Document(doc) => JsonValue::Object(document_to_record(doc)),
        Bson::Array(items) => JsonValue::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

/// The `typeof`-style tag reported in schema samples.
pub fn js_type_tag(value: &Bson) -> &'static str {
    match value {
        Bson::Array(_) => "array",
        Bson::Null => "null",
        Bson::Undefined => "undefined",
        Bson::String(_) | Bson::Symbol(_) => "string",
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) => "number",
        Bson::Boolean(_) => "boolean",
        _ => "object",
    }
}

fn json_type_tag(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Union the keys of sampled documents with their observed type tags.
///
/// The example is the first value seen for each key.
pub fn infer_fields(samples: &[Document]) -> BTreeMap<String, FieldSummary> {
    let mut fields: BTreeMap<String, FieldSummary> = BTreeMap::new();
    for doc in samples {
        for (key, value) in doc {
            let tag = js_type_tag(value).to_string();
            let entry = fields.entry(key.clone()).or_insert_with(|| FieldSummary {
                types: Vec::new(),
                example: bson_to_json(value.clone()),
            });
            if !entry.types.contains(&tag) {
                entry.types.push(tag);
            }
        }
    }
    fields
}

/// Coerce a driver-reported count to a number; anything unrecognizable is 0.
pub fn coerce_count(value: &JsonValue) -> u64 {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Numeric value of a BSON stats field (`collStats` mixes Int32, Int64 and Double).
pub fn bson_number(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(v)) if *v > 0 => *v as u64,
        Some(Bson::Int64(v)) if *v > 0 => *v as u64,
        Some(Bson::Double(v)) if v.is_finite() && *v > 0.0 => *v as u64,
        _ => 0,
    }
}
