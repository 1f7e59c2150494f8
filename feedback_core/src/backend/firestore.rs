//! Conversion between plain JSON documents and the typed value encoding that
//! the Firestore REST API speaks, e.g. `{"stringValue": "abc"}`.

use serde_json::{json, Map, Value};

use super::{BackendError, StoredDocument};

/// Encodes a JSON object as the `fields` of a Firestore document.
pub fn encode_document(data: &Value) -> Result<Value, BackendError> {
    let Value::Object(fields) = data else {
        return Err(BackendError::Malformed("a document must be a JSON object".to_string()));
    };
    Ok(json!({ "fields": encode_fields(fields) }))
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        // integers travel as strings so that 64-bit values survive JSON
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => {
            let values: Vec<Value> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

fn encode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(fields.iter().map(|(key, value)| (key.clone(), encode_value(value))).collect())
}

/// Decodes a Firestore `Document` resource into its id and plain JSON data.
/// The id is the last segment of the document's resource name.
pub fn decode_document(document: &Value) -> Result<StoredDocument, BackendError> {
    let name = document
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("document without a name"))?;
    let id = name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed(&format!("document name `{name}` has no id segment")))?;
    let data = match document.get("fields") {
        Some(Value::Object(fields)) => decode_fields(fields)?,
        // documents with no fields at all omit the key
        None => Value::Object(Map::new()),
        Some(other) => return Err(malformed(&format!("fields of `{name}` is {other}"))),
    };
    Ok(StoredDocument { id: id.to_string(), data })
}

pub fn decode_value(value: &Value) -> Result<Value, BackendError> {
    let Some((kind, inner)) = value.as_object().and_then(single_entry) else {
        return Err(malformed(&format!("expected a typed value, got {value}")));
    };
    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner.as_bool().map(Value::Bool).ok_or_else(|| unexpected(kind, inner)),
        "integerValue" => {
            // usually a string, but accept a bare number too
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed.map(Value::from).ok_or_else(|| unexpected(kind, inner))
        }
        "doubleValue" => match inner {
            Value::Number(_) => Ok(inner.clone()),
            _ => Err(unexpected(kind, inner)),
        },
        "stringValue" | "timestampValue" | "bytesValue" | "referenceValue" => match inner {
            Value::String(_) => Ok(inner.clone()),
            _ => Err(unexpected(kind, inner)),
        },
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => match inner.get("values") {
            Some(Value::Array(values)) => {
                Ok(Value::Array(values.iter().map(decode_value).collect::<Result<_, _>>()?))
            }
            // empty arrays omit `values`
            None => Ok(Value::Array(Vec::new())),
            Some(_) => Err(unexpected(kind, inner)),
        },
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields),
            None => Ok(Value::Object(Map::new())),
            Some(_) => Err(unexpected(kind, inner)),
        },
        _ => Err(malformed(&format!("unknown value type `{kind}`"))),
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Value, BackendError> {
    fields
        .iter()
        .map(|(key, value)| decode_value(value).map(|decoded| (key.clone(), decoded)))
        .collect::<Result<Map<_, _>, _>>()
        .map(Value::Object)
}

fn single_entry(object: &Map<String, Value>) -> Option<(&String, &Value)> {
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Some(entry),
        _ => None,
    }
}

fn malformed(reason: &str) -> BackendError {
    BackendError::Malformed(reason.to_string())
}

fn unexpected(kind: &str, inner: &Value) -> BackendError {
    malformed(&format!("`{kind}` holds unexpected {inner}"))
}
