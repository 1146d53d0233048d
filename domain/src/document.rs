//! Write rules and equality shared by every `RecordStore` implementation.
//!
//! Adapters call into these so that memory and SQLite stores agree on what
//! "matches" and "modified" mean.

use serde_json::Value;

use crate::{CoreError, Record, RecordId, WriteRejection, ID_FIELD, MAX_RECORD_BYTES};

/// JSON equality where numbers compare by value (`30 == 30.0`).
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if a.is_f64() || b.is_f64() {
                a.as_f64() == b.as_f64()
            } else {
                a == b
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => left == right,
    }
}

/// A `null` condition also matches a missing field.
pub fn field_matches(record: &Record, field: &str, expected: &Value) -> bool {
    match record.get(field) {
        Some(actual) => values_equal(actual, expected),
        None => expected.is_null(),
    }
}

/// Stamp a freshly assigned identifier onto a new record.
pub fn with_id(mut record: Record, id: &RecordId) -> Record {
    record.insert(ID_FIELD, id.as_str());
    record
}

/// Merge `new_values` into `target` field by field, leaving other fields
/// untouched. Returns whether any stored value changed.
pub fn apply_set(target: &mut Record, new_values: &Record) -> Result<bool, CoreError> {
    if let Some(requested) = new_values.get(ID_FIELD) {
        let same = target
            .get(ID_FIELD)
            .is_some_and(|current| values_equal(current, requested));
        if !same {
            return Err(CoreError::WriteRejected(WriteRejection::validation(
                "performing an update on the path '_id' would modify the immutable field '_id'",
            )));
        }
    }

    let mut modified = false;
    for (field, value) in new_values.iter() {
        if field == ID_FIELD {
            continue;
        }
        if target.get(field) != Some(value) {
            target.insert(field.clone(), value.clone());
            modified = true;
        }
    }
    Ok(modified)
}

/// Serialize a record for storage, enforcing the size limit.
pub fn encode(record: &Record) -> Result<String, CoreError> {
    let body = serde_json::to_string(record)
        .map_err(|e| CoreError::Unclassified(format!("encode record: {e}")))?;
    if body.len() > MAX_RECORD_BYTES {
        return Err(CoreError::WriteRejected(WriteRejection::validation(format!(
            "record is {} bytes, limit is {} bytes",
            body.len(),
            MAX_RECORD_BYTES
        ))));
    }
    Ok(body)
}

/// Parse a stored record body.
pub fn decode(body: &str) -> Result<Record, CoreError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| CoreError::Unclassified(format!("corrupt record body: {e}")))?;
    Record::try_from(value)
        .map_err(|e| CoreError::Unclassified(format!("corrupt record body: {e}")))
}
