//! Lightweight argument validation helpers. Keep logic minimal and deterministic.

use crate::{CoreError, Criteria, Record, ID_FIELD};

/// A record handed to `create`: present, non-empty, and without an `_id`.
pub fn validate_new_record(record: Option<Record>) -> Result<Record, CoreError> {
    let Some(record) = record else {
        return Err(CoreError::InvalidArgument(
            "nothing to save, record is absent".into(),
        ));
    };
    if record.is_empty() {
        return Err(CoreError::InvalidArgument(
            "nothing to save, record is empty".into(),
        ));
    }
    if record.contains(ID_FIELD) {
        return Err(CoreError::InvalidArgument(
            "the '_id' field is assigned by the store".into(),
        ));
    }
    Ok(record)
}

/// Criteria must be present; an empty mapping is fine and means "all".
pub fn require_criteria<'a>(
    criteria: Option<&'a Criteria>,
    what: &str,
) -> Result<&'a Criteria, CoreError> {
    criteria.ok_or_else(|| CoreError::InvalidArgument(format!("{what} was not specified")))
}

/// Update values must be present and name at least one field.
pub fn require_new_values(new_values: Option<&Record>) -> Result<&Record, CoreError> {
    match new_values {
        None => Err(CoreError::InvalidArgument(
            "update values were not specified".into(),
        )),
        Some(values) if values.is_empty() => Err(CoreError::InvalidArgument(
            "update values are empty".into(),
        )),
        Some(values) => Ok(values),
    }
}

/// Collection names end up in SQL identifiers, so keep them to `[A-Za-z0-9_]`.
pub fn validate_collection_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.len() > 64 {
        return Err(CoreError::InvalidArgument(
            "collection name must be 1-64 characters".into(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CoreError::InvalidArgument(format!(
            "collection name has invalid characters: {name}"
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(CoreError::InvalidArgument(format!(
            "collection name must not start with a digit: {name}"
        )));
    }
    Ok(())
}
