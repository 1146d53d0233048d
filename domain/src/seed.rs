//! Bulk loading of exported shelter records (a JSON array of objects).

use serde_json::Value;
use tracing::{debug, warn};

use crate::service::RecordGateway;
use crate::{CoreError, Criteria, Record, RecordStore, ID_FIELD};

/// Parse an exported JSON array. Exported `_id` values are dropped so the
/// store assigns fresh ones; records left empty are skipped.
pub fn parse_records(raw: &str) -> Result<Vec<Record>, CoreError> {
    let items: Vec<Value> = serde_json::from_str(raw)
        .map_err(|e| CoreError::InvalidArgument(format!("seed data is not a JSON array: {e}")))?;
    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let mut record = Record::try_from(item)
            .map_err(|e| CoreError::InvalidArgument(format!("seed item {idx}: {e}")))?;
        record.remove(ID_FIELD);
        if record.is_empty() {
            warn!(item = idx, "skipping empty seed record");
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

/// Insert every record in `raw`; returns how many were inserted.
pub fn import<S: RecordStore>(gateway: &RecordGateway<S>, raw: &str) -> Result<usize, CoreError> {
    let records = parse_records(raw)?;
    let count = records.len();
    for record in records {
        gateway.create(Some(record))?;
    }
    debug!(count, "records imported");
    Ok(count)
}

/// Like [`import`], but only into a collection with no records yet.
/// Returns 0 when the collection already holds data.
pub fn seed_if_empty<S: RecordStore>(
    gateway: &RecordGateway<S>,
    raw: &str,
) -> Result<usize, CoreError> {
    if gateway.find(Some(&Criteria::all()))?.next().is_some() {
        return Ok(0);
    }
    import(gateway, raw)
}
