use tracing::{debug, error, info, warn};

use crate::validate::{require_criteria, require_new_values, validate_new_record};
use crate::{
    CoreError, Criteria, Cursor, DeleteOutcome, InsertOutcome, Record, RecordStore,
    UpdateOutcome,
};

/// Application service fronting one record collection.
///
/// Argument checks happen here, before the store is touched; absent arguments
/// (`None`) and empty ones are told apart. Store failures are logged by kind
/// and always handed back to the caller as `Err`.
pub struct RecordGateway<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> RecordGateway<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert one record and return its store-assigned identifier.
    pub fn create(&self, record: Option<Record>) -> Result<InsertOutcome, CoreError> {
        let record = validate_new_record(record)?;
        let outcome = observe("create", self.store.insert_one(record))?;
        debug!(id = %outcome.inserted_id, "record created");
        Ok(outcome)
    }

    /// Lazily stream records matching `criteria`. `Some(Criteria::all())`
    /// returns the whole collection; `None` is an error.
    pub fn find(&self, criteria: Option<&Criteria>) -> Result<Cursor, CoreError> {
        let criteria = require_criteria(criteria, "search criteria")?;
        let cursor = observe("find", self.store.find(criteria))?;
        // Failures that surface mid-iteration get the same logging
        Ok(Cursor::new(cursor.inspect(|item| {
            if let Err(e) = item {
                log_failure("find", e);
            }
        })))
    }

    /// Merge `new_values` into the first record matching `lookup`.
    pub fn update(
        &self,
        lookup: Option<&Criteria>,
        new_values: Option<&Record>,
    ) -> Result<UpdateOutcome, CoreError> {
        let lookup = require_criteria(lookup, "look up values")?;
        let new_values = require_new_values(new_values)?;
        let outcome = observe("update", self.store.update_one(lookup, new_values))?;
        if outcome.modified_count != 0 {
            info!(matched = outcome.matched_count, "record updated");
        } else {
            info!(matched = outcome.matched_count, "no record modified");
        }
        Ok(outcome)
    }

    /// Remove the first record matching `criteria`.
    pub fn delete(&self, criteria: Option<&Criteria>) -> Result<DeleteOutcome, CoreError> {
        let criteria = require_criteria(criteria, "delete criteria")?;
        let outcome = observe("delete", self.store.delete_one(criteria))?;
        if outcome.deleted_count > 0 {
            info!("record deleted");
        } else {
            info!("no record deleted");
        }
        Ok(outcome)
    }
}

fn observe<T>(op: &'static str, res: Result<T, CoreError>) -> Result<T, CoreError> {
    if let Err(ref e) = res {
        log_failure(op, e);
    }
    res
}

fn log_failure(op: &'static str, err: &CoreError) {
    match err {
        CoreError::InvalidArgument(_) => {}
        CoreError::WriteRejected(rej) => {
            warn!(op, kind = rej.kind.as_str(), reason = %rej.message, "write rejected")
        }
        CoreError::Unclassified(msg) => error!(op, err = %msg, "store operation failed"),
    }
}
