//! Domain library for the animal shelter dashboard.
//!
//! Holds the record and criteria types, the `RecordStore` port, outcome and
//! error definitions, and the pure view logic the dashboard builds on. Keep
//! concrete storage engines and HTTP concerns out of this crate; the
//! in-memory store under `adapters` is the only implementation living here.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the store-assigned identifier of every record.
pub const ID_FIELD: &str = "_id";

/// Largest serialized record a store accepts (16 MiB).
pub const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// Store-assigned identifier of a record. Immutable once assigned.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidArgument("record id is empty".into()));
        }
        if !val.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(CoreError::InvalidArgument(format!(
                "record id contains invalid characters: {val}"
            )));
        }
        Ok(Self(val))
    }

    /// Fresh identifier: 32 lowercase hex characters.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One document of the collection: a schemaless field-name-to-value mapping.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, field: K, value: V) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The store-assigned identifier, if this record carries a valid one.
    pub fn id(&self) -> Option<RecordId> {
        self.get(ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| RecordId::new(s).ok())
    }

    /// Read a string field.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Read a numeric field. Numeric strings are accepted as well since
    /// imported shelter data is not always typed.
    pub fn number_field(&self, field: &str) -> Option<f64> {
        match self.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Copy of this record with the identifier removed.
    pub fn without_id(&self) -> Record {
        let mut out = self.clone();
        out.remove(ID_FIELD);
        out
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl TryFrom<Value> for Record {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::InvalidArgument(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Exact-match predicate over record fields. Empty criteria match every record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Criteria(Map<String, Value>);

impl Criteria {
    /// Criteria matching every record.
    pub fn all() -> Self {
        Self(Map::new())
    }

    /// Criteria selecting the record with the given identifier.
    pub fn by_id(id: &RecordId) -> Self {
        Self::all().and(ID_FIELD, id.as_str())
    }

    /// Builder-style: add an equality condition.
    pub fn and<K: Into<String>, V: Into<Value>>(mut self, field: K, value: V) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The identifier condition, when it is a plain string.
    pub fn id_condition(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Whether `record` satisfies every condition.
    pub fn matches(&self, record: &Record) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| document::field_matches(record, field, expected))
    }
}

impl From<Map<String, Value>> for Criteria {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Criteria {
    fn from(record: Record) -> Self {
        Self(record.into_map())
    }
}

impl TryFrom<Value> for Criteria {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Record::try_from(value).map(Criteria::from)
    }
}

/// Result of a successful insert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub inserted_id: RecordId,
}

/// Result of a successful update. Zero matches is not an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Result of a successful delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}

/// Lazy sequence of records produced by a find. Records are pulled from the
/// store as the cursor is advanced, not materialized up front.
pub struct Cursor {
    inner: Box<dyn Iterator<Item = Result<Record, CoreError>> + Send>,
}

impl Cursor {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<Record, CoreError>> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Drain the cursor, stopping at the first store error.
    pub fn collect_records(self) -> Result<Vec<Record>, CoreError> {
        self.collect()
    }
}

impl Iterator for Cursor {
    type Item = Result<Record, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl Debug for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

/// Port to a single document collection.
///
/// Adapters assign identifiers on insert and apply the shared write rules in
/// [`document`]. Argument presence is checked by the gateway, not here.
pub trait RecordStore: Send + Sync {
    /// Persist a new record (without `_id`) and return its assigned id.
    fn insert_one(&self, record: Record) -> Result<InsertOutcome, CoreError>;
    /// Stream every record matching `criteria`, in insertion order.
    fn find(&self, criteria: &Criteria) -> Result<Cursor, CoreError>;
    /// Merge `new_values` into the first record matching `lookup`.
    fn update_one(&self, lookup: &Criteria, new_values: &Record)
        -> Result<UpdateOutcome, CoreError>;
    /// Remove the first record matching `criteria`.
    fn delete_one(&self, criteria: &Criteria) -> Result<DeleteOutcome, CoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn insert_one(&self, record: Record) -> Result<InsertOutcome, CoreError> {
        (**self).insert_one(record)
    }

    fn find(&self, criteria: &Criteria) -> Result<Cursor, CoreError> {
        (**self).find(criteria)
    }

    fn update_one(
        &self,
        lookup: &Criteria,
        new_values: &Record,
    ) -> Result<UpdateOutcome, CoreError> {
        (**self).update_one(lookup, new_values)
    }

    fn delete_one(&self, criteria: &Criteria) -> Result<DeleteOutcome, CoreError> {
        (**self).delete_one(criteria)
    }
}

/// Why a store declined a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectKind {
    /// The write would violate a document rule (immutable id, size, constraint).
    Validation,
    /// The store could not acknowledge the write (read-only, full, busy).
    WriteConcern,
}

impl RejectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectKind::Validation => "validation",
            RejectKind::WriteConcern => "write_concern",
        }
    }
}

/// A write the store declined, returned to the caller as data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRejection {
    pub kind: RejectKind,
    pub message: String,
}

impl WriteRejection {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self {
            kind: RejectKind::Validation,
            message: message.into(),
        }
    }

    pub fn write_concern<S: Into<String>>(message: S) -> Self {
        Self {
            kind: RejectKind::WriteConcern,
            message: message.into(),
        }
    }
}

/// Core domain errors (no external error crates to keep deps small).
#[derive(Debug)]
pub enum CoreError {
    /// A required argument was absent or empty. Nothing reached the store.
    InvalidArgument(String),
    /// The store declined the write.
    WriteRejected(WriteRejection),
    /// Any other store failure.
    Unclassified(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            CoreError::WriteRejected(rej) => {
                write!(f, "write rejected ({}): {}", rej.kind.as_str(), rej.message)
            }
            CoreError::Unclassified(msg) => write!(f, "store error: {}", msg),
        }
    }
}

impl Error for CoreError {}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Return a short about/version line for binaries to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - shelter record gateway", pkg, ver)
}

pub mod adapters;
pub mod connection;
pub mod dashboard;
pub mod document;
pub mod rescue;
pub mod seed;
pub mod service;
pub mod validate;
