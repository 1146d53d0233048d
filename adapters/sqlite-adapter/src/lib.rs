//! sqlite-adapter — SQLite implementation of the `RecordStore` port.
//!
//! Purpose
//! - Provide a file-based document collection so the dashboard runs without
//!   an external database server.
//! - Implements the `RecordStore` trait from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - One table per collection: `seq` orders records by insertion, `id` holds
//!   the assigned identifier, `body` the record as JSON text.
//! - Criteria on a string `_id` are pushed down to SQL; all other conditions
//!   are evaluated with the domain's matching rules after decoding.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use domain::connection::{Backend, StoreUri};
use domain::document::{apply_set, decode, encode, with_id};
use domain::validate::validate_collection_name;
use domain::{
    CoreError, Criteria, Cursor, DeleteOutcome, InsertOutcome, Record, RecordId, RecordStore,
    UpdateOutcome, WriteRejection,
};
use rusqlite::{params, Connection, ErrorCode};
use tracing::{debug, warn};

/// Records fetched per cursor round trip.
pub const DEFAULT_BATCH_SIZE: usize = 101;

/// SQLite-backed record collection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
    batch_size: usize,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path and ensure the
    /// collection table exists.
    pub fn new<P: AsRef<Path>>(path: P, collection: &str) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        Self::from_connection(conn, collection)
    }

    /// Private in-memory database, gone when the store is dropped.
    pub fn in_memory(collection: &str) -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        Self::from_connection(conn, collection)
    }

    /// Open the database named by a `sqlite://` connection string.
    pub fn connect(uri: &StoreUri) -> Result<Self, CoreError> {
        if uri.backend != Backend::Sqlite {
            return Err(CoreError::InvalidArgument(format!(
                "sqlite adapter cannot open a {} uri",
                uri.backend.as_str()
            )));
        }
        if uri.has_credentials() || uri.host.is_some() {
            warn!(uri = %uri, "sqlite ignores credentials and host in the store uri");
        }
        if uri.database == ":memory:" {
            return Self::in_memory(&uri.collection);
        }
        // Ensure directory exists
        if let Some(dir) = Path::new(&uri.database).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CoreError::Unclassified(format!("create {}: {e}", dir.display()))
                })?;
            }
        }
        Self::new(&uri.database, &uri.collection)
    }

    fn from_connection(conn: Connection, collection: &str) -> Result<Self, CoreError> {
        validate_collection_name(collection)?;
        init_schema(&conn, collection)?;
        debug!(collection, "sqlite collection ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Change how many records a cursor pulls per round trip (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        lock(&self.conn)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, CoreError> {
    conn.lock()
        .map_err(|_| CoreError::Unclassified("mutex poisoned".into()))
}

fn init_schema(conn: &Connection, collection: &str) -> Result<(), CoreError> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{collection}" (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            body TEXT NOT NULL
        );
        "#
    ))
    .map_err(map_sqerr)
}

fn map_sqerr(e: rusqlite::Error) -> CoreError {
    CoreError::Unclassified(format!("sqlite error: {e}"))
}

// Write paths: failures the database raises for the write itself come back
// as rejections; anything else stays unclassified.
fn map_write_err(e: rusqlite::Error) -> CoreError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        match err.code {
            ErrorCode::ConstraintViolation => {
                return CoreError::WriteRejected(WriteRejection::validation(e.to_string()))
            }
            ErrorCode::ReadOnly
            | ErrorCode::DiskFull
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked => {
                return CoreError::WriteRejected(WriteRejection::write_concern(e.to_string()))
            }
            _ => {}
        }
    }
    map_sqerr(e)
}

/// First record matching `criteria`, by insertion order, with its `seq`.
fn first_match(
    conn: &Connection,
    collection: &str,
    criteria: &Criteria,
) -> Result<Option<(i64, Record)>, CoreError> {
    let sql = match criteria.id_condition() {
        Some(_) => format!(r#"SELECT seq, body FROM "{collection}" WHERE id = ?1 ORDER BY seq"#),
        None => format!(r#"SELECT seq, body FROM "{collection}" ORDER BY seq"#),
    };
    let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
    let mut rows = match criteria.id_condition() {
        Some(id) => stmt.query(params![id]),
        None => stmt.query([]),
    }
    .map_err(map_sqerr)?;
    while let Some(row) = rows.next().map_err(map_sqerr)? {
        let seq: i64 = row.get(0).map_err(map_sqerr)?;
        let body: String = row.get(1).map_err(map_sqerr)?;
        let record = decode(&body)?;
        if criteria.matches(&record) {
            return Ok(Some((seq, record)));
        }
    }
    Ok(None)
}

impl RecordStore for SqliteStore {
    fn insert_one(&self, record: Record) -> Result<InsertOutcome, CoreError> {
        let id = RecordId::generate();
        let body = encode(&with_id(record, &id))?;
        let conn = self.lock()?;
        conn.execute(
            &format!(r#"INSERT INTO "{}"(id, body) VALUES (?1, ?2)"#, self.collection),
            params![id.as_str(), body],
        )
        .map_err(map_write_err)?;
        Ok(InsertOutcome { inserted_id: id })
    }

    fn find(&self, criteria: &Criteria) -> Result<Cursor, CoreError> {
        Ok(Cursor::new(SqliteCursor {
            conn: Arc::clone(&self.conn),
            collection: self.collection.clone(),
            criteria: criteria.clone(),
            batch_size: self.batch_size,
            last_seq: 0,
            buffer: VecDeque::new(),
            pending_err: None,
            exhausted: false,
        }))
    }

    fn update_one(
        &self,
        lookup: &Criteria,
        new_values: &Record,
    ) -> Result<UpdateOutcome, CoreError> {
        let conn = self.lock()?;
        let Some((seq, mut record)) = first_match(&conn, &self.collection, lookup)? else {
            return Ok(UpdateOutcome::default());
        };
        let modified = apply_set(&mut record, new_values)?;
        if modified {
            let body = encode(&record)?;
            conn.execute(
                &format!(r#"UPDATE "{}" SET body = ?1 WHERE seq = ?2"#, self.collection),
                params![body, seq],
            )
            .map_err(map_write_err)?;
        }
        Ok(UpdateOutcome {
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    fn delete_one(&self, criteria: &Criteria) -> Result<DeleteOutcome, CoreError> {
        let conn = self.lock()?;
        let Some((seq, _)) = first_match(&conn, &self.collection, criteria)? else {
            return Ok(DeleteOutcome::default());
        };
        let changed = conn
            .execute(
                &format!(r#"DELETE FROM "{}" WHERE seq = ?1"#, self.collection),
                params![seq],
            )
            .map_err(map_write_err)?;
        Ok(DeleteOutcome {
            deleted_count: changed as u64,
        })
    }
}

/// Pages through the table by `seq`, taking the connection lock only while a
/// batch is fetched.
struct SqliteCursor {
    conn: Arc<Mutex<Connection>>,
    collection: String,
    criteria: Criteria,
    batch_size: usize,
    last_seq: i64,
    buffer: VecDeque<Record>,
    // Failure from the last fetch, held back until the rows before it are out
    pending_err: Option<CoreError>,
    exhausted: bool,
}

impl SqliteCursor {
    fn fetch_batch(&mut self) -> Result<(), CoreError> {
        let conn = lock(&self.conn)?;
        let id_filter = self.criteria.id_condition();
        let sql = match id_filter {
            Some(_) => format!(
                r#"SELECT seq, body FROM "{}" WHERE seq > ?1 AND id = ?3 ORDER BY seq LIMIT ?2"#,
                self.collection
            ),
            None => format!(
                r#"SELECT seq, body FROM "{}" WHERE seq > ?1 ORDER BY seq LIMIT ?2"#,
                self.collection
            ),
        };
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let limit = self.batch_size as i64;
        let mut rows = match id_filter {
            Some(id) => stmt.query(params![self.last_seq, limit, id]),
            None => stmt.query(params![self.last_seq, limit]),
        }
        .map_err(map_sqerr)?;

        let mut fetched = 0usize;
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            fetched += 1;
            let seq: i64 = row.get(0).map_err(map_sqerr)?;
            let body: String = row.get(1).map_err(map_sqerr)?;
            self.last_seq = seq;
            let record = decode(&body)?;
            if self.criteria.matches(&record) {
                self.buffer.push_back(record);
            }
        }
        if fetched < self.batch_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for SqliteCursor {
    type Item = Result<Record, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if let Some(e) = self.pending_err.take() {
                return Some(Err(e));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_batch() {
                self.exhausted = true;
                self.pending_err = Some(e);
            }
        }
    }
}
