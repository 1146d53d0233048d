use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::document::{apply_set, encode, with_id};
use crate::{
    CoreError, Criteria, Cursor, DeleteOutcome, InsertOutcome, Record, RecordId, RecordStore,
    UpdateOutcome,
};

#[derive(Default)]
struct Collection {
    next_seq: u64,
    records: BTreeMap<u64, Record>,
}

impl Collection {
    fn first_match(&self, criteria: &Criteria) -> Option<u64> {
        self.records
            .iter()
            .find(|(_, rec)| criteria.matches(rec))
            .map(|(seq, _)| *seq)
    }
}

/// In-memory collection keyed by insertion sequence.
///
/// Cloning yields another handle onto the same collection. Cursors hold a
/// handle too and take the lock once per record, so they observe writes made
/// while iterating.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collection>, CoreError> {
        lock(&self.inner)
    }
}

fn lock(inner: &Mutex<Collection>) -> Result<MutexGuard<'_, Collection>, CoreError> {
    inner
        .lock()
        .map_err(|_| CoreError::Unclassified("mutex poisoned".into()))
}

impl RecordStore for InMemoryStore {
    fn insert_one(&self, record: Record) -> Result<InsertOutcome, CoreError> {
        let id = RecordId::generate();
        let record = with_id(record, &id);
        encode(&record)?;
        let mut coll = self.lock()?;
        let seq = coll.next_seq;
        coll.next_seq += 1;
        coll.records.insert(seq, record);
        Ok(InsertOutcome { inserted_id: id })
    }

    fn find(&self, criteria: &Criteria) -> Result<Cursor, CoreError> {
        Ok(Cursor::new(MemoryCursor {
            inner: Arc::clone(&self.inner),
            criteria: criteria.clone(),
            last_seq: None,
            done: false,
        }))
    }

    fn update_one(
        &self,
        lookup: &Criteria,
        new_values: &Record,
    ) -> Result<UpdateOutcome, CoreError> {
        let mut coll = self.lock()?;
        let Some(seq) = coll.first_match(lookup) else {
            return Ok(UpdateOutcome::default());
        };
        let Some(current) = coll.records.get(&seq) else {
            return Ok(UpdateOutcome::default());
        };
        let mut updated = current.clone();
        let modified = apply_set(&mut updated, new_values)?;
        if modified {
            encode(&updated)?;
            coll.records.insert(seq, updated);
        }
        Ok(UpdateOutcome {
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    fn delete_one(&self, criteria: &Criteria) -> Result<DeleteOutcome, CoreError> {
        let mut coll = self.lock()?;
        let deleted = match coll.first_match(criteria) {
            Some(seq) => coll.records.remove(&seq).is_some(),
            None => false,
        };
        Ok(DeleteOutcome {
            deleted_count: u64::from(deleted),
        })
    }
}

struct MemoryCursor {
    inner: Arc<Mutex<Collection>>,
    criteria: Criteria,
    last_seq: Option<u64>,
    done: bool,
}

impl Iterator for MemoryCursor {
    type Item = Result<Record, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let coll = match lock(&self.inner) {
            Ok(c) => c,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let lower = match self.last_seq {
            Some(seq) => Bound::Excluded(seq),
            None => Bound::Unbounded,
        };
        let hit = coll
            .records
            .range((lower, Bound::Unbounded))
            .find(|(_, rec)| self.criteria.matches(rec))
            .map(|(seq, rec)| (*seq, rec.clone()));
        match hit {
            Some((seq, rec)) => {
                self.last_seq = Some(seq);
                Some(Ok(rec))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
