//! Demo record store
//!
//! A minimal host: owning records are kept as JSON under `("records", id)`
//! and every save or delete calls the refcount maintainer in the same
//! transaction, which is re-run on conflicts.

use crate::index::{IndexError, IndexResult, RefcountIndexMaintainer, UpdateSummary};
use crate::kv::{MemoryKv, Transaction};
use crate::record::{MutationKind, StoredRecord};
use crate::tuple::{Element, Subspace, Tuple};

/// Outcome of one committed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub kind: MutationKind,
    pub summary: UpdateSummary,
}

/// Records plus their refcount index over one `MemoryKv`
#[derive(Debug)]
pub struct RecordStore {
    kv: MemoryKv,
    records: Subspace,
    maintainer: RefcountIndexMaintainer,
    retry_limit: usize,
}

impl RecordStore {
    pub fn new(kv: MemoryKv, maintainer: RefcountIndexMaintainer, retry_limit: usize) -> Self {
        Self {
            kv,
            records: Subspace::from_tuple(&Tuple::new().push("records")),
            maintainer,
            retry_limit,
        }
    }

    pub fn kv(&self) -> &MemoryKv {
        &self.kv
    }

    pub fn maintainer(&self) -> &RefcountIndexMaintainer {
        &self.maintainer
    }

    fn record_key(&self, id: &str) -> Vec<u8> {
        self.records.pack_element(&Element::from_string(id))
    }

    /// Read a record inside `tx`
    pub fn load<T: Transaction + ?Sized>(
        &self,
        tx: &mut T,
        id: &str,
    ) -> IndexResult<Option<StoredRecord>> {
        match tx.get(&self.record_key(id))? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| IndexError::record_decode("stored", e)),
            None => Ok(None),
        }
    }

    /// Insert or replace a record, updating the index in the same transaction
    pub fn save(&self, id: &str, record: &StoredRecord) -> IndexResult<MutationOutcome> {
        let body = serde_json::to_vec(record).map_err(|e| IndexError::record_decode("stored", e))?;
        self.kv.transact(self.retry_limit, |tx| {
            let old = self.load(tx, id)?;
            let summary = self.maintainer.update(tx, old.as_ref(), Some(record))?;
            tx.set(&self.record_key(id), &body);
            Ok(MutationOutcome {
                kind: MutationKind::classify(old.as_ref(), Some(record)),
                summary,
            })
        })
    }

    /// Delete a record if present, updating the index in the same transaction
    pub fn delete(&self, id: &str) -> IndexResult<MutationOutcome> {
        self.kv.transact(self.retry_limit, |tx| {
            let old = self.load(tx, id)?;
            let summary = self.maintainer.update(tx, old.as_ref(), None)?;
            tx.clear(&self.record_key(id));
            Ok(MutationOutcome {
                kind: MutationKind::classify(old.as_ref(), None),
                summary,
            })
        })
    }

    /// Every stored record, in id order
    pub fn all_records<T: Transaction + ?Sized>(&self, tx: &mut T) -> IndexResult<Vec<StoredRecord>> {
        tx.get_range(&self.records.range(), 0, false)?
            .into_iter()
            .map(|kv| {
                serde_json::from_slice(&kv.value).map_err(|e| IndexError::record_decode("stored", e))
            })
            .collect()
    }

    /// Re-derive the index from the stored records
    pub fn rebuild(&self) -> IndexResult<u64> {
        self.kv.transact(self.retry_limit, |tx| {
            let records = self.all_records(tx)?;
            Ok(self.maintainer.rebuild(tx, &records)?.references)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexDefinition, IndexMaintainerFactory, RefcountIndexMaintainerFactory};
    use serde_json::json;

    fn store() -> RecordStore {
        let maintainer = RefcountIndexMaintainerFactory::default()
            .create(IndexDefinition::refcount(
                "bucket_refs",
                Tuple::new().push("demo").push("bucket_refs"),
            ))
            .unwrap();
        RecordStore::new(MemoryKv::new(), maintainer, 3)
    }

    fn object(bucket: &str) -> StoredRecord {
        StoredRecord::new("Object", json!({"bucket": bucket, "path": "/x"}))
    }

    fn count(store: &RecordStore, bucket: &str) -> Option<u64> {
        let mut tx = store.kv().begin().unwrap();
        store
            .maintainer()
            .lookup(&mut tx, &Element::from_string(bucket))
            .unwrap()
            .map(|e| e.count)
    }

    #[test]
    fn test_save_then_replace() {
        let store = store();
        let first = store.save("o1", &object("media")).unwrap();
        assert_eq!(first.kind, MutationKind::Insert);

        let second = store.save("o1", &object("logs")).unwrap();
        assert_eq!(second.kind, MutationKind::Update);
        assert_eq!(second.summary.zero_transitions, 1);

        assert_eq!(count(&store, "media"), Some(0));
        assert_eq!(count(&store, "logs"), Some(1));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let store = store();
        let outcome = store.delete("ghost").unwrap();
        assert_eq!(outcome.kind, MutationKind::Noop);
        assert_eq!(outcome.summary, UpdateSummary::default());
    }

    #[test]
    fn test_rebuild_matches_records() {
        let store = store();
        store.save("o1", &object("media")).unwrap();
        store.save("o2", &object("media")).unwrap();
        store.delete("o1").unwrap();

        assert_eq!(store.rebuild().unwrap(), 1);
        assert_eq!(count(&store, "media"), Some(1));
    }
}
