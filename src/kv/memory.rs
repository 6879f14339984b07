//! In-memory transactional store
//!
//! A small multi-version ordered key-value store with optimistic
//! concurrency, standing in for the host's transactional substrate in tests
//! and the CLI.
//!
//! # Model
//!
//! - Every transaction reads a snapshot at its read version
//! - Reads see the transaction's own buffered writes
//! - `get` and `get_range` record read conflict ranges; mutations record
//!   write conflict ranges
//! - Commit fails with `KvError::Conflict` if any transaction that
//!   committed after this read version wrote into a range this transaction
//!   read
//! - Atomic adds are applied to the latest committed value at commit time,
//!   so they merge instead of overwriting
//! - Read-only transactions always commit

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event};

use super::errors::{KvError, KvResult, Retryable};
use super::transaction::{add_little_endian, KeyRange, KeyValue, Transaction};

/// Committed key history: ascending (version, value) pairs, `None` = deleted
type History = Vec<(u64, Option<Vec<u8>>)>;

#[derive(Debug)]
struct CommitRecord {
    version: u64,
    writes: Vec<KeyRange>,
}

#[derive(Debug, Default)]
struct KvState {
    version: u64,
    data: BTreeMap<Vec<u8>, History>,
    commits: Vec<CommitRecord>,
}

impl KvState {
    fn value_at(&self, key: &[u8], version: u64) -> Option<Vec<u8>> {
        self.data
            .get(key)
            .and_then(|history| history.iter().rev().find(|(v, _)| *v <= version))
            .and_then(|(_, value)| value.clone())
    }

    fn range_at(&self, range: &KeyRange, version: u64) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let mut out = BTreeMap::new();
        if range.is_empty() {
            return out;
        }
        let bounds = (
            Bound::Included(range.begin.as_slice()),
            Bound::Excluded(range.end.as_slice()),
        );
        for (key, history) in self.data.range::<[u8], _>(bounds) {
            let visible = history
                .iter()
                .rev()
                .find(|(v, _)| *v <= version)
                .and_then(|(_, value)| value.clone());
            if let Some(value) = visible {
                out.insert(key.clone(), value);
            }
        }
        out
    }

    fn write(&mut self, key: Vec<u8>, value: Option<Vec<u8>>, version: u64) {
        self.data.entry(key).or_default().push((version, value));
    }
}

/// Shared handle to an in-memory store
#[derive(Clone, Default)]
pub struct MemoryKv {
    state: Arc<Mutex<KvState>>,
}

impl fmt::Debug for MemoryKv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryKv").finish_non_exhaustive()
    }
}

impl MemoryKv {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> KvResult<MutexGuard<'_, KvState>> {
        self.state.lock().map_err(|_| KvError::Poisoned)
    }

    /// Begin a transaction reading at the latest committed version
    pub fn begin(&self) -> KvResult<MemoryTransaction> {
        let read_version = self.lock()?.version;
        Ok(MemoryTransaction {
            kv: self.clone(),
            id: Uuid::new_v4(),
            read_version,
            writes: BTreeMap::new(),
            cleared: Vec::new(),
            read_conflicts: Vec::new(),
            write_conflicts: Vec::new(),
        })
    }

    /// Run `body` in a transaction and commit it, re-running the whole body
    /// on retryable failures up to `retry_limit` extra times.
    pub fn transact<T, E, F>(&self, retry_limit: usize, mut body: F) -> Result<T, E>
    where
        F: FnMut(&mut MemoryTransaction) -> Result<T, E>,
        E: From<KvError> + Retryable + fmt::Display,
    {
        let mut attempt = 0;
        loop {
            let mut tx = self.begin()?;
            let transaction_id = tx.id();
            let outcome = match body(&mut tx) {
                Ok(value) => tx.commit().map(|_| value).map_err(E::from),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < retry_limit => {
                    attempt += 1;
                    log_event_with_fields(
                        Event::TransactionRetry,
                        &[
                            ("attempt", &attempt.to_string()),
                            ("reason", &e.to_string()),
                            ("transaction_id", &transaction_id.to_string()),
                        ],
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Set(Vec<u8>),
    Clear,
    Add(Vec<u8>),
}

impl PendingWrite {
    fn resolve(&self, base: Option<&[u8]>) -> Option<Vec<u8>> {
        match self {
            PendingWrite::Set(v) => Some(v.clone()),
            PendingWrite::Clear => None,
            PendingWrite::Add(param) => Some(add_little_endian(base, param)),
        }
    }
}

/// A transaction against `MemoryKv`
#[derive(Debug)]
pub struct MemoryTransaction {
    kv: MemoryKv,
    id: Uuid,
    read_version: u64,
    writes: BTreeMap<Vec<u8>, PendingWrite>,
    cleared: Vec<KeyRange>,
    read_conflicts: Vec<KeyRange>,
    write_conflicts: Vec<KeyRange>,
}

impl MemoryTransaction {
    /// Unique id, used in conflict reports
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot version this transaction reads at
    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|r| r.contains(key))
    }

    /// Snapshot value with this transaction's range clears applied
    fn base_value(&self, state: &KvState, key: &[u8]) -> Option<Vec<u8>> {
        if self.is_cleared(key) {
            None
        } else {
            state.value_at(key, self.read_version)
        }
    }

    /// Commit buffered writes.
    ///
    /// Returns the commit version, or the read version for a read-only
    /// transaction.
    pub fn commit(self) -> KvResult<u64> {
        if self.writes.is_empty() && self.cleared.is_empty() {
            return Ok(self.read_version);
        }

        let mut state = self.kv.lock()?;

        for commit in state.commits.iter().filter(|c| c.version > self.read_version) {
            let conflicting = commit
                .writes
                .iter()
                .any(|w| self.read_conflicts.iter().any(|r| r.intersects(w)));
            if conflicting {
                return Err(KvError::Conflict {
                    transaction_id: self.id.to_string(),
                    conflicting_version: commit.version,
                });
            }
        }

        let version = state.version + 1;

        for range in &self.cleared {
            let live: Vec<Vec<u8>> = state.range_at(range, state.version).into_keys().collect();
            for key in live {
                state.write(key, None, version);
            }
        }

        for (key, write) in &self.writes {
            let latest = state.value_at(key, state.version);
            let value = write.resolve(latest.as_deref());
            state.write(key.clone(), value, version);
        }

        state.commits.push(CommitRecord {
            version,
            writes: self.write_conflicts,
        });
        state.version = version;

        Ok(version)
    }
}

impl Transaction for MemoryTransaction {
    fn get(&mut self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.read_conflicts.push(KeyRange::single(key));
        let state = self.kv.lock()?;
        let base = self.base_value(&state, key);
        Ok(match self.writes.get(key) {
            Some(write) => write.resolve(base.as_deref()),
            None => base,
        })
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), PendingWrite::Set(value.to_vec()));
        self.write_conflicts.push(KeyRange::single(key));
    }

    fn clear(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), PendingWrite::Clear);
        self.write_conflicts.push(KeyRange::single(key));
    }

    fn clear_range(&mut self, range: &KeyRange) {
        self.writes.retain(|key, _| !range.contains(key));
        self.cleared.push(range.clone());
        self.write_conflicts.push(range.clone());
    }

    fn atomic_add(&mut self, key: &[u8], param: &[u8]) {
        let merged = match self.writes.get(key) {
            Some(PendingWrite::Set(v)) => PendingWrite::Set(add_little_endian(Some(v.as_slice()), param)),
            Some(PendingWrite::Clear) => PendingWrite::Set(add_little_endian(None, param)),
            Some(PendingWrite::Add(prev)) => PendingWrite::Add(add_little_endian(Some(prev.as_slice()), param)),
            None if self.is_cleared(key) => PendingWrite::Set(add_little_endian(None, param)),
            None => PendingWrite::Add(param.to_vec()),
        };
        self.writes.insert(key.to_vec(), merged);
        self.write_conflicts.push(KeyRange::single(key));
    }

    fn get_range(
        &mut self,
        range: &KeyRange,
        limit: usize,
        reverse: bool,
    ) -> KvResult<Vec<KeyValue>> {
        if range.begin > range.end {
            return Err(KvError::InvalidRange);
        }
        self.read_conflicts.push(range.clone());
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.kv.lock()?;
        let mut merged = state.range_at(range, self.read_version);
        merged.retain(|key, _| !self.is_cleared(key));

        let bounds = (
            Bound::Included(range.begin.as_slice()),
            Bound::Excluded(range.end.as_slice()),
        );
        for (key, write) in self.writes.range::<[u8], _>(bounds) {
            let base = self.base_value(&state, key);
            match write.resolve(base.as_deref()) {
                Some(value) => {
                    merged.insert(key.clone(), value);
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        drop(state);

        let take = if limit == 0 { usize::MAX } else { limit };
        let pairs: Vec<KeyValue> = if reverse {
            merged
                .into_iter()
                .rev()
                .take(take)
                .map(|(k, v)| KeyValue::new(k, v))
                .collect()
        } else {
            merged
                .into_iter()
                .take(take)
                .map(|(k, v)| KeyValue::new(k, v))
                .collect()
        };
        Ok(pairs)
    }
}
