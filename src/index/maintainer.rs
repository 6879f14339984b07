//! Refcount index maintainer
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized --bind--> Bound --activate--> Active
//!       ^                   |                   |
//!       +------release------+-------release-----+
//! ```
//!
//! Binding resolves the keyspace from the index definition. Only an active
//! maintainer accepts update, scan, lookup, rebuild and verify calls. Every
//! call runs inside a transaction the host supplies; the maintainer never
//! commits or retries.
//!
//! Updates are not idempotent. Applying the same (old, new) pair twice
//! counts twice, so the host must apply each logical mutation once.

use std::fmt;

use serde::Serialize;

use crate::kv::Transaction;
use crate::observability::{log_event_with_fields, Event, IndexMetrics};
use crate::record::{extract_references, plan_update, StoredRecord};
use crate::tuple::{Element, Subspace, Tuple};

use super::config::{CollisionPolicy, RefcountIndexConfig};
use super::counter::{CounterMutator, CounterOp, DecrementOutcome};
use super::errors::{IndexError, IndexResult};
use super::keyspace::{IndexKeyspace, Region};
use super::scanner::{IndexCursor, IndexEntry, ScanProperties, ScanRange};

/// Index type name handled by this maintainer
pub const REFCOUNT_INDEX_TYPE: &str = "refcount";

/// Index definition as the host declares it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub index_type: String,
    /// Namespace the host assigned to the index, possibly `#`-versioned
    pub subspace: Tuple,
}

impl IndexDefinition {
    /// A refcount index definition
    pub fn refcount(name: impl Into<String>, subspace: Tuple) -> Self {
        Self {
            name: name.into(),
            index_type: REFCOUNT_INDEX_TYPE.to_string(),
            subspace,
        }
    }
}

/// Maintainer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintainerState {
    Uninitialized,
    Bound,
    Active,
}

impl fmt::Display for MaintainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintainerState::Uninitialized => write!(f, "UNINITIALIZED"),
            MaintainerState::Bound => write!(f, "BOUND"),
            MaintainerState::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Counter operations applied by one update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub increments: u64,
    pub decrements: u64,
    /// Decrements that replaced a counter with a zero marker
    pub zero_transitions: u64,
}

/// Result of a rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub records: u64,
    pub references: u64,
}

/// Result of a full consistency pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub live_counters: u64,
    pub zero_markers: u64,
    /// Sum of all live counts
    pub total_references: u64,
    /// Keys found in both regions
    pub collisions: Vec<Element>,
    /// Keys whose payload does not match their region
    pub malformed: Vec<Element>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.collisions.is_empty() && self.malformed.is_empty()
    }
}

/// Maintains a refcount index over Invoice and Object records
#[derive(Debug)]
pub struct RefcountIndexMaintainer {
    index: IndexDefinition,
    config: RefcountIndexConfig,
    state: MaintainerState,
    keyspace: Option<IndexKeyspace>,
    metrics: IndexMetrics,
}

impl RefcountIndexMaintainer {
    /// Create an uninitialized maintainer
    pub fn new(index: IndexDefinition, config: RefcountIndexConfig) -> IndexResult<Self> {
        config.validate()?;
        Ok(Self {
            index,
            config,
            state: MaintainerState::Uninitialized,
            keyspace: None,
            metrics: IndexMetrics::new(),
        })
    }

    /// Resolve the keyspace from the index definition
    pub fn bind(&mut self) -> IndexResult<()> {
        if self.state != MaintainerState::Uninitialized {
            return Err(IndexError::not_active("bind", self.state));
        }
        self.keyspace = Some(IndexKeyspace::bind(&self.index.subspace)?);
        self.state = MaintainerState::Bound;
        log_event_with_fields(
            Event::MaintainerBound,
            &[
                ("index", &self.index.name),
                ("subspace", &self.index.subspace.to_string()),
            ],
        );
        Ok(())
    }

    /// Start accepting update and scan calls
    pub fn activate(&mut self) -> IndexResult<()> {
        if self.state != MaintainerState::Bound {
            return Err(IndexError::not_active("activate", self.state));
        }
        self.state = MaintainerState::Active;
        log_event_with_fields(Event::MaintainerActivated, &[("index", &self.index.name)]);
        Ok(())
    }

    /// Drop the keyspace handles. Stored counters are untouched.
    pub fn release(&mut self) -> IndexResult<()> {
        if self.state == MaintainerState::Uninitialized {
            return Err(IndexError::not_active("release", self.state));
        }
        self.keyspace = None;
        self.state = MaintainerState::Uninitialized;
        log_event_with_fields(Event::MaintainerReleased, &[("index", &self.index.name)]);
        Ok(())
    }

    pub fn state(&self) -> MaintainerState {
        self.state
    }

    pub fn index(&self) -> &IndexDefinition {
        &self.index
    }

    pub fn config(&self) -> &RefcountIndexConfig {
        &self.config
    }

    pub fn metrics(&self) -> &IndexMetrics {
        &self.metrics
    }

    /// Always false: replaying an update double-counts
    pub fn is_idempotent(&self) -> bool {
        false
    }

    /// Resolved index subspace, once bound
    pub fn index_subspace(&self) -> IndexResult<&Subspace> {
        self.keyspace
            .as_ref()
            .map(IndexKeyspace::index)
            .ok_or_else(|| IndexError::not_active("resolve subspace", self.state))
    }

    /// Bound keyspace, for hosts that plan their own reads
    pub fn keyspace(&self) -> IndexResult<&IndexKeyspace> {
        self.keyspace
            .as_ref()
            .ok_or_else(|| IndexError::not_active("resolve keyspace", self.state))
    }

    fn active(&self, operation: &str) -> IndexResult<&IndexKeyspace> {
        match (&self.keyspace, self.state) {
            (Some(keyspace), MaintainerState::Active) => Ok(keyspace),
            _ => Err(IndexError::not_active(operation, self.state)),
        }
    }

    /// Counter operations an update would apply, without applying them
    pub fn plan_update(
        &self,
        old: Option<&StoredRecord>,
        new: Option<&StoredRecord>,
    ) -> IndexResult<Vec<CounterOp>> {
        plan_update(old, new)
    }

    /// Apply one record mutation to the counters.
    ///
    /// Both records are extracted before the first write. Any error leaves
    /// the transaction unusable for commit; the host must abort it.
    pub fn update<T: Transaction + ?Sized>(
        &self,
        tx: &mut T,
        old: Option<&StoredRecord>,
        new: Option<&StoredRecord>,
    ) -> IndexResult<UpdateSummary> {
        let keyspace = self.active("update")?;
        let ops = plan_update(old, new)?;
        let mutator = CounterMutator::new(keyspace, &self.metrics);

        let mut summary = UpdateSummary::default();
        for op in &ops {
            match op {
                CounterOp::Increment(key) => {
                    mutator.increment(tx, key);
                    summary.increments += 1;
                }
                CounterOp::Decrement(key) => {
                    if mutator.decrement(tx, key)? == DecrementOutcome::ReachedZero {
                        summary.zero_transitions += 1;
                    }
                    summary.decrements += 1;
                }
            }
        }
        self.metrics.increment_updates();
        Ok(summary)
    }

    /// Lazy scan over both regions in key order
    pub fn scan<'a, T: Transaction + ?Sized>(
        &'a self,
        tx: &'a mut T,
        range: &ScanRange,
        continuation: Option<&[u8]>,
        properties: ScanProperties,
    ) -> IndexResult<IndexCursor<'a, T>> {
        let keyspace = self.active("scan")?;
        IndexCursor::open(
            tx,
            keyspace,
            &self.metrics,
            &self.config,
            range,
            continuation,
            properties,
        )
    }

    /// Entry for one key, live counter preferred
    pub fn lookup<T: Transaction + ?Sized>(
        &self,
        tx: &mut T,
        key: &Element,
    ) -> IndexResult<Option<IndexEntry>> {
        let mut cursor = self.scan(
            tx,
            &ScanRange::single(key.clone()),
            None,
            ScanProperties::forward(),
        )?;
        cursor.next().transpose()
    }

    /// Clear the index and re-derive every counter from `records`.
    ///
    /// Zero markers of keys no record references are not recreated.
    pub fn rebuild<'r, T, I>(&self, tx: &mut T, records: I) -> IndexResult<RebuildSummary>
    where
        T: Transaction + ?Sized,
        I: IntoIterator<Item = &'r StoredRecord>,
    {
        let keyspace = self.active("rebuild")?;
        log_event_with_fields(Event::RebuildStart, &[("index", &self.index.name)]);

        tx.clear_range(&keyspace.index().range());
        let mutator = CounterMutator::new(keyspace, &self.metrics);
        let mut summary = RebuildSummary::default();
        for record in records {
            for key in extract_references(record)? {
                mutator.increment(tx, &key);
                summary.references += 1;
            }
            summary.records += 1;
        }

        log_event_with_fields(
            Event::RebuildComplete,
            &[
                ("index", &self.index.name),
                ("records", &summary.records.to_string()),
                ("references", &summary.references.to_string()),
            ],
        );
        Ok(summary)
    }

    /// Walk the whole index and report keys held in both regions.
    ///
    /// Collisions are collected regardless of the configured policy.
    pub fn verify<T: Transaction + ?Sized>(&self, tx: &mut T) -> IndexResult<ConsistencyReport> {
        let keyspace = self.active("verify")?;
        let config = RefcountIndexConfig {
            on_collision: CollisionPolicy::Warn,
            ..self.config.clone()
        };
        let cursor = IndexCursor::open(
            tx,
            keyspace,
            &self.metrics,
            &config,
            &ScanRange::all(),
            None,
            ScanProperties::forward(),
        )?;

        let mut report = ConsistencyReport::default();
        let mut previous: Option<Element> = None;
        for entry in cursor {
            let entry = entry?;
            match entry.region {
                Region::Live => {
                    report.live_counters += 1;
                    report.total_references += entry.count;
                }
                Region::ZeroMarker => report.zero_markers += 1,
            }
            if !entry.is_well_formed() {
                report.malformed.push(entry.key.clone());
            }
            if previous.as_ref() == Some(&entry.key) {
                report.collisions.push(entry.key.clone());
            }
            previous = Some(entry.key);
        }

        log_event_with_fields(
            Event::VerifyComplete,
            &[
                ("index", &self.index.name),
                ("live_counters", &report.live_counters.to_string()),
                ("zero_markers", &report.zero_markers.to_string()),
                ("collisions", &report.collisions.len().to_string()),
                ("malformed", &report.malformed.len().to_string()),
            ],
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::counter::EMPTY_VALUE;
    use crate::index::IndexErrorCode;
    use crate::kv::MemoryKv;
    use serde_json::json;

    fn definition() -> IndexDefinition {
        IndexDefinition::refcount(
            "product_refs",
            Tuple::new().push("demostore").push("product_refs#2"),
        )
    }

    fn active() -> RefcountIndexMaintainer {
        let mut maintainer =
            RefcountIndexMaintainer::new(definition(), RefcountIndexConfig::default()).unwrap();
        maintainer.bind().unwrap();
        maintainer.activate().unwrap();
        maintainer
    }

    fn invoice(products: &[&str]) -> StoredRecord {
        let lines: Vec<_> = products.iter().map(|p| json!({"product": p})).collect();
        StoredRecord::new("Invoice", json!({"id": "inv", "lines": lines}))
    }

    fn count(maintainer: &RefcountIndexMaintainer, kv: &MemoryKv, key: &str) -> Option<IndexEntry> {
        let mut tx = kv.begin().unwrap();
        maintainer.lookup(&mut tx, &Element::from_string(key)).unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let mut maintainer =
            RefcountIndexMaintainer::new(definition(), RefcountIndexConfig::default()).unwrap();
        assert_eq!(maintainer.state(), MaintainerState::Uninitialized);
        assert!(maintainer.index_subspace().is_err());

        let err = maintainer.activate().unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountNotActive);

        maintainer.bind().unwrap();
        assert_eq!(maintainer.state(), MaintainerState::Bound);
        assert_eq!(
            maintainer.index_subspace().unwrap().key(),
            Tuple::new().push("demostore").push("product_refs").pack().as_slice()
        );

        maintainer.activate().unwrap();
        assert_eq!(maintainer.state(), MaintainerState::Active);
        assert!(maintainer.bind().is_err());

        maintainer.release().unwrap();
        assert_eq!(maintainer.state(), MaintainerState::Uninitialized);
        assert!(maintainer.release().is_err());
    }

    #[test]
    fn test_calls_require_active() {
        let mut maintainer =
            RefcountIndexMaintainer::new(definition(), RefcountIndexConfig::default()).unwrap();
        maintainer.bind().unwrap();
        let kv = MemoryKv::new();
        let mut tx = kv.begin().unwrap();

        let err = maintainer
            .update(&mut tx, None, Some(&invoice(&["a"])))
            .unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountNotActive);
        assert!(maintainer
            .scan(&mut tx, &ScanRange::all(), None, ScanProperties::forward())
            .is_err());
    }

    #[test]
    fn test_not_idempotent() {
        assert!(!active().is_idempotent());
    }

    #[test]
    fn test_update_summary() {
        let maintainer = active();
        let kv = MemoryKv::new();

        let mut tx = kv.begin().unwrap();
        let inserted = maintainer
            .update(&mut tx, None, Some(&invoice(&["a", "b"])))
            .unwrap();
        assert_eq!(inserted.increments, 2);

        let updated = maintainer
            .update(&mut tx, Some(&invoice(&["a", "b"])), Some(&invoice(&["b", "c"])))
            .unwrap();
        assert_eq!(
            updated,
            UpdateSummary {
                increments: 1,
                decrements: 1,
                zero_transitions: 1,
            }
        );
        tx.commit().unwrap();

        assert!(count(&maintainer, &kv, "a").unwrap().is_zero_marker());
        assert_eq!(count(&maintainer, &kv, "b").unwrap().count, 1);
        assert_eq!(count(&maintainer, &kv, "c").unwrap().count, 1);
        assert_eq!(count(&maintainer, &kv, "d"), None);
        assert_eq!(maintainer.metrics().snapshot().updates, 2);
    }

    #[test]
    fn test_failed_extraction_writes_nothing() {
        let maintainer = active();
        let kv = MemoryKv::new();
        let mut tx = kv.begin().unwrap();

        let bad = StoredRecord::new("Customer", json!({}));
        let err = maintainer
            .update(&mut tx, Some(&invoice(&["a"])), Some(&bad))
            .unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountUnsupportedRecordType);
        assert_eq!(maintainer.metrics().snapshot().decrements, 0);
    }

    #[test]
    fn test_rebuild_and_verify() {
        let maintainer = active();
        let kv = MemoryKv::new();

        let mut tx = kv.begin().unwrap();
        maintainer
            .update(&mut tx, None, Some(&invoice(&["stale"])))
            .unwrap();
        maintainer
            .update(&mut tx, Some(&invoice(&["stale"])), None)
            .unwrap();
        tx.commit().unwrap();

        let records = vec![invoice(&["a", "b"]), invoice(&["b"])];
        let mut tx = kv.begin().unwrap();
        let summary = maintainer.rebuild(&mut tx, &records).unwrap();
        assert_eq!(summary, RebuildSummary { records: 2, references: 3 });
        tx.commit().unwrap();

        assert_eq!(count(&maintainer, &kv, "stale"), None);
        assert_eq!(count(&maintainer, &kv, "b").unwrap().count, 2);

        let mut tx = kv.begin().unwrap();
        let report = maintainer.verify(&mut tx).unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.live_counters, 2);
        assert_eq!(report.total_references, 3);
        assert_eq!(report.zero_markers, 0);
    }

    #[test]
    fn test_verify_reports_collisions() {
        let mut maintainer = RefcountIndexMaintainer::new(
            definition(),
            RefcountIndexConfig {
                on_collision: CollisionPolicy::Fail,
                ..Default::default()
            },
        )
        .unwrap();
        maintainer.bind().unwrap();
        maintainer.activate().unwrap();

        let kv = MemoryKv::new();
        let mut tx = kv.begin().unwrap();
        maintainer
            .update(&mut tx, None, Some(&invoice(&["a"])))
            .unwrap();
        let zero_key = maintainer
            .keyspace()
            .unwrap()
            .zero_key(&Element::from_string("a"));
        tx.set(&zero_key, &EMPTY_VALUE);

        let report = maintainer.verify(&mut tx).unwrap();
        assert_eq!(report.collisions, vec![Element::from_string("a")]);
        assert!(!report.is_consistent());

        let err = maintainer
            .lookup(&mut tx, &Element::from_string("a"))
            .unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountConsistency);
    }

    #[test]
    fn test_verify_reports_payloads_in_the_wrong_region() {
        let mut maintainer = RefcountIndexMaintainer::new(definition(), Default::default()).unwrap();
        maintainer.bind().unwrap();
        maintainer.activate().unwrap();
        let keyspace = maintainer.keyspace().unwrap().clone();

        let kv = MemoryKv::new();
        let mut tx = kv.begin().unwrap();
        maintainer
            .update(&mut tx, None, Some(&invoice(&["ok"])))
            .unwrap();
        tx.set(&keyspace.live_key(&Element::from_string("empty")), &EMPTY_VALUE);
        tx.set(
            &keyspace.zero_key(&Element::from_string("counted")),
            &3i64.to_le_bytes(),
        );

        let report = maintainer.verify(&mut tx).unwrap();
        assert_eq!(
            report.malformed,
            vec![Element::from_string("counted"), Element::from_string("empty")]
        );
        assert!(report.collisions.is_empty());
        assert!(!report.is_consistent());
    }
}
