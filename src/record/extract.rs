//! Reference extraction and delta planning
//!
//! Extraction maps a record to the referenced keys it depends on:
//!
//! - Invoice: one key per line, in line order, duplicates kept
//! - Object: its bucket
//!
//! Planning turns an (old, new) pair into counter operations. An update is
//! the multiset difference of the two key lists, never a delete followed by
//! an insert: a key both versions reference is left untouched instead of
//! passing through zero.

use std::collections::BTreeMap;

use crate::index::{CounterOp, IndexResult};
use crate::tuple::Element;

use super::types::{OwningRecord, StoredRecord};

impl OwningRecord {
    /// Referenced keys of this record, in record order
    pub fn referenced_keys(&self) -> Vec<Element> {
        match self {
            OwningRecord::Invoice(invoice) => invoice
                .lines
                .iter()
                .map(|line| Element::from_string(line.product.as_str()))
                .collect(),
            OwningRecord::Object(object) => vec![Element::from_string(object.bucket.as_str())],
        }
    }
}

/// Decode a host record and extract its referenced keys
pub fn extract_references(record: &StoredRecord) -> IndexResult<Vec<Element>> {
    Ok(OwningRecord::decode(record)?.referenced_keys())
}

/// Kind of record mutation the host reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// New record, no prior version
    Insert,
    /// Prior version removed
    Delete,
    /// Prior version replaced
    Update,
    /// Neither version present
    Noop,
}

impl MutationKind {
    pub fn classify(old: Option<&StoredRecord>, new: Option<&StoredRecord>) -> Self {
        match (old, new) {
            (None, Some(_)) => MutationKind::Insert,
            (Some(_), None) => MutationKind::Delete,
            (Some(_), Some(_)) => MutationKind::Update,
            (None, None) => MutationKind::Noop,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Insert => "insert",
            MutationKind::Delete => "delete",
            MutationKind::Update => "update",
            MutationKind::Noop => "noop",
        }
    }
}

/// Counter operations that move the index from `old_keys` to `new_keys`.
///
/// Decrements come first, then increments, each group in key order.
pub fn plan_deltas(old_keys: &[Element], new_keys: &[Element]) -> Vec<CounterOp> {
    let mut net: BTreeMap<&Element, i64> = BTreeMap::new();
    for key in old_keys {
        *net.entry(key).or_insert(0) -= 1;
    }
    for key in new_keys {
        *net.entry(key).or_insert(0) += 1;
    }

    let mut decrements = Vec::new();
    let mut increments = Vec::new();
    for (key, delta) in net {
        if delta < 0 {
            for _ in 0..delta.unsigned_abs() {
                decrements.push(CounterOp::Decrement(key.clone()));
            }
        } else {
            for _ in 0..delta {
                increments.push(CounterOp::Increment(key.clone()));
            }
        }
    }

    decrements.extend(increments);
    decrements
}

/// Extract both versions and plan the counter operations between them.
///
/// Extraction of both records finishes before anything is returned, so a
/// bad record fails the update before any write is issued.
pub fn plan_update(
    old: Option<&StoredRecord>,
    new: Option<&StoredRecord>,
) -> IndexResult<Vec<CounterOp>> {
    let old_keys = match old {
        Some(record) => extract_references(record)?,
        None => Vec::new(),
    };
    let new_keys = match new {
        Some(record) => extract_references(record)?,
        None => Vec::new(),
    };
    Ok(plan_deltas(&old_keys, &new_keys))
}
