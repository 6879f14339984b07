//! Counter payloads and the two mutation protocols
//!
//! Increments and decrements are deliberately different operation classes:
//!
//! - Increment is a blind commutative add. It reads nothing, so any number
//!   of concurrent transactions can increment the same key without
//!   conflicting.
//! - Decrement is read-modify-write. Choosing between "write n-1" and
//!   "clear the counter, write a zero marker" needs the current value, so
//!   concurrent decrements of one key conflict and serialize through the
//!   host's retry.

use std::fmt;

use crate::kv::Transaction;
use crate::observability::{log_event_with_fields, Event, IndexMetrics};
use crate::tuple::Element;

use super::errors::{IndexError, IndexResult};
use super::keyspace::IndexKeyspace;

/// Zero marker payload
pub const EMPTY_VALUE: [u8; 0] = [];

/// Little-endian i64 one, the increment parameter
pub const LITTLE_ENDIAN_INT64_ONE: [u8; 8] = [1, 0, 0, 0, 0, 0, 0, 0];

/// Decoded value of one index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterPayload {
    /// Stored count
    Count(u64),
    /// Zero marker
    ZeroMarker,
}

impl CounterPayload {
    /// Decode a raw value: empty is a zero marker, eight bytes are a
    /// little-endian count, anything else is corrupt.
    pub fn decode(raw: &[u8]) -> Result<Self, String> {
        if raw.is_empty() {
            return Ok(CounterPayload::ZeroMarker);
        }
        let bytes: [u8; 8] = raw
            .try_into()
            .map_err(|_| format!("expected 8-byte count, found {} byte(s)", raw.len()))?;
        let count = i64::from_le_bytes(bytes);
        u64::try_from(count)
            .map(CounterPayload::Count)
            .map_err(|_| format!("negative count {}", count))
    }

    /// Encode back into the stored form
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        match self {
            CounterPayload::Count(n) => encode_count(*n).map(|bytes| bytes.to_vec()),
            CounterPayload::ZeroMarker => Ok(EMPTY_VALUE.to_vec()),
        }
    }

    /// Logical count; zero for a marker
    pub fn count(&self) -> u64 {
        match self {
            CounterPayload::Count(n) => *n,
            CounterPayload::ZeroMarker => 0,
        }
    }
}

/// Little-endian i64 encoding of a count.
///
/// Counts above `i64::MAX` have no stored form.
pub fn encode_count(n: u64) -> Result<[u8; 8], String> {
    i64::try_from(n)
        .map(i64::to_le_bytes)
        .map_err(|_| format!("count {} exceeds the stored range", n))
}

/// One planned counter change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterOp {
    Increment(Element),
    Decrement(Element),
}

impl CounterOp {
    /// Referenced key this operation touches
    pub fn key(&self) -> &Element {
        match self {
            CounterOp::Increment(k) | CounterOp::Decrement(k) => k,
        }
    }

    /// True for operations that merge without a prior read
    pub fn is_commutative(&self) -> bool {
        matches!(self, CounterOp::Increment(_))
    }
}

impl fmt::Display for CounterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterOp::Increment(k) => write!(f, "+1 {}", k),
            CounterOp::Decrement(k) => write!(f, "-1 {}", k),
        }
    }
}

/// Result of a decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Counter still live with this value
    Decremented(u64),
    /// Counter removed, zero marker written
    ReachedZero,
}

/// Applies counter operations inside a host transaction
#[derive(Debug, Clone, Copy)]
pub struct CounterMutator<'a> {
    keyspace: &'a IndexKeyspace,
    metrics: &'a IndexMetrics,
}

impl<'a> CounterMutator<'a> {
    pub fn new(keyspace: &'a IndexKeyspace, metrics: &'a IndexMetrics) -> Self {
        Self { keyspace, metrics }
    }

    /// Add one to the live counter and drop any zero marker.
    ///
    /// Issues no reads. An absent counter becomes 1.
    pub fn increment<T: Transaction + ?Sized>(&self, tx: &mut T, key: &Element) {
        tx.atomic_add(&self.keyspace.live_key(key), &LITTLE_ENDIAN_INT64_ONE);
        tx.clear(&self.keyspace.zero_key(key));
        self.metrics.increment_increments();
    }

    /// Subtract one from the live counter.
    ///
    /// At zero the live counter is cleared and a zero marker written in the
    /// same transaction, so the two regions never both hold the key once
    /// the transaction commits.
    pub fn decrement<T: Transaction + ?Sized>(
        &self,
        tx: &mut T,
        key: &Element,
    ) -> IndexResult<DecrementOutcome> {
        let live_key = self.keyspace.live_key(key);
        let raw = match tx.get(&live_key)? {
            Some(raw) => raw,
            None => {
                log_event_with_fields(Event::CounterMissing, &[("key", &key.to_string())]);
                return Err(IndexError::missing_counter(key));
            }
        };

        let current = match CounterPayload::decode(&raw) {
            Ok(CounterPayload::Count(n)) if n >= 1 => n,
            Ok(other) => {
                return Err(self.corrupt(key, format!("live counter holds {:?}", other)));
            }
            Err(reason) => return Err(self.corrupt(key, reason)),
        };
        self.metrics.increment_decrements();

        let remaining = current - 1;
        if remaining == 0 {
            tx.clear(&live_key);
            tx.set(&self.keyspace.zero_key(key), &EMPTY_VALUE);
            self.metrics.increment_zero_transitions();
            log_event_with_fields(Event::CounterReachedZero, &[("key", &key.to_string())]);
            Ok(DecrementOutcome::ReachedZero)
        } else {
            let payload = encode_count(remaining).map_err(|reason| self.corrupt(key, reason))?;
            tx.set(&live_key, &payload);
            Ok(DecrementOutcome::Decremented(remaining))
        }
    }

    fn corrupt(&self, key: &Element, reason: String) -> IndexError {
        log_event_with_fields(
            Event::CounterCorrupt,
            &[("key", &key.to_string()), ("reason", &reason)],
        );
        IndexError::corrupt_counter(key, reason)
    }
}
