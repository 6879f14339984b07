//! Index scanner
//!
//! Merges the live-counter and zero-marker regions into one stream ordered
//! by referenced key. Each region is read lazily in batches, so a scan with
//! a small limit touches only a few raw entries.
//!
//! At most one region should hold a given key. When both do, forward scans
//! return the live entry first and reverse scans the marker first, and the
//! collision policy decides whether the scan warns or fails.
//!
//! Continuation tokens carry the subspace-relative key of the last entry
//! returned followed by its CRC32, so a token survives a maintainer restart
//! but not corruption.

use std::collections::VecDeque;
use std::ops::Bound;

use crate::kv::{key_after, KeyRange, Transaction};
use crate::observability::{log_event_with_fields, Event, IndexMetrics};
use crate::tuple::{Element, Subspace, Tuple};

use super::config::{CollisionPolicy, RefcountIndexConfig};
use super::counter::CounterPayload;
use super::errors::{IndexError, IndexResult};
use super::keyspace::{IndexKeyspace, Region};

/// Referenced-key range of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    pub low: Bound<Element>,
    pub high: Bound<Element>,
}

impl ScanRange {
    /// Every key
    pub fn all() -> Self {
        Self {
            low: Bound::Unbounded,
            high: Bound::Unbounded,
        }
    }

    /// `[low, high)`
    pub fn between(low: impl Into<Element>, high: impl Into<Element>) -> Self {
        Self {
            low: Bound::Included(low.into()),
            high: Bound::Excluded(high.into()),
        }
    }

    /// `[low, ..)`
    pub fn at_least(low: impl Into<Element>) -> Self {
        Self {
            low: Bound::Included(low.into()),
            high: Bound::Unbounded,
        }
    }

    /// `(.., high)`
    pub fn below(high: impl Into<Element>) -> Self {
        Self {
            low: Bound::Unbounded,
            high: Bound::Excluded(high.into()),
        }
    }

    /// Exactly one key
    pub fn single(key: impl Into<Element>) -> Self {
        let key = key.into();
        Self {
            low: Bound::Included(key.clone()),
            high: Bound::Included(key),
        }
    }

    /// Byte range of this key range inside one region
    fn region_bytes(&self, region: &Subspace) -> KeyRange {
        let full = region.range();
        let begin = match &self.low {
            Bound::Included(k) => region.pack_element(k),
            Bound::Excluded(k) => key_after(&region.pack_element(k)),
            Bound::Unbounded => full.begin,
        };
        let end = match &self.high {
            Bound::Included(k) => key_after(&region.pack_element(k)),
            Bound::Excluded(k) => region.pack_element(k),
            Bound::Unbounded => full.end,
        };
        KeyRange::new(begin, end)
    }
}

impl Default for ScanRange {
    fn default() -> Self {
        Self::all()
    }
}

/// Direction and size of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanProperties {
    /// Maximum entries returned; `None` or zero for no limit
    pub limit: Option<usize>,
    /// Descending key order
    pub reverse: bool,
}

impl ScanProperties {
    pub fn forward() -> Self {
        Self::default()
    }

    pub fn reverse() -> Self {
        Self {
            limit: None,
            reverse: true,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One decoded index entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Element,
    /// Decoded count; zero for a marker
    pub count: u64,
    pub region: Region,
    /// Stored value as decoded
    pub payload: CounterPayload,
}

impl IndexEntry {
    pub fn is_zero_marker(&self) -> bool {
        self.region == Region::ZeroMarker
    }

    /// True when the payload is the form its region requires: a count of at
    /// least one in the live region, an empty value in the zero region.
    pub fn is_well_formed(&self) -> bool {
        match (self.region, self.payload) {
            (Region::Live, CounterPayload::Count(n)) => n >= 1,
            (Region::ZeroMarker, CounterPayload::ZeroMarker) => true,
            _ => false,
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "key": self.key.to_json(),
            "count": self.count,
            "region": self.region.name(),
        })
    }
}

/// Encode the resume position after `(region, key)`
pub fn encode_continuation(keyspace: &IndexKeyspace, region: Region, key: &Element) -> Vec<u8> {
    let mut token = keyspace.relative_key(region, key);
    let checksum = crc32fast::hash(&token);
    token.extend_from_slice(&checksum.to_le_bytes());
    token
}

/// Decode a continuation token into the position it resumes after
pub fn decode_continuation(
    keyspace: &IndexKeyspace,
    token: &[u8],
) -> IndexResult<(Region, Element)> {
    if token.len() <= 4 {
        return Err(IndexError::invalid_continuation(format!(
            "Continuation of {} byte(s) is too short",
            token.len()
        )));
    }
    let (relative, tail) = token.split_at(token.len() - 4);
    let mut stored = [0u8; 4];
    stored.copy_from_slice(tail);
    if crc32fast::hash(relative) != u32::from_le_bytes(stored) {
        return Err(IndexError::invalid_continuation(
            "Continuation checksum mismatch",
        ));
    }
    keyspace
        .decode_relative(relative)
        .map_err(|e| IndexError::invalid_continuation(format!("Continuation key: {}", e.message())))
}

/// Rank of a region within one key, in scan order
fn tie_rank(region: Region, reverse: bool) -> u8 {
    match (region, reverse) {
        (Region::Live, false) | (Region::ZeroMarker, true) => 0,
        (Region::ZeroMarker, false) | (Region::Live, true) => 1,
    }
}

/// Lazily batched reader over one region
#[derive(Debug)]
struct RegionStream {
    region: Region,
    subspace: Subspace,
    /// Bytes not yet fetched
    remaining: KeyRange,
    buffer: VecDeque<IndexEntry>,
    drained: bool,
}

impl RegionStream {
    fn new(region: Region, subspace: Subspace, remaining: KeyRange) -> Self {
        let drained = remaining.is_empty();
        Self {
            region,
            subspace,
            remaining,
            buffer: VecDeque::new(),
            drained,
        }
    }

    /// Narrow the stream to positions after `key` in scan order
    fn resume_after(&mut self, key: &Element, inclusive: bool, reverse: bool) {
        let packed = self.subspace.pack_element(key);
        if reverse {
            let end = if inclusive { key_after(&packed) } else { packed };
            if end < self.remaining.end {
                self.remaining.end = end;
            }
        } else {
            let begin = if inclusive { packed } else { key_after(&packed) };
            if begin > self.remaining.begin {
                self.remaining.begin = begin;
            }
        }
        self.drained = self.remaining.is_empty();
    }

    fn fill<T: Transaction + ?Sized>(
        &mut self,
        tx: &mut T,
        batch: usize,
        reverse: bool,
        metrics: &IndexMetrics,
    ) -> IndexResult<()> {
        if !self.buffer.is_empty() || self.drained {
            return Ok(());
        }

        let raw = tx.get_range(&self.remaining, batch, reverse)?;
        if raw.len() < batch {
            self.drained = true;
        } else if let Some(last) = raw.last() {
            if reverse {
                self.remaining.end = last.key.clone();
            } else {
                self.remaining.begin = key_after(&last.key);
            }
        }

        for kv in raw {
            metrics.count_key_value(kv.key.len(), kv.value.len());
            let key = Tuple::unpack_single(self.subspace.strip(&kv.key)?)?;
            let payload = CounterPayload::decode(&kv.value)
                .map_err(|reason| IndexError::corrupt_counter(&key, reason))?;
            self.buffer.push_back(IndexEntry {
                key,
                count: payload.count(),
                region: self.region,
                payload,
            });
        }
        Ok(())
    }

    fn peek(&self) -> Option<&IndexEntry> {
        self.buffer.front()
    }

    fn pop(&mut self) -> Option<IndexEntry> {
        self.buffer.pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.drained && self.buffer.is_empty()
    }
}

/// Lazy, restartable cursor over a refcount index.
///
/// Yields `Err` at most once; the cursor is finished afterwards.
pub struct IndexCursor<'a, T: Transaction + ?Sized> {
    tx: &'a mut T,
    keyspace: &'a IndexKeyspace,
    metrics: &'a IndexMetrics,
    policy: CollisionPolicy,
    batch: usize,
    properties: ScanProperties,
    live: RegionStream,
    zero: RegionStream,
    returned: usize,
    /// Position of the last entry returned, or the resume position
    position: Option<(Region, Element)>,
    exhausted: bool,
    failed: bool,
}

impl<'a, T: Transaction + ?Sized> IndexCursor<'a, T> {
    pub(crate) fn open(
        tx: &'a mut T,
        keyspace: &'a IndexKeyspace,
        metrics: &'a IndexMetrics,
        config: &RefcountIndexConfig,
        range: &ScanRange,
        continuation: Option<&[u8]>,
        properties: ScanProperties,
    ) -> IndexResult<Self> {
        let properties = ScanProperties {
            limit: properties.limit.filter(|&n| n > 0),
            ..properties
        };
        let live_space = keyspace.region(Region::Live).clone();
        let zero_space = keyspace.region(Region::ZeroMarker).clone();
        let mut live = RegionStream::new(
            Region::Live,
            live_space.clone(),
            range.region_bytes(&live_space),
        );
        let mut zero = RegionStream::new(
            Region::ZeroMarker,
            zero_space.clone(),
            range.region_bytes(&zero_space),
        );

        let position = match continuation {
            Some(token) => {
                let (last_region, last_key) = decode_continuation(keyspace, token)?;
                let last_rank = tie_rank(last_region, properties.reverse);
                for stream in [&mut live, &mut zero] {
                    let inclusive = tie_rank(stream.region, properties.reverse) > last_rank;
                    stream.resume_after(&last_key, inclusive, properties.reverse);
                }
                Some((last_region, last_key))
            }
            None => None,
        };

        Ok(Self {
            tx,
            keyspace,
            metrics,
            policy: config.on_collision,
            batch: config.scan_batch_size.max(1),
            properties,
            live,
            zero,
            returned: 0,
            position,
            exhausted: false,
            failed: false,
        })
    }

    /// Token resuming after the last entry returned.
    ///
    /// `None` once both regions are exhausted.
    pub fn continuation(&self) -> Option<Vec<u8>> {
        if self.exhausted {
            return None;
        }
        self.position
            .as_ref()
            .map(|(region, key)| encode_continuation(self.keyspace, *region, key))
    }

    fn fill(&mut self) -> IndexResult<()> {
        let reverse = self.properties.reverse;
        self.live.fill(&mut *self.tx, self.batch, reverse, self.metrics)?;
        self.zero.fill(&mut *self.tx, self.batch, reverse, self.metrics)?;
        if self.live.is_exhausted() && self.zero.is_exhausted() {
            self.exhausted = true;
        }
        Ok(())
    }

    fn advance(&mut self) -> IndexResult<Option<IndexEntry>> {
        if let Some(limit) = self.properties.limit {
            if self.returned >= limit {
                // Peek so a page that ends exactly at the end has no continuation
                self.fill()?;
                return Ok(None);
            }
        }

        self.fill()?;
        if self.exhausted {
            return Ok(None);
        }

        let reverse = self.properties.reverse;
        let take_live = match (self.live.peek(), self.zero.peek()) {
            (Some(l), Some(z)) if l.key == z.key => {
                let key = l.key.clone();
                self.on_collision(&key)?;
                tie_rank(Region::Live, reverse) == 0
            }
            (Some(l), Some(z)) => (l.key < z.key) != reverse,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return Ok(None),
        };

        let entry = if take_live {
            self.live.pop()
        } else {
            self.zero.pop()
        };
        if let Some(entry) = &entry {
            self.returned += 1;
            self.position = Some((entry.region, entry.key.clone()));
        }
        Ok(entry)
    }

    fn on_collision(&self, key: &Element) -> IndexResult<()> {
        self.metrics.increment_scan_collisions();
        log_event_with_fields(Event::ScanCollision, &[("key", &key.to_string())]);
        match self.policy {
            CollisionPolicy::Warn => Ok(()),
            CollisionPolicy::Fail => Err(IndexError::consistency(key)),
        }
    }
}

impl<'a, T: Transaction + ?Sized> Iterator for IndexCursor<'a, T> {
    type Item = IndexResult<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::counter::{encode_count, EMPTY_VALUE};
    use crate::index::IndexErrorCode;
    use crate::kv::MemoryKv;

    fn keyspace() -> IndexKeyspace {
        IndexKeyspace::bind(&Tuple::new().push("test").push("refs")).unwrap()
    }

    fn key(s: &str) -> Element {
        Element::from_string(s)
    }

    fn seed(kv: &MemoryKv, ks: &IndexKeyspace, live: &[(&str, u64)], zero: &[&str]) {
        let mut tx = kv.begin().unwrap();
        for (k, n) in live {
            tx.set(&ks.live_key(&key(k)), &encode_count(*n).unwrap());
        }
        for k in zero {
            tx.set(&ks.zero_key(&key(k)), &EMPTY_VALUE);
        }
        tx.commit().unwrap();
    }

    fn collect(
        kv: &MemoryKv,
        ks: &IndexKeyspace,
        config: &RefcountIndexConfig,
        range: ScanRange,
        properties: ScanProperties,
    ) -> Vec<(String, u64)> {
        let metrics = IndexMetrics::new();
        let mut tx = kv.begin().unwrap();
        IndexCursor::open(&mut tx, ks, &metrics, config, &range, None, properties)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.key.as_str().unwrap().to_string(), e.count)
            })
            .collect()
    }

    #[test]
    fn test_merges_regions_in_key_order() {
        let kv = MemoryKv::new();
        let ks = keyspace();
        seed(&kv, &ks, &[("a", 2), ("d", 1)], &["b", "c"]);

        let forward = collect(
            &kv,
            &ks,
            &RefcountIndexConfig::default(),
            ScanRange::all(),
            ScanProperties::forward(),
        );
        assert_eq!(
            forward,
            vec![("a".into(), 2), ("b".into(), 0), ("c".into(), 0), ("d".into(), 1)]
        );

        let reverse = collect(
            &kv,
            &ks,
            &RefcountIndexConfig::default(),
            ScanRange::all(),
            ScanProperties::reverse(),
        );
        let mut expected = forward.clone();
        expected.reverse();
        assert_eq!(reverse, expected);
    }

    #[test]
    fn test_small_batches_read_everything() {
        let kv = MemoryKv::new();
        let ks = keyspace();
        seed(&kv, &ks, &[("a", 1), ("c", 1), ("e", 1)], &["b", "d", "f"]);
        let config = RefcountIndexConfig {
            scan_batch_size: 1,
            ..Default::default()
        };

        let entries = collect(&kv, &ks, &config, ScanRange::all(), ScanProperties::forward());
        assert_eq!(entries.len(), 6);
    }

    #[test]
    fn test_range_bounds() {
        let kv = MemoryKv::new();
        let ks = keyspace();
        seed(&kv, &ks, &[("a", 1), ("b", 1), ("c", 1)], &["d"]);
        let config = RefcountIndexConfig::default();

        let between = collect(&kv, &ks, &config, ScanRange::between("b", "d"), ScanProperties::forward());
        assert_eq!(between, vec![("b".into(), 1), ("c".into(), 1)]);

        let single = collect(&kv, &ks, &config, ScanRange::single("d"), ScanProperties::forward());
        assert_eq!(single, vec![("d".into(), 0)]);

        let inverted = collect(&kv, &ks, &config, ScanRange::between("d", "a"), ScanProperties::forward());
        assert!(inverted.is_empty());
    }

    #[test]
    fn test_limit_and_continuation() {
        let kv = MemoryKv::new();
        let ks = keyspace();
        seed(&kv, &ks, &[("a", 1), ("c", 3)], &["b"]);
        let config = RefcountIndexConfig::default();
        let metrics = IndexMetrics::new();

        let mut tx = kv.begin().unwrap();
        let mut cursor = IndexCursor::open(
            &mut tx,
            &ks,
            &metrics,
            &config,
            &ScanRange::all(),
            None,
            ScanProperties::forward().with_limit(2),
        )
        .unwrap();
        let first: Vec<_> = cursor.by_ref().map(|e| e.unwrap().key).collect();
        assert_eq!(first, vec![key("a"), key("b")]);
        let token = cursor.continuation().unwrap();
        drop(cursor);

        let mut cursor = IndexCursor::open(
            &mut tx,
            &ks,
            &metrics,
            &config,
            &ScanRange::all(),
            Some(&token),
            ScanProperties::forward().with_limit(2),
        )
        .unwrap();
        let second: Vec<_> = cursor.by_ref().map(|e| e.unwrap().key).collect();
        assert_eq!(second, vec![key("c")]);
        assert!(cursor.continuation().is_none());
    }

    #[test]
    fn test_exact_page_has_no_continuation() {
        let kv = MemoryKv::new();
        let ks = keyspace();
        seed(&kv, &ks, &[("a", 1), ("b", 1)], &[]);
        let metrics = IndexMetrics::new();

        let mut tx = kv.begin().unwrap();
        let mut cursor = IndexCursor::open(
            &mut tx,
            &ks,
            &metrics,
            &RefcountIndexConfig::default(),
            &ScanRange::all(),
            None,
            ScanProperties::forward().with_limit(2),
        )
        .unwrap();
        assert_eq!(cursor.by_ref().count(), 2);
        assert!(cursor.continuation().is_none());
    }

    #[test]
    fn test_continuation_rejects_tampering() {
        let ks = keyspace();
        let mut token = encode_continuation(&ks, Region::Live, &key("a"));
        assert_eq!(
            decode_continuation(&ks, &token).unwrap(),
            (Region::Live, key("a"))
        );

        let last = token.len() - 1;
        token[last] ^= 0xff;
        let err = decode_continuation(&ks, &token).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountInvalidContinuation);

        let err = decode_continuation(&ks, &[1, 2]).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountInvalidContinuation);
    }

    #[test]
    fn test_collision_policies() {
        let kv = MemoryKv::new();
        let ks = keyspace();
        seed(&kv, &ks, &[("a", 1)], &["a"]);
        let metrics = IndexMetrics::new();

        let mut tx = kv.begin().unwrap();
        let warn: Vec<_> = IndexCursor::open(
            &mut tx,
            &ks,
            &metrics,
            &RefcountIndexConfig::default(),
            &ScanRange::all(),
            None,
            ScanProperties::forward(),
        )
        .unwrap()
        .map(|e| e.unwrap().region)
        .collect();
        assert_eq!(warn, vec![Region::Live, Region::ZeroMarker]);
        assert_eq!(metrics.snapshot().scan_collisions, 1);

        let fail = RefcountIndexConfig {
            on_collision: CollisionPolicy::Fail,
            ..Default::default()
        };
        let results: Vec<_> = IndexCursor::open(
            &mut tx,
            &ks,
            &metrics,
            &fail,
            &ScanRange::all(),
            None,
            ScanProperties::forward(),
        )
        .unwrap()
        .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap_err().code(),
            IndexErrorCode::AeroRefcountConsistency
        );
    }

    #[test]
    fn test_corrupt_payload() {
        let kv = MemoryKv::new();
        let ks = keyspace();
        let mut tx = kv.begin().unwrap();
        tx.set(&ks.live_key(&key("a")), &[1, 2, 3]);
        let metrics = IndexMetrics::new();

        let results: Vec<_> = IndexCursor::open(
            &mut tx,
            &ks,
            &metrics,
            &RefcountIndexConfig::default(),
            &ScanRange::all(),
            None,
            ScanProperties::forward(),
        )
        .unwrap()
        .collect();
        assert_eq!(
            results[0].as_ref().unwrap_err().code(),
            IndexErrorCode::AeroRefcountCorruptEntry
        );
    }

    #[test]
    fn test_scan_reports_read_volume() {
        let kv = MemoryKv::new();
        let ks = keyspace();
        seed(&kv, &ks, &[("a", 1)], &["b"]);
        let metrics = IndexMetrics::new();

        let mut tx = kv.begin().unwrap();
        let n = IndexCursor::open(
            &mut tx,
            &ks,
            &metrics,
            &RefcountIndexConfig::default(),
            &ScanRange::all(),
            None,
            ScanProperties::forward(),
        )
        .unwrap()
        .count();
        assert_eq!(n, 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.index_keys_loaded, 2);
        assert_eq!(snapshot.index_value_bytes, 8);
    }
}
