//! Host transaction contract
//!
//! The refcount index never opens, commits or retries transactions. It only
//! issues point reads, point writes, clears, atomic adds and range reads on a
//! transaction the host hands it.

use super::errors::KvResult;

/// Half-open byte range `[begin, end)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    /// Inclusive start
    pub begin: Vec<u8>,
    /// Exclusive end
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Creates a range `[begin, end)`
    pub fn new(begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }

    /// Range holding exactly one key
    pub fn single(key: &[u8]) -> Self {
        Self::new(key.to_vec(), key_after(key))
    }

    /// Returns whether `key` falls inside the range
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.begin.as_slice() && key < self.end.as_slice()
    }

    /// Returns whether the range holds no keys
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// Returns whether two ranges share at least one key
    pub fn intersects(&self, other: &KeyRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.begin < other.end
            && other.begin < self.end
    }
}

/// Smallest key strictly greater than `key`
pub fn key_after(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0x00);
    next
}

/// A key and its value as returned by a range read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Operations the host transaction must provide.
///
/// Reads observe this transaction's own earlier writes. Writes are buffered
/// until the host commits; they cannot fail locally.
pub trait Transaction {
    /// Point read
    fn get(&mut self, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Point write
    fn set(&mut self, key: &[u8], value: &[u8]);

    /// Point delete
    fn clear(&mut self, key: &[u8]);

    /// Delete every key in the range
    fn clear_range(&mut self, range: &KeyRange);

    /// Commutative little-endian integer add.
    ///
    /// Does not read the key and registers no read conflict, so concurrent
    /// adds to the same key never conflict with each other.
    fn atomic_add(&mut self, key: &[u8], param: &[u8]);

    /// Range read in key order (descending when `reverse`), at most `limit`
    /// pairs. A limit of zero means unlimited.
    fn get_range(&mut self, range: &KeyRange, limit: usize, reverse: bool)
        -> KvResult<Vec<KeyValue>>;
}

/// Little-endian add of `param` onto `existing`.
///
/// A missing value counts as zero. The result is as wide as `param`; the
/// existing value is truncated or zero-extended to match and the carry out
/// of the top byte is dropped.
pub fn add_little_endian(existing: Option<&[u8]>, param: &[u8]) -> Vec<u8> {
    let existing = existing.unwrap_or(&[]);
    let mut out = Vec::with_capacity(param.len());
    let mut carry = 0u16;
    for (i, p) in param.iter().enumerate() {
        let e = existing.get(i).copied().unwrap_or(0);
        let sum = u16::from(e) + u16::from(*p) + carry;
        out.push((sum & 0xff) as u8);
        carry = sum >> 8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_to_missing() {
        assert_eq!(add_little_endian(None, &1i64.to_le_bytes()), 1i64.to_le_bytes());
    }

    #[test]
    fn test_add_carries() {
        let existing = 255i64.to_le_bytes();
        let sum = add_little_endian(Some(&existing[..]), &1i64.to_le_bytes());
        assert_eq!(sum, 256i64.to_le_bytes());
    }

    #[test]
    fn test_add_negative_wraps() {
        let existing = 5i64.to_le_bytes();
        let sum = add_little_endian(Some(&existing[..]), &(-1i64).to_le_bytes());
        assert_eq!(sum, 4i64.to_le_bytes());
    }

    #[test]
    fn test_add_resizes_existing() {
        let sum = add_little_endian(Some(&[0x01u8, 0x00, 0x00, 0x00][..]), &2i64.to_le_bytes());
        assert_eq!(sum, 3i64.to_le_bytes());
    }

    #[test]
    fn test_range_intersection() {
        let a = KeyRange::new(b"a".to_vec(), b"c".to_vec());
        let b = KeyRange::new(b"b".to_vec(), b"d".to_vec());
        let c = KeyRange::new(b"c".to_vec(), b"e".to_vec());
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(KeyRange::single(b"b").intersects(&a));
    }

    #[test]
    fn test_empty_range() {
        assert!(KeyRange::new(b"b".to_vec(), b"a".to_vec()).is_empty());
        assert!(!KeyRange::single(b"a").is_empty());
    }
}
