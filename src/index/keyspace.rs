//! Index keyspace layout
//!
//! ```text
//! <index subspace> ("refcount", key) -> i64 little-endian count (>= 1)
//! <index subspace> ("zero", key)     -> empty
//! ```
//!
//! The index subspace is the namespace the host assigned to the index with
//! any `#version` suffix stripped from its last element, so every version
//! of an index definition shares one set of counters.

use std::fmt;

use crate::tuple::{Element, Subspace, Tuple};

use super::errors::{IndexError, IndexResult};

/// The two disjoint regions of the index keyspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    /// Live counters, count >= 1
    Live,
    /// Zero markers for keys whose count dropped to zero
    ZeroMarker,
}

impl Region {
    /// Sub-name under the index subspace
    pub fn name(&self) -> &'static str {
        match self {
            Region::Live => "refcount",
            Region::ZeroMarker => "zero",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "refcount" => Some(Region::Live),
            "zero" => Some(Region::ZeroMarker),
            _ => None,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolved keyspace prefixes for one refcount index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKeyspace {
    index: Subspace,
    live: Subspace,
    zero: Subspace,
}

impl IndexKeyspace {
    /// Resolve the keyspace from the namespace assigned to the index.
    ///
    /// Fails on an empty namespace.
    pub fn bind(assigned: &Tuple) -> IndexResult<Self> {
        let mut elements = assigned.elements().to_vec();
        let last = elements
            .pop()
            .ok_or_else(|| IndexError::invalid_index("Index namespace is empty"))?;

        let base = match last {
            Element::String(name) => {
                let stripped = name.split('#').next().unwrap_or_default().to_string();
                if stripped.is_empty() {
                    return Err(IndexError::invalid_index(format!(
                        "Index namespace element '{}' has no base name",
                        name
                    )));
                }
                Element::String(stripped)
            }
            other => other,
        };
        elements.push(base);

        Ok(Self::from_index_subspace(Subspace::from_tuple(&Tuple::from(elements))))
    }

    /// Layout under an already-resolved index subspace
    pub fn from_index_subspace(index: Subspace) -> Self {
        let live = index.subspace(&Tuple::new().push(Region::Live.name()));
        let zero = index.subspace(&Tuple::new().push(Region::ZeroMarker.name()));
        Self { index, live, zero }
    }

    /// The whole index subspace
    pub fn index(&self) -> &Subspace {
        &self.index
    }

    /// Subspace of one region
    pub fn region(&self, region: Region) -> &Subspace {
        match region {
            Region::Live => &self.live,
            Region::ZeroMarker => &self.zero,
        }
    }

    /// Key of the live counter for `key`
    pub fn live_key(&self, key: &Element) -> Vec<u8> {
        self.live.pack_element(key)
    }

    /// Key of the zero marker for `key`
    pub fn zero_key(&self, key: &Element) -> Vec<u8> {
        self.zero.pack_element(key)
    }

    /// Decode a full index key into its region and referenced key
    pub fn decode_key(&self, raw: &[u8]) -> IndexResult<(Region, Element)> {
        let relative = self.index.strip(raw)?;
        self.decode_relative(relative)
    }

    /// Decode a key relative to the index subspace
    pub fn decode_relative(&self, relative: &[u8]) -> IndexResult<(Region, Element)> {
        let mut elements = Tuple::unpack(relative)?.into_elements();
        if elements.len() != 2 {
            return Err(IndexError::corrupt_key(format!(
                "expected (region, key), found {} element(s)",
                elements.len()
            )));
        }
        let key = elements.remove(1);
        let region = elements[0]
            .as_str()
            .and_then(Region::from_name)
            .ok_or_else(|| IndexError::corrupt_key(format!("unknown region {}", elements[0])))?;
        Ok((region, key))
    }

    /// Key of `key` in `region`, relative to the index subspace
    pub fn relative_key(&self, region: Region, key: &Element) -> Vec<u8> {
        Tuple::new().push(region.name()).push(key.clone()).pack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexErrorCode;

    fn namespace(last: &str) -> Tuple {
        Tuple::new().push("demostore").push("indexes").push(last)
    }

    #[test]
    fn test_bind_strips_version_suffix() {
        let versioned = IndexKeyspace::bind(&namespace("product_refs#3")).unwrap();
        let plain = IndexKeyspace::bind(&namespace("product_refs")).unwrap();
        assert_eq!(versioned, plain);
        assert_eq!(
            versioned.index().key(),
            namespace("product_refs").pack().as_slice()
        );
    }

    #[test]
    fn test_bind_keeps_non_string_tail() {
        let ns = Tuple::new().push("store").push(42i64);
        let keyspace = IndexKeyspace::bind(&ns).unwrap();
        assert_eq!(keyspace.index().key(), ns.pack().as_slice());
    }

    #[test]
    fn test_bind_rejects_empty_namespace() {
        let err = IndexKeyspace::bind(&Tuple::new()).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountInvalidIndex);

        let err = IndexKeyspace::bind(&namespace("#2")).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountInvalidIndex);
    }

    #[test]
    fn test_regions_are_disjoint() {
        let keyspace = IndexKeyspace::bind(&namespace("refs")).unwrap();
        let key = Element::from_string("p1");
        let live = keyspace.live_key(&key);
        let zero = keyspace.zero_key(&key);

        assert!(keyspace.region(Region::Live).range().contains(&live));
        assert!(!keyspace.region(Region::Live).range().contains(&zero));
        assert!(keyspace.region(Region::ZeroMarker).range().contains(&zero));
        assert!(keyspace.index().range().contains(&live));
        assert!(keyspace.index().range().contains(&zero));
    }

    #[test]
    fn test_decode_key() {
        let keyspace = IndexKeyspace::bind(&namespace("refs")).unwrap();
        let key = Element::from_int(-7);
        assert_eq!(
            keyspace.decode_key(&keyspace.zero_key(&key)).unwrap(),
            (Region::ZeroMarker, key.clone())
        );
        assert_eq!(
            keyspace.decode_key(&keyspace.live_key(&key)).unwrap(),
            (Region::Live, key)
        );
    }

    #[test]
    fn test_decode_unknown_region() {
        let keyspace = IndexKeyspace::bind(&namespace("refs")).unwrap();
        let raw = keyspace.index().pack(&Tuple::new().push("other").push("p1"));
        let err = keyspace.decode_key(&raw).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountCorruptEntry);
    }
}
