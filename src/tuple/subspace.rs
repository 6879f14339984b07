//! Tuples and subspaces
//!
//! A `Tuple` is an ordered list of elements packed back to back. A
//! `Subspace` is a raw byte prefix (usually a packed tuple) under which
//! further tuples are packed.

use std::fmt;

use crate::kv::KeyRange;

use super::element::Element;
use super::errors::{TupleError, TupleResult};

/// An ordered sequence of tuple elements
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tuple(Vec<Element>);

impl Tuple {
    /// Creates an empty tuple
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a tuple from elements
    pub fn from_elements(elements: Vec<Element>) -> Self {
        Self(elements)
    }

    /// Append an element, builder style
    pub fn push(mut self, element: impl Into<Element>) -> Self {
        self.0.push(element.into());
        self
    }

    /// Returns the elements
    pub fn elements(&self) -> &[Element] {
        &self.0
    }

    /// Consumes the tuple, returning its elements
    pub fn into_elements(self) -> Vec<Element> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pack into ordered bytes
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for element in &self.0 {
            element.encode_into(&mut out);
        }
        out
    }

    /// Unpack a full byte string into a tuple
    pub fn unpack(bytes: &[u8]) -> TupleResult<Self> {
        let mut elements = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let (element, next) = Element::decode_from(bytes, pos)?;
            elements.push(element);
            pos = next;
        }
        Ok(Self(elements))
    }

    /// Unpack a byte string that must hold exactly one element
    pub fn unpack_single(bytes: &[u8]) -> TupleResult<Element> {
        let mut elements = Self::unpack(bytes)?.0;
        if elements.len() != 1 {
            return Err(TupleError::Arity {
                expected: 1,
                found: elements.len(),
            });
        }
        Ok(elements.remove(0))
    }
}

impl From<Vec<Element>> for Tuple {
    fn from(elements: Vec<Element>) -> Self {
        Self(elements)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", element)?;
        }
        write!(f, ")")
    }
}

/// A keyspace prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    /// Subspace whose prefix is the packed tuple
    pub fn from_tuple(tuple: &Tuple) -> Self {
        Self {
            prefix: tuple.pack(),
        }
    }

    /// Returns the raw prefix
    pub fn key(&self) -> &[u8] {
        &self.prefix
    }

    /// Nested subspace: this prefix followed by the packed child tuple
    pub fn subspace(&self, child: &Tuple) -> Subspace {
        Self {
            prefix: self.pack(child),
        }
    }

    /// Full key for a tuple inside this subspace
    pub fn pack(&self, tuple: &Tuple) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&tuple.pack());
        key
    }

    /// Full key for a single element inside this subspace
    pub fn pack_element(&self, element: &Element) -> Vec<u8> {
        let mut key = self.prefix.clone();
        element.encode_into(&mut key);
        key
    }

    /// Returns whether `key` lies inside this subspace
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Strip the prefix, returning the subspace-relative suffix
    pub fn strip<'a>(&self, key: &'a [u8]) -> TupleResult<&'a [u8]> {
        key.strip_prefix(self.prefix.as_slice())
            .ok_or(TupleError::PrefixMismatch)
    }

    /// Decode a full key back into the tuple packed under this subspace
    pub fn unpack(&self, key: &[u8]) -> TupleResult<Tuple> {
        Tuple::unpack(self.strip(key)?)
    }

    /// Range covering every tuple packed under this subspace
    pub fn range(&self) -> KeyRange {
        let mut begin = self.prefix.clone();
        begin.push(0x00);
        let mut end = self.prefix.clone();
        end.push(0xff);
        KeyRange::new(begin, end)
    }
}
