//! Order-preserving tuple encoding
//!
//! Keys are packed so that byte-wise comparison of the encodings matches
//! `Ord` on the decoded values. Ordering across types is
//! deterministic: Bytes < String < Int.

use std::fmt;

use super::errors::{TupleError, TupleResult};

const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const INT_ZERO_CODE: u8 = 0x14;
const NEG_INT_MIN_CODE: u8 = 0x0c;
const POS_INT_MAX_CODE: u8 = 0x1c;
const ESCAPE: u8 = 0xff;

/// A single tuple element.
///
/// Referenced keys extracted from owning records are elements; so are the
/// components of a subspace prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    /// Raw byte string
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Signed integer
    Int(i64),
}

impl Element {
    /// Create a string element
    pub fn from_string(v: impl Into<String>) -> Self {
        Element::String(v.into())
    }

    /// Create an integer element
    pub fn from_int(v: i64) -> Self {
        Element::Int(v)
    }

    /// Create a byte string element
    pub fn from_bytes(v: impl Into<Vec<u8>>) -> Self {
        Element::Bytes(v.into())
    }

    /// Returns the string value, if this is a string element
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::String(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering used by the CLI
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Element::Bytes(b) => serde_json::json!({ "bytes": b }),
            Element::String(s) => serde_json::Value::String(s.clone()),
            Element::Int(i) => serde_json::Value::from(*i),
        }
    }

    /// Append the encoding of this element to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Element::Bytes(b) => {
                out.push(BYTES_CODE);
                encode_escaped(out, b);
            }
            Element::String(s) => {
                out.push(STRING_CODE);
                encode_escaped(out, s.as_bytes());
            }
            Element::Int(v) => encode_int(out, *v),
        }
    }

    /// Decode one element starting at `pos`.
    ///
    /// Returns the element and the position just past it.
    pub fn decode_from(bytes: &[u8], pos: usize) -> TupleResult<(Element, usize)> {
        let code = *bytes.get(pos).ok_or(TupleError::Truncated(pos))?;
        match code {
            BYTES_CODE => {
                let (raw, next) = decode_escaped(bytes, pos + 1)?;
                Ok((Element::Bytes(raw), next))
            }
            STRING_CODE => {
                let (raw, next) = decode_escaped(bytes, pos + 1)?;
                let s = String::from_utf8(raw).map_err(|_| TupleError::InvalidUtf8)?;
                Ok((Element::String(s), next))
            }
            NEG_INT_MIN_CODE..=POS_INT_MAX_CODE => decode_int(bytes, pos),
            other => Err(TupleError::UnknownTypeCode(other, pos)),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Bytes(b) => {
                write!(f, "b\"")?;
                for byte in b {
                    write!(f, "\\x{:02x}", byte)?;
                }
                write!(f, "\"")
            }
            Element::String(s) => write!(f, "\"{}\"", s),
            Element::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for Element {
    fn from(v: &str) -> Self {
        Element::String(v.to_string())
    }
}

impl From<String> for Element {
    fn from(v: String) -> Self {
        Element::String(v)
    }
}

impl From<i64> for Element {
    fn from(v: i64) -> Self {
        Element::Int(v)
    }
}

fn encode_escaped(out: &mut Vec<u8>, raw: &[u8]) {
    for &b in raw {
        out.push(b);
        if b == 0x00 {
            out.push(ESCAPE);
        }
    }
    out.push(0x00);
}

fn decode_escaped(bytes: &[u8], mut pos: usize) -> TupleResult<(Vec<u8>, usize)> {
    let mut raw = Vec::new();
    loop {
        let b = *bytes.get(pos).ok_or(TupleError::Truncated(pos))?;
        if b == 0x00 {
            if bytes.get(pos + 1) == Some(&ESCAPE) {
                raw.push(0x00);
                pos += 2;
                continue;
            }
            return Ok((raw, pos + 1));
        }
        raw.push(b);
        pos += 1;
    }
}

fn encode_int(out: &mut Vec<u8>, v: i64) {
    if v == 0 {
        out.push(INT_ZERO_CODE);
        return;
    }

    let magnitude = v.unsigned_abs();
    let len = 8 - (magnitude.leading_zeros() / 8) as usize;

    if v > 0 {
        out.push(INT_ZERO_CODE + len as u8);
        out.extend_from_slice(&magnitude.to_be_bytes()[8 - len..]);
    } else {
        // Ones-complement keeps larger magnitudes sorting first
        out.push(INT_ZERO_CODE - len as u8);
        out.extend_from_slice(&(!magnitude).to_be_bytes()[8 - len..]);
    }
}

fn decode_int(bytes: &[u8], pos: usize) -> TupleResult<(Element, usize)> {
    let code = bytes[pos];
    if code == INT_ZERO_CODE {
        return Ok((Element::Int(0), pos + 1));
    }

    let negative = code < INT_ZERO_CODE;
    let len = if negative {
        (INT_ZERO_CODE - code) as usize
    } else {
        (code - INT_ZERO_CODE) as usize
    };

    let start = pos + 1;
    let end = start + len;
    let body = bytes.get(start..end).ok_or(TupleError::Truncated(bytes.len()))?;

    let mut buf = [0u8; 8];
    buf[8 - len..].copy_from_slice(body);
    let raw = u64::from_be_bytes(buf);

    let value: i128 = if negative {
        let mask: u64 = if len == 8 { u64::MAX } else { (1u64 << (8 * len)) - 1 };
        -i128::from(mask - raw)
    } else {
        i128::from(raw)
    };

    let value = i64::try_from(value).map_err(|_| TupleError::IntegerOverflow)?;
    Ok((Element::Int(value), end))
}
