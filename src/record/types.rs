//! Owning record shapes
//!
//! The host hands records over as a type name plus a JSON body. The index
//! only understands a closed set of record types; decoding turns the host
//! form into `OwningRecord`, after which extraction is a total match.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::{IndexError, IndexResult};

/// Host record type name for invoices
pub const INVOICE_TYPE: &str = "Invoice";

/// Host record type name for stored objects
pub const OBJECT_TYPE: &str = "Object";

/// A record as the host store delivers it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Record type name from the host's schema
    pub record_type: String,
    /// Serialized record body
    pub body: Value,
}

impl StoredRecord {
    pub fn new(record_type: impl Into<String>, body: Value) -> Self {
        Self {
            record_type: record_type.into(),
            body,
        }
    }
}

/// One invoice line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// Product referenced by this line
    pub product: String,
    #[serde(default)]
    pub quantity: u32,
}

/// An invoice; references one product per line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub lines: Vec<InvoiceLine>,
}

/// A stored object; references the bucket holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
}

/// Every record type the refcount index maintains counters for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwningRecord {
    Invoice(Invoice),
    Object(StoredObject),
}

impl OwningRecord {
    /// Decode a host record.
    ///
    /// Unknown type names fail with `AERO_REFCOUNT_UNSUPPORTED_RECORD_TYPE`;
    /// a known type with a malformed body fails with
    /// `AERO_REFCOUNT_RECORD_DECODE_FAILED`.
    pub fn decode(record: &StoredRecord) -> IndexResult<Self> {
        match record.record_type.as_str() {
            INVOICE_TYPE => Invoice::deserialize(&record.body)
                .map(OwningRecord::Invoice)
                .map_err(|e| IndexError::record_decode(INVOICE_TYPE, e)),
            OBJECT_TYPE => StoredObject::deserialize(&record.body)
                .map(OwningRecord::Object)
                .map_err(|e| IndexError::record_decode(OBJECT_TYPE, e)),
            other => Err(IndexError::unsupported_record_type(other)),
        }
    }

    /// Host type name
    pub fn type_name(&self) -> &'static str {
        match self {
            OwningRecord::Invoice(_) => INVOICE_TYPE,
            OwningRecord::Object(_) => OBJECT_TYPE,
        }
    }

    /// Encode back into the host form
    pub fn to_stored(&self) -> StoredRecord {
        let body = match self {
            OwningRecord::Invoice(invoice) => serde_json::to_value(invoice),
            OwningRecord::Object(object) => serde_json::to_value(object),
        };
        // Serializing these structs cannot fail
        StoredRecord::new(self.type_name(), body.unwrap_or(Value::Null))
    }
}

impl From<Invoice> for OwningRecord {
    fn from(invoice: Invoice) -> Self {
        OwningRecord::Invoice(invoice)
    }
}

impl From<StoredObject> for OwningRecord {
    fn from(object: StoredObject) -> Self {
        OwningRecord::Object(object)
    }
}
