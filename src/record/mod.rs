//! Owning records and reference extraction
//!
//! Owning records are the primary records whose presence drives the
//! counters. This module decodes them from the host form and computes the
//! counter operations a mutation implies. It has no side effects.

mod extract;
mod types;

pub use extract::{extract_references, plan_deltas, plan_update, MutationKind};
pub use types::{
    Invoice, InvoiceLine, OwningRecord, StoredObject, StoredRecord, INVOICE_TYPE, OBJECT_TYPE,
};
