//! portadb - A provider-agnostic storage abstraction layer
//!
//! A single operation model (put/get/delete/update/query/count/batch/
//! transact) plus a portable textual query/update language sit in front of a
//! heterogeneous set of backends. Callers write against `DocumentStore` and
//! bind whichever `Adapter` fits; call sites never change.

pub mod backends;
pub mod cli;
pub mod core;
pub mod eval;
pub mod observability;
pub mod ql;
pub mod store;
pub mod value;
