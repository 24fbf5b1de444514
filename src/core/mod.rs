//! Core document-store model.
//!
//! Types shared by the statement binder, the predicate/update evaluators,
//! the `DocumentStore` facade, and every backend adapter: the error
//! taxonomy, the key/item shapes, the capability registry, and the
//! unified operation/response model.

pub mod capability;
pub mod error;
pub mod key;
pub mod operation;

pub use capability::{Capability, CapabilitySet};
pub use error::{StoreError, StoreResult};
pub use key::{Item, Key, Properties};
pub use operation::{Batch, Operation, OperationResult, Response, Transaction, Verb};
