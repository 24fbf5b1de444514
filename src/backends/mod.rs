//! Adapter contract
//!
//! Each backend implements collection/index lifecycle management plus the
//! data operations, against pre-parsed AST fragments and already-bound
//! values — never a raw statement string. Adapters translate the AST to
//! their native representation, enforce optimistic concurrency using
//! their own primitives (or a simulated read-modify-write), and map
//! native failures onto `StoreError` at the boundary.

pub mod memory;
pub mod remote;
pub mod sqlite;

use async_trait::async_trait;

use crate::core::capability::{Capability, CapabilitySet};
use crate::core::error::StoreResult;
use crate::core::key::{Item, Key};
use crate::ql::{Expr, QueryClause, Returning, Select, SetClause};
use crate::value::Value;

pub use memory::MemoryAdapter;
pub use remote::RemoteAdapter;
pub use sqlite::SqliteAdapter;

/// A single PUT/UPDATE/DELETE lowered from `ql::DataOp`: the target
/// collection resolved, the key/value expressions evaluated to concrete
/// values, ready for an adapter to apply.
#[derive(Debug, Clone)]
pub enum BoundDataOp {
    Put {
        collection: String,
        value: Value,
        where_: Option<Expr>,
        returning: Option<Returning>,
    },
    Update {
        collection: String,
        key: Key,
        set: SetClause,
        where_: Option<Expr>,
        returning: Option<Returning>,
    },
    Delete {
        collection: String,
        key: Key,
        where_: Option<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Created,
    Exists,
    Dropped,
    NotExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Created,
    Exists,
    Covered,
    Dropped,
    NotExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Field,
    Composite,
    Wildcard,
    Array,
    Hash,
    Vector,
    Text,
    Geospatial,
    Ttl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub kind: IndexKind,
    pub fields: Vec<String>,
}

impl IndexSpec {
    pub fn field(name: impl Into<String>, field: impl Into<String>) -> Self {
        IndexSpec {
            name: name.into(),
            kind: IndexKind::Field,
            fields: vec![field.into()],
        }
    }
}

/// The per-backend implementation of the document-store contract. Every
/// method receives pre-parsed AST and fully bound values; adapters never
/// see statement text or `@name` placeholders.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn capabilities(&self) -> &CapabilitySet;

    fn supports(&self, cap: Capability) -> bool {
        self.capabilities().supports(cap)
    }

    async fn create_collection(&self, name: &str, if_not_exists: bool) -> StoreResult<CollectionStatus>;
    async fn drop_collection(&self, name: &str, if_exists: bool) -> StoreResult<CollectionStatus>;
    async fn list_collections(&self) -> StoreResult<Vec<String>>;
    async fn has_collection(&self, name: &str) -> StoreResult<bool>;

    async fn create_index(&self, collection: &str, index: IndexSpec) -> StoreResult<IndexStatus>;
    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<IndexStatus>;
    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>>;

    async fn get(&self, collection: &str, key: &Key, select: Option<&Select>) -> StoreResult<Option<Item>>;
    async fn put(
        &self,
        collection: &str,
        value: Value,
        where_: Option<&Expr>,
        returning: Option<Returning>,
    ) -> StoreResult<Item>;
    async fn update(
        &self,
        collection: &str,
        key: &Key,
        set: &SetClause,
        where_: Option<&Expr>,
        returning: Option<Returning>,
    ) -> StoreResult<Item>;
    async fn delete(&self, collection: &str, key: &Key, where_: Option<&Expr>) -> StoreResult<()>;

    async fn query(&self, collection: &str, clause: &QueryClause) -> StoreResult<Vec<Value>>;
    async fn count(&self, collection: &str, clause: &QueryClause) -> StoreResult<u64>;

    async fn batch(&self, ops: &[BoundDataOp]) -> StoreResult<Vec<crate::core::operation::OperationResult>>;
    async fn transact(&self, ops: &[BoundDataOp]) -> StoreResult<Vec<crate::core::operation::OperationResult>>;

    async fn close(&self) -> StoreResult<()>;
}
