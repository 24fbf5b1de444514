//! Capability registry
//!
//! Each backend publishes a fixed set of feature flags. The facade checks
//! the parsed statement against the target adapter's set and rejects
//! unsupported combinations with `NotSupported` before any dispatch, so a
//! caller never pays for a round trip that was always going to fail.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Native binary (`Value::Bytes`) storage without base64 projection.
    TypeBinary,
    /// Wildcard (all-fields) index definitions.
    IndexWildcard,
    /// Vector/ANN index definitions.
    IndexVector,
    /// The `move(other_path)` update mutator.
    UpdateArrayMove,
    /// Transactions spanning more than one collection.
    TransactCrossCollection,
    /// Native optimistic concurrency via `$etag`.
    Etag,
    /// Numeric range comparisons (`<`, `<=`, `>`, `>=`, `between`) on string-typed fields.
    RangeOnString,
    /// The `contains` / `starts_with` string predicates.
    StringSearch,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::TypeBinary => "TYPE_BINARY",
            Capability::IndexWildcard => "INDEX_WILDCARD",
            Capability::IndexVector => "INDEX_VECTOR",
            Capability::UpdateArrayMove => "UPDATE_ARRAY_MOVE",
            Capability::TransactCrossCollection => "TRANSACT_CROSS_COLLECTION",
            Capability::Etag => "ETAG",
            Capability::RangeOnString => "RANGE_ON_STRING",
            Capability::StringSearch => "STRING_SEARCH",
        }
    }
}

/// The feature set published by one bound adapter instance.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    enabled: HashSet<Capability>,
}

impl CapabilitySet {
    pub fn new(enabled: impl IntoIterator<Item = Capability>) -> Self {
        CapabilitySet {
            enabled: enabled.into_iter().collect(),
        }
    }

    /// The permissive set: every capability supported. Used by the
    /// in-memory and SQLite backends, which implement the full contract.
    pub fn all() -> Self {
        CapabilitySet::new([
            Capability::TypeBinary,
            Capability::IndexWildcard,
            Capability::IndexVector,
            Capability::UpdateArrayMove,
            Capability::TransactCrossCollection,
            Capability::Etag,
            Capability::RangeOnString,
            Capability::StringSearch,
        ])
    }

    pub fn supports(&self, cap: Capability) -> bool {
        self.enabled.contains(&cap)
    }

    pub fn with(mut self, cap: Capability) -> Self {
        self.enabled.insert(cap);
        self
    }

    pub fn without(mut self, cap: Capability) -> Self {
        self.enabled.remove(&cap);
        self
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        CapabilitySet::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_enables_every_capability() {
        let caps = CapabilitySet::all();
        assert!(caps.supports(Capability::Etag));
        assert!(caps.supports(Capability::UpdateArrayMove));
    }

    #[test]
    fn without_removes_a_single_capability() {
        let caps = CapabilitySet::all().without(Capability::StringSearch);
        assert!(!caps.supports(Capability::StringSearch));
        assert!(caps.supports(Capability::Etag));
    }
}
