//! Metrics registry for the document store
//!
//! - Counters only (no gauges, no histograms)
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe but lock-minimal

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics registry containing all operational counters.
///
/// All counters use atomic operations for thread-safe increments, with
/// `Relaxed` ordering: exact cross-counter ordering is not required, only
/// that each counter's own updates are monotonic.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    puts: AtomicU64,
    gets: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    queries: AtomicU64,
    counts: AtomicU64,
    batches: AtomicU64,
    transactions: AtomicU64,
    transactions_aborted: AtomicU64,
    collections_created: AtomicU64,
    collections_dropped: AtomicU64,
    indexes_created: AtomicU64,
    indexes_dropped: AtomicU64,
    errors: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_puts(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_gets(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_updates(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletes(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_counts(&self) {
        self.counts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions(&self) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_aborted(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_collections_created(&self) {
        self.collections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_collections_dropped(&self) {
        self.collections_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_indexes_created(&self) {
        self.indexes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_indexes_dropped(&self) {
        self.indexes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values as a snapshot, for logging or `explain`-style introspection.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            puts: self.puts.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            counts: self.counts.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            transactions: self.transactions.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            collections_created: self.collections_created.load(Ordering::Relaxed),
            collections_dropped: self.collections_dropped.load(Ordering::Relaxed),
            indexes_created: self.indexes_created.load(Ordering::Relaxed),
            indexes_dropped: self.indexes_dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"puts":{},"gets":{},"updates":{},"deletes":{},"queries":{},"counts":{},"batches":{},"transactions":{},"transactions_aborted":{},"collections_created":{},"collections_dropped":{},"indexes_created":{},"indexes_dropped":{},"errors":{}}}"#,
            s.puts,
            s.gets,
            s.updates,
            s.deletes,
            s.queries,
            s.counts,
            s.batches,
            s.transactions,
            s.transactions_aborted,
            s.collections_created,
            s.collections_dropped,
            s.indexes_created,
            s.indexes_dropped,
            s.errors,
        )
    }
}

/// A point-in-time snapshot of all metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub puts: u64,
    pub gets: u64,
    pub updates: u64,
    pub deletes: u64,
    pub queries: u64,
    pub counts: u64,
    pub batches: u64,
    pub transactions: u64,
    pub transactions_aborted: u64,
    pub collections_created: u64,
    pub collections_dropped: u64,
    pub indexes_created: u64,
    pub indexes_dropped: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn increments_are_independent() {
        let registry = MetricsRegistry::new();
        registry.increment_puts();
        registry.increment_puts();
        registry.increment_gets();
        registry.increment_transactions_aborted();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.puts, 2);
        assert_eq!(snapshot.gets, 1);
        assert_eq!(snapshot.transactions_aborted, 1);
        assert_eq!(snapshot.deletes, 0);
    }

    #[test]
    fn to_json_contains_all_fields() {
        let registry = MetricsRegistry::new();
        registry.increment_queries();
        let json = registry.to_json();
        assert!(json.contains("\"queries\":1"));
        assert!(json.contains("\"errors\":0"));
    }
}
