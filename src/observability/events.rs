//! Observable lifecycle events for the document store.
//!
//! Events are explicit and typed so that log lines are greppable by a
//! stable event name rather than free text.

use std::fmt;

/// Observable events emitted while a store instance is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A store instance was opened (adapter resources acquired).
    StoreOpened,
    /// A store instance was closed.
    StoreClosed,
    /// An operation was attempted against a closed store.
    StoreClosedRejected,

    /// A collection was created.
    CollectionCreated,
    /// `create_collection` found the collection already present.
    CollectionExists,
    /// A collection was dropped.
    CollectionDropped,
    /// `drop_collection` found no such collection.
    CollectionNotFound,

    /// An index was created.
    IndexCreated,
    /// `create_index` found an equivalent index already present.
    IndexExists,
    /// An index was dropped.
    IndexDropped,

    /// A statement was parsed into an AST.
    StatementParsed,
    /// Parsing failed.
    StatementRejected,
    /// Named-parameter binding completed.
    ParamsBound,

    /// `put` applied.
    PutApplied,
    /// `get` returned a document.
    GetHit,
    /// `get` found nothing.
    GetMiss,
    /// `update` applied.
    UpdateApplied,
    /// `delete` applied.
    DeleteApplied,
    /// A precondition (`where`) did not hold.
    PreconditionFailed,

    /// `query` executed.
    QueryExecuted,
    /// `count` executed.
    CountExecuted,

    /// A batch block executed (independent per-item outcome).
    BatchExecuted,
    /// A transaction committed.
    TransactionCommitted,
    /// A transaction aborted because a precondition failed.
    TransactionAborted,

    /// A capability check rejected the operation before dispatch.
    CapabilityRejected,
}

impl Event {
    /// Returns the stable string name of the event, as it appears in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpened => "STORE_OPENED",
            Event::StoreClosed => "STORE_CLOSED",
            Event::StoreClosedRejected => "STORE_CLOSED_REJECTED",

            Event::CollectionCreated => "COLLECTION_CREATED",
            Event::CollectionExists => "COLLECTION_EXISTS",
            Event::CollectionDropped => "COLLECTION_DROPPED",
            Event::CollectionNotFound => "COLLECTION_NOT_FOUND",

            Event::IndexCreated => "INDEX_CREATED",
            Event::IndexExists => "INDEX_EXISTS",
            Event::IndexDropped => "INDEX_DROPPED",

            Event::StatementParsed => "STATEMENT_PARSED",
            Event::StatementRejected => "STATEMENT_REJECTED",
            Event::ParamsBound => "PARAMS_BOUND",

            Event::PutApplied => "PUT_APPLIED",
            Event::GetHit => "GET_HIT",
            Event::GetMiss => "GET_MISS",
            Event::UpdateApplied => "UPDATE_APPLIED",
            Event::DeleteApplied => "DELETE_APPLIED",
            Event::PreconditionFailed => "PRECONDITION_FAILED",

            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::CountExecuted => "COUNT_EXECUTED",

            Event::BatchExecuted => "BATCH_EXECUTED",
            Event::TransactionCommitted => "TRANSACTION_COMMITTED",
            Event::TransactionAborted => "TRANSACTION_ABORTED",

            Event::CapabilityRejected => "CAPABILITY_REJECTED",
        }
    }

    /// True for events that represent an operation being refused outright.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Event::StoreClosedRejected
                | Event::StatementRejected
                | Event::PreconditionFailed
                | Event::TransactionAborted
                | Event::CapabilityRejected
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_shouty_snake_case() {
        let events = [
            Event::StoreOpened,
            Event::CollectionCreated,
            Event::PutApplied,
            Event::TransactionAborted,
            Event::CapabilityRejected,
        ];
        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn rejection_events_are_flagged() {
        assert!(Event::PreconditionFailed.is_rejection());
        assert!(Event::TransactionAborted.is_rejection());
        assert!(!Event::PutApplied.is_rejection());
    }
}
