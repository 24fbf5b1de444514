//! In-memory backend: the reference implementation.
//!
//! Every other backend's observable behavior is judged against this one
//! Other backends are expected to match its observable behavior.
//! Evaluation goes straight through
//! `crate::eval` with no native query translation, so this adapter is as
//! close to the evaluators' own semantics as a backend can be.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::{Adapter, BoundDataOp, CollectionStatus, IndexSpec, IndexStatus};
use crate::core::capability::CapabilitySet;
use crate::core::error::{StoreError, StoreResult};
use crate::core::key::{Item, Key, Properties};
use crate::core::operation::OperationResult;
use crate::eval::{self, EvalContext};
use crate::ql::{Expr, QueryClause, Returning, Select, SetClause};
use crate::value::Value;

#[derive(Debug, Clone)]
struct StoredDoc {
    value: Value,
    etag: String,
}

#[derive(Debug, Default)]
struct Collection {
    documents: HashMap<(String, String), StoredDoc>,
    indexes: Vec<IndexSpec>,
}

pub struct MemoryAdapter {
    capabilities: CapabilitySet,
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        MemoryAdapter {
            capabilities: CapabilitySet::all(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Builds an adapter advertising a non-default capability set; used to
    /// exercise the facade's pre-dispatch capability check against a
    /// backend that deliberately lacks a feature.
    pub fn with_capabilities(capabilities: CapabilitySet) -> Self {
        MemoryAdapter {
            capabilities,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn new_etag() -> String {
        Uuid::new_v4().to_string()
    }

    fn resolved_value_for_put(returning: Option<Returning>, old: Option<&Value>, new: &Value) -> Option<Value> {
        match returning {
            Some(Returning::Old) => old.cloned(),
            Some(Returning::New) | None => Some(new.clone()),
        }
    }

    fn resolved_value_for_mutation(
        returning: Option<Returning>,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Option<Value> {
        match returning {
            Some(Returning::Old) => old.cloned(),
            Some(Returning::New) => new.cloned(),
            None => None,
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn create_collection(&self, name: &str, if_not_exists: bool) -> StoreResult<CollectionStatus> {
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(name) {
            if if_not_exists {
                return Err(StoreError::conflict(format!("collection '{}' already exists", name)));
            }
            return Ok(CollectionStatus::Exists);
        }
        collections.insert(name.to_string(), Collection::default());
        Ok(CollectionStatus::Created)
    }

    async fn drop_collection(&self, name: &str, if_exists: bool) -> StoreResult<CollectionStatus> {
        let mut collections = self.collections.write().unwrap();
        if collections.remove(name).is_some() {
            Ok(CollectionStatus::Dropped)
        } else if if_exists {
            Err(StoreError::not_found(format!("collection '{}' does not exist", name)))
        } else {
            Ok(CollectionStatus::NotExists)
        }
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        Ok(self.collections.read().unwrap().keys().cloned().collect())
    }

    async fn has_collection(&self, name: &str) -> StoreResult<bool> {
        Ok(self.collections.read().unwrap().contains_key(name))
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> StoreResult<IndexStatus> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(format!("collection '{}' does not exist", collection)))?;
        if coll.indexes.iter().any(|i| i.name == index.name) {
            return Ok(IndexStatus::Exists);
        }
        coll.indexes.push(index);
        Ok(IndexStatus::Created)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<IndexStatus> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(format!("collection '{}' does not exist", collection)))?;
        let before = coll.indexes.len();
        coll.indexes.retain(|i| i.name != name);
        if coll.indexes.len() < before {
            Ok(IndexStatus::Dropped)
        } else {
            Ok(IndexStatus::NotExists)
        }
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        let collections = self.collections.read().unwrap();
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::not_found(format!("collection '{}' does not exist", collection)))?;
        Ok(coll.indexes.clone())
    }

    async fn get(&self, collection: &str, key: &Key, select: Option<&Select>) -> StoreResult<Option<Item>> {
        let collections = self.collections.read().unwrap();
        let Some(coll) = collections.get(collection) else {
            return Ok(None);
        };
        let Some(doc) = coll.documents.get(&(key.pk.clone(), key.id.clone())) else {
            return Ok(None);
        };
        let value = match select {
            Some(s) => eval::apply_select(&doc.value, s)?,
            None => doc.value.clone(),
        };
        Ok(Some(Item {
            key: key.clone(),
            value: Some(value),
            properties: Properties::new(doc.etag.clone()),
        }))
    }

    async fn put(
        &self,
        collection: &str,
        value: Value,
        where_: Option<&Expr>,
        returning: Option<Returning>,
    ) -> StoreResult<Item> {
        let key = Key::from_value(&value)?;
        let mut collections = self.collections.write().unwrap();
        let coll = collections.entry(collection.to_string()).or_default();
        let existing = coll.documents.get(&(key.pk.clone(), key.id.clone()));
        if let Some(expr) = where_ {
            let ctx = EvalContext::new(&key, existing.map(|d| d.etag.as_str()));
            let doc_ref = existing.map(|d| &d.value);
            if !eval::eval_predicate(expr, doc_ref, &ctx)? {
                return Err(StoreError::precondition_failed("PUT where clause did not hold"));
            }
        }
        let old_value = existing.map(|d| d.value.clone());
        let etag = Self::new_etag();
        coll.documents.insert(
            (key.pk.clone(), key.id.clone()),
            StoredDoc {
                value: value.clone(),
                etag: etag.clone(),
            },
        );
        Ok(Item {
            key: key.clone(),
            value: Self::resolved_value_for_put(returning, old_value.as_ref(), &value),
            properties: Properties::new(etag),
        })
    }

    async fn update(
        &self,
        collection: &str,
        key: &Key,
        set: &SetClause,
        where_: Option<&Expr>,
        returning: Option<Returning>,
    ) -> StoreResult<Item> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(format!("collection '{}' does not exist", collection)))?;
        let existing = coll
            .documents
            .get(&(key.pk.clone(), key.id.clone()))
            .ok_or_else(|| StoreError::not_found(format!("no document for key {:?}", key)))?
            .clone();
        let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
        if let Some(expr) = where_ {
            if !eval::eval_predicate(expr, Some(&existing.value), &ctx)? {
                return Err(StoreError::precondition_failed("UPDATE where clause did not hold"));
            }
        }
        let mut new_value = eval::apply_set(&existing.value, set, &ctx)?;
        // pk/id are never changed by an UPDATE, regardless of SET content.
        if let Some(m) = new_value.as_object_mut() {
            m.insert("pk".to_string(), Value::String(key.pk.clone()));
            m.insert("id".to_string(), Value::String(key.id.clone()));
        }
        let etag = Self::new_etag();
        coll.documents.insert(
            (key.pk.clone(), key.id.clone()),
            StoredDoc {
                value: new_value.clone(),
                etag: etag.clone(),
            },
        );
        Ok(Item {
            key: key.clone(),
            value: Self::resolved_value_for_mutation(returning, Some(&existing.value), Some(&new_value)),
            properties: Properties::new(etag),
        })
    }

    async fn delete(&self, collection: &str, key: &Key, where_: Option<&Expr>) -> StoreResult<()> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(format!("collection '{}' does not exist", collection)))?;
        let existing = coll
            .documents
            .get(&(key.pk.clone(), key.id.clone()))
            .ok_or_else(|| StoreError::not_found(format!("no document for key {:?}", key)))?
            .clone();
        if let Some(expr) = where_ {
            let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
            if !eval::eval_predicate(expr, Some(&existing.value), &ctx)? {
                return Err(StoreError::precondition_failed("DELETE where clause did not hold"));
            }
        }
        coll.documents.remove(&(key.pk.clone(), key.id.clone()));
        Ok(())
    }

    async fn query(&self, collection: &str, clause: &QueryClause) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().unwrap();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut matched = filter_documents(coll, clause)?;
        eval::sort_documents(&mut matched, &clause.order_by)?;
        let matched = paginate(matched, clause.offset, clause.limit);
        match &clause.select {
            Some(select) => matched
                .into_iter()
                .map(|v| eval::apply_select(&v, select))
                .collect(),
            None => Ok(matched),
        }
    }

    async fn count(&self, collection: &str, clause: &QueryClause) -> StoreResult<u64> {
        let collections = self.collections.read().unwrap();
        let Some(coll) = collections.get(collection) else {
            return Ok(0);
        };
        Ok(filter_documents(coll, clause)?.len() as u64)
    }

    async fn batch(&self, ops: &[BoundDataOp]) -> StoreResult<Vec<OperationResult>> {
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                BoundDataOp::Put {
                    collection,
                    value,
                    where_,
                    returning,
                } => self
                    .put(collection, value.clone(), where_.as_ref(), *returning)
                    .await
                    .map(|item| item.value),
                BoundDataOp::Update {
                    collection,
                    key,
                    set,
                    where_,
                    returning,
                } => self
                    .update(collection, key, set, where_.as_ref(), *returning)
                    .await
                    .map(|item| item.value),
                BoundDataOp::Delete { collection, key, where_ } => {
                    self.delete(collection, key, where_.as_ref()).await.map(|()| None)
                }
            };
            results.push(match result {
                Ok(v) => OperationResult::ok(v),
                Err(e) => OperationResult::err(&e),
            });
        }
        Ok(results)
    }

    async fn transact(&self, ops: &[BoundDataOp]) -> StoreResult<Vec<OperationResult>> {
        let mut collections = self.collections.write().unwrap();
        // Pass 1: every precondition must hold against the current
        // (unmutated) state before anything is applied.
        for op in ops {
            check_transact_precondition(&mut collections, op)?;
        }
        // Pass 2: apply for real; preconditions already verified so these
        // cannot fail for the same reason again.
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            results.push(apply_transact_op(&mut collections, op)?);
        }
        Ok(results)
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn filter_documents(coll: &Collection, clause: &QueryClause) -> StoreResult<Vec<Value>> {
    let mut out = Vec::new();
    for ((pk, id), doc) in coll.documents.iter() {
        let key = Key::new(pk.clone(), id.clone());
        let ctx = EvalContext::new(&key, Some(doc.etag.as_str()));
        let keep = match &clause.where_ {
            Some(expr) => eval::eval_predicate(expr, Some(&doc.value), &ctx)?,
            None => true,
        };
        if keep {
            out.push(doc.value.clone());
        }
    }
    Ok(out)
}

fn paginate(docs: Vec<Value>, offset: Option<u64>, limit: Option<u64>) -> Vec<Value> {
    let skip = offset.unwrap_or(0) as usize;
    let iter = docs.into_iter().skip(skip);
    match limit {
        Some(n) => iter.take(n as usize).collect(),
        None => iter.collect(),
    }
}

fn check_transact_precondition(
    collections: &mut HashMap<String, Collection>,
    op: &BoundDataOp,
) -> StoreResult<()> {
    match op {
        BoundDataOp::Put {
            collection,
            value,
            where_,
            ..
        } => {
            let key = Key::from_value(value)?;
            let coll = collections.entry(collection.clone()).or_default();
            let existing = coll.documents.get(&(key.pk.clone(), key.id.clone()));
            if let Some(expr) = where_ {
                let ctx = EvalContext::new(&key, existing.map(|d| d.etag.as_str()));
                if !eval::eval_predicate(expr, existing.map(|d| &d.value), &ctx)? {
                    return Err(StoreError::conflict("PUT precondition failed inside TRANSACT"));
                }
            }
        }
        BoundDataOp::Update {
            collection, key, where_, ..
        } => {
            let coll = collections
                .get(collection)
                .ok_or_else(|| StoreError::not_found(format!("collection '{}' does not exist", collection)))?;
            let existing = coll
                .documents
                .get(&(key.pk.clone(), key.id.clone()))
                .ok_or_else(|| StoreError::not_found(format!("no document for key {:?}", key)))?;
            if let Some(expr) = where_ {
                let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
                if !eval::eval_predicate(expr, Some(&existing.value), &ctx)? {
                    return Err(StoreError::conflict("UPDATE precondition failed inside TRANSACT"));
                }
            }
        }
        BoundDataOp::Delete { collection, key, where_ } => {
            let coll = collections
                .get(collection)
                .ok_or_else(|| StoreError::not_found(format!("collection '{}' does not exist", collection)))?;
            let existing = coll
                .documents
                .get(&(key.pk.clone(), key.id.clone()))
                .ok_or_else(|| StoreError::not_found(format!("no document for key {:?}", key)))?;
            if let Some(expr) = where_ {
                let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
                if !eval::eval_predicate(expr, Some(&existing.value), &ctx)? {
                    return Err(StoreError::conflict("DELETE precondition failed inside TRANSACT"));
                }
            }
        }
    }
    Ok(())
}

fn apply_transact_op(
    collections: &mut HashMap<String, Collection>,
    op: &BoundDataOp,
) -> StoreResult<OperationResult> {
    match op {
        BoundDataOp::Put {
            collection,
            value,
            returning,
            ..
        } => {
            let key = Key::from_value(value)?;
            let coll = collections.entry(collection.clone()).or_default();
            let old = coll.documents.get(&(key.pk.clone(), key.id.clone())).map(|d| d.value.clone());
            let etag = MemoryAdapter::new_etag();
            coll.documents.insert(
                (key.pk.clone(), key.id.clone()),
                StoredDoc {
                    value: value.clone(),
                    etag,
                },
            );
            Ok(OperationResult::ok(MemoryAdapter::resolved_value_for_put(
                *returning,
                old.as_ref(),
                value,
            )))
        }
        BoundDataOp::Update {
            collection,
            key,
            set,
            returning,
            ..
        } => {
            let coll = collections.get_mut(collection).expect("checked in pass 1");
            let existing = coll
                .documents
                .get(&(key.pk.clone(), key.id.clone()))
                .expect("checked in pass 1")
                .clone();
            let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
            let mut new_value = eval::apply_set(&existing.value, set, &ctx)?;
            if let Some(m) = new_value.as_object_mut() {
                m.insert("pk".to_string(), Value::String(key.pk.clone()));
                m.insert("id".to_string(), Value::String(key.id.clone()));
            }
            let etag = MemoryAdapter::new_etag();
            coll.documents.insert(
                (key.pk.clone(), key.id.clone()),
                StoredDoc {
                    value: new_value.clone(),
                    etag,
                },
            );
            Ok(OperationResult::ok(MemoryAdapter::resolved_value_for_mutation(
                *returning,
                Some(&existing.value),
                Some(&new_value),
            )))
        }
        BoundDataOp::Delete { collection, key, .. } => {
            let coll = collections.get_mut(collection).expect("checked in pass 1");
            coll.documents.remove(&(key.pk.clone(), key.id.clone()));
            Ok(OperationResult::ok(None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ql::parse_expr;
    use serde_json::json;

    fn doc(pk: &str, id: &str, int: i64) -> Value {
        json!({"pk": pk, "id": id, "int": int}).into()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let adapter = MemoryAdapter::new();
        adapter.create_collection("widgets", false).await.unwrap();
        let item = adapter.put("widgets", doc("pk00", "1", 7), None, None).await.unwrap();
        assert_eq!(item.key, Key::new("pk00", "1"));
        let fetched = adapter
            .get("widgets", &Key::new("pk00", "1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.value.unwrap().get_field("int"), Some(&Value::Int(7)));
    }

    #[tokio::test]
    async fn conditional_insert_replace_cycle() {
        let adapter = MemoryAdapter::new();
        adapter.create_collection("widgets", false).await.unwrap();
        let not_exists = parse_expr("not_exists()").unwrap();
        let exists = parse_expr("exists()").unwrap();

        let inserted = adapter
            .put("widgets", doc("pk00", "1", 1), Some(&not_exists), None)
            .await
            .unwrap();
        let e1 = inserted.properties.etag.clone();

        let replaced = adapter
            .put("widgets", doc("pk00", "1", 2), Some(&exists), None)
            .await
            .unwrap();
        let e2 = replaced.properties.etag.clone();
        assert_ne!(e1, e2);

        let stale_delete = parse_expr(&format!("$etag = '{}'", e1)).unwrap();
        let err = adapter
            .delete("widgets", &Key::new("pk00", "1"), Some(&stale_delete))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");

        let fresh_delete = parse_expr(&format!("$etag = '{}'", e2)).unwrap();
        adapter
            .delete("widgets", &Key::new("pk00", "1"), Some(&fresh_delete))
            .await
            .unwrap();

        assert!(adapter
            .get("widgets", &Key::new("pk00", "1"), None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_on_absent_document_is_not_found() {
        let adapter = MemoryAdapter::new();
        adapter.create_collection("widgets", false).await.unwrap();
        let set = crate::ql::parse_set_clause("int=put(1)").unwrap();
        let err = adapter
            .update("widgets", &Key::new("pk00", "1"), &set, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn transaction_aborts_entirely_when_one_precondition_fails() {
        let adapter = MemoryAdapter::new();
        adapter.create_collection("widgets", false).await.unwrap();
        adapter.put("widgets", doc("pk00", "7", 1), None, None).await.unwrap();
        adapter.put("widgets", doc("pk00", "8", 1), None, None).await.unwrap();
        adapter.put("widgets", doc("pk00", "9", 1), None, None).await.unwrap();

        let bad_condition = parse_expr("int = 999").unwrap();
        let ops = vec![
            BoundDataOp::Put {
                collection: "widgets".to_string(),
                value: doc("pk00", "6", 1),
                where_: Some(parse_expr("not_exists()").unwrap()),
                returning: None,
            },
            BoundDataOp::Delete {
                collection: "widgets".to_string(),
                key: Key::new("pk00", "8"),
                where_: None,
            },
            BoundDataOp::Update {
                collection: "widgets".to_string(),
                key: Key::new("pk00", "9"),
                set: crate::ql::parse_set_clause("int=put(2)").unwrap(),
                where_: Some(bad_condition),
                returning: None,
            },
        ];
        let err = adapter.transact(&ops).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        assert!(adapter.get("widgets", &Key::new("pk00", "6"), None).await.unwrap().is_none());
        assert!(adapter.get("widgets", &Key::new("pk00", "8"), None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn query_orders_and_filters() {
        let adapter = MemoryAdapter::new();
        adapter.create_collection("widgets", false).await.unwrap();
        for (id, int) in [("0", 0), ("1", 1), ("2", 2), ("3", 3), ("4", 4)] {
            adapter.put("widgets", doc("pk00", id, int), None, None).await.unwrap();
        }
        let stmt = crate::ql::parse_statement("QUERY WHERE int between 1 and 3 ORDER BY int DESC").unwrap();
        let clause = match stmt {
            crate::ql::Statement::Select(q) => q,
            _ => unreachable!(),
        };
        let results = adapter.query("widgets", &clause).await.unwrap();
        let ids: Vec<_> = results.iter().map(|v| v.get_field("id").unwrap().as_str().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
        assert_eq!(adapter.count("widgets", &clause).await.unwrap(), 3);
    }
}
