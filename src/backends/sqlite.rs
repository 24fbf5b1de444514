//! SQLite backend
//!
//! Documents live as JSON text in a single `documents` table keyed by
//! `(collection, pk, id)`; `collections`/`index_registry` are bookkeeping
//! tables mirroring the in-memory adapter's `HashMap<String, Collection>`.
//! Predicate/update/order evaluation reuses `crate::eval` exactly as the
//! in-memory backend does — this adapter's only job is translating that
//! evaluator's document set to and from SQLite rows, which is what keeps
//! its observable behavior identical to `MemoryAdapter`.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::{Adapter, BoundDataOp, CollectionStatus, IndexSpec, IndexStatus};
use crate::core::capability::CapabilitySet;
use crate::core::error::{StoreError, StoreResult};
use crate::core::key::{Item, Key, Properties};
use crate::core::operation::OperationResult;
use crate::eval::{self, EvalContext};
use crate::ql::{Expr, QueryClause, Returning, Select, SetClause};
use crate::value::Value;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    pk TEXT NOT NULL,
    id TEXT NOT NULL,
    etag TEXT NOT NULL,
    doc TEXT NOT NULL,
    PRIMARY KEY (collection, pk, id)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
CREATE TABLE IF NOT EXISTS index_registry (
    collection TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    fields TEXT NOT NULL,
    PRIMARY KEY (collection, name)
);
"#;

fn index_kind_str(kind: crate::backends::IndexKind) -> &'static str {
    use crate::backends::IndexKind::*;
    match kind {
        Field => "field",
        Composite => "composite",
        Wildcard => "wildcard",
        Array => "array",
        Hash => "hash",
        Vector => "vector",
        Text => "text",
        Geospatial => "geospatial",
        Ttl => "ttl",
    }
}

fn index_kind_from_str(s: &str) -> crate::backends::IndexKind {
    use crate::backends::IndexKind::*;
    match s {
        "field" => Field,
        "composite" => Composite,
        "wildcard" => Wildcard,
        "array" => Array,
        "hash" => Hash,
        "vector" => Vector,
        "text" => Text,
        "geospatial" => Geospatial,
        "ttl" => Ttl,
        _ => Field,
    }
}

fn rusqlite_err(e: rusqlite::Error) -> StoreError {
    StoreError::internal(format!("sqlite error: {}", e))
}

fn tokio_rusqlite_err(e: tokio_rusqlite::Error) -> StoreError {
    StoreError::internal(format!("sqlite error: {}", e))
}

struct Row {
    pk: String,
    id: String,
    etag: String,
    value: Value,
}

pub struct SqliteAdapter {
    capabilities: CapabilitySet,
    conn: Connection,
}

impl SqliteAdapter {
    pub async fn open(path: &str) -> StoreResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory().await.map_err(tokio_rusqlite_err)?
        } else {
            Connection::open(path).await.map_err(tokio_rusqlite_err)?
        };
        conn.call(|conn| conn.execute_batch(SCHEMA).map_err(Into::into))
            .await
            .map_err(tokio_rusqlite_err)?;
        Ok(SqliteAdapter {
            capabilities: CapabilitySet::all(),
            conn,
        })
    }

    pub async fn open_in_memory() -> StoreResult<Self> {
        Self::open(":memory:").await
    }

    fn new_etag() -> String {
        Uuid::new_v4().to_string()
    }

    async fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        let name = collection.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row("SELECT 1 FROM collections WHERE name = ?1", params![name], |_| Ok(()))
                    .optional()
                    .map(|r| r.is_some())
                    .map_err(Into::into)
            })
            .await
            .map_err(tokio_rusqlite_err)
    }

    async fn ensure_collection_exists(&self, collection: &str) -> StoreResult<()> {
        if self.collection_exists(collection).await? {
            Ok(())
        } else {
            Err(StoreError::not_found(format!("collection '{}' does not exist", collection)))
        }
    }

    async fn fetch_row(&self, collection: &str, key: &Key) -> StoreResult<Option<Row>> {
        let (collection, pk, id) = (collection.to_string(), key.pk.clone(), key.id.clone());
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT pk, id, etag, doc FROM documents WHERE collection = ?1 AND pk = ?2 AND id = ?3",
                    params![collection, pk, id],
                    |row| {
                        let pk: String = row.get(0)?;
                        let id: String = row.get(1)?;
                        let etag: String = row.get(2)?;
                        let doc: String = row.get(3)?;
                        Ok((pk, id, etag, doc))
                    },
                )
                .optional()
                .map_err(Into::into)
            })
            .await
            .map_err(tokio_rusqlite_err)?
            .map(|(pk, id, etag, doc)| -> StoreResult<Row> {
                let value: serde_json::Value = serde_json::from_str(&doc)?;
                Ok(Row { pk, id, etag, value: value.into() })
            })
            .transpose()
    }

    async fn fetch_all(&self, collection: &str) -> StoreResult<Vec<Row>> {
        let collection = collection.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT pk, id, etag, doc FROM documents WHERE collection = ?1")?;
                let mut rows = stmt.query(params![collection])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let pk: String = row.get(0)?;
                    let id: String = row.get(1)?;
                    let etag: String = row.get(2)?;
                    let doc: String = row.get(3)?;
                    out.push((pk, id, etag, doc));
                }
                Ok::<_, rusqlite::Error>(out)
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        rows.into_iter()
            .map(|(pk, id, etag, doc)| -> StoreResult<Row> {
                let value: serde_json::Value = serde_json::from_str(&doc)?;
                Ok(Row { pk, id, etag, value: value.into() })
            })
            .collect()
    }

    async fn upsert_row(&self, collection: &str, key: &Key, value: &Value, etag: &str) -> StoreResult<()> {
        let doc_text = serde_json::to_string(&serde_json::Value::from(value.clone()))?;
        let (collection, pk, id, etag) = (collection.to_string(), key.pk.clone(), key.id.clone(), etag.to_string());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO documents (collection, pk, id, etag, doc) VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(collection, pk, id) DO UPDATE SET etag = excluded.etag, doc = excluded.doc",
                    params![collection, pk, id, etag, doc_text],
                )
                .map_err(Into::into)
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        Ok(())
    }

    async fn remove_row(&self, collection: &str, key: &Key) -> StoreResult<()> {
        let (collection, pk, id) = (collection.to_string(), key.pk.clone(), key.id.clone());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND pk = ?2 AND id = ?3",
                    params![collection, pk, id],
                )
                .map_err(Into::into)
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        Ok(())
    }

    async fn ensure_collection_registered(&self, collection: &str) -> StoreResult<()> {
        let name = collection.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
                    params![name],
                )
                .map_err(Into::into)
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        Ok(())
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn create_collection(&self, name: &str, if_not_exists: bool) -> StoreResult<CollectionStatus> {
        if self.collection_exists(name).await? {
            if if_not_exists {
                return Err(StoreError::conflict(format!("collection '{}' already exists", name)));
            }
            return Ok(CollectionStatus::Exists);
        }
        self.ensure_collection_registered(name).await?;
        Ok(CollectionStatus::Created)
    }

    async fn drop_collection(&self, name: &str, if_exists: bool) -> StoreResult<CollectionStatus> {
        if !self.collection_exists(name).await? {
            return if if_exists {
                Err(StoreError::not_found(format!("collection '{}' does not exist", name)))
            } else {
                Ok(CollectionStatus::NotExists)
            };
        }
        let owned = name.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM collections WHERE name = ?1", params![owned.clone()])?;
                conn.execute("DELETE FROM documents WHERE collection = ?1", params![owned.clone()])?;
                conn.execute("DELETE FROM index_registry WHERE collection = ?1", params![owned])?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        Ok(CollectionStatus::Dropped)
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row.get(0)?);
                }
                Ok::<_, rusqlite::Error>(out)
            })
            .await
            .map_err(tokio_rusqlite_err)
    }

    async fn has_collection(&self, name: &str) -> StoreResult<bool> {
        self.collection_exists(name).await
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> StoreResult<IndexStatus> {
        self.ensure_collection_exists(collection).await?;
        let (coll, name) = (collection.to_string(), index.name.clone());
        let exists = self
            .conn
            .call({
                let coll = coll.clone();
                let name = name.clone();
                move |conn| {
                    conn.query_row(
                        "SELECT 1 FROM index_registry WHERE collection = ?1 AND name = ?2",
                        params![coll, name],
                        |_| Ok(()),
                    )
                    .optional()
                    .map(|r| r.is_some())
                    .map_err(Into::into)
                }
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        if exists {
            return Ok(IndexStatus::Exists);
        }
        let kind = index_kind_str(index.kind).to_string();
        let fields = serde_json::to_string(&index.fields)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO index_registry (collection, name, kind, fields) VALUES (?1, ?2, ?3, ?4)",
                    params![coll, name, kind, fields],
                )
                .map_err(Into::into)
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        Ok(IndexStatus::Created)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<IndexStatus> {
        self.ensure_collection_exists(collection).await?;
        let (coll, name) = (collection.to_string(), name.to_string());
        let changed = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM index_registry WHERE collection = ?1 AND name = ?2",
                    params![coll, name],
                )
                .map_err(Into::into)
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        if changed > 0 {
            Ok(IndexStatus::Dropped)
        } else {
            Ok(IndexStatus::NotExists)
        }
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        self.ensure_collection_exists(collection).await?;
        let coll = collection.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, kind, fields FROM index_registry WHERE collection = ?1 ORDER BY name",
                )?;
                let mut rows = stmt.query(params![coll])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let name: String = row.get(0)?;
                    let kind: String = row.get(1)?;
                    let fields: String = row.get(2)?;
                    out.push((name, kind, fields));
                }
                Ok::<_, rusqlite::Error>(out)
            })
            .await
            .map_err(tokio_rusqlite_err)?;
        rows.into_iter()
            .map(|(name, kind, fields)| -> StoreResult<IndexSpec> {
                Ok(IndexSpec {
                    name,
                    kind: index_kind_from_str(&kind),
                    fields: serde_json::from_str(&fields)?,
                })
            })
            .collect()
    }

    async fn get(&self, collection: &str, key: &Key, select: Option<&Select>) -> StoreResult<Option<Item>> {
        let Some(row) = self.fetch_row(collection, key).await? else {
            return Ok(None);
        };
        let value = match select {
            Some(s) => eval::apply_select(&row.value, s)?,
            None => row.value,
        };
        Ok(Some(Item {
            key: key.clone(),
            value: Some(value),
            properties: Properties::new(row.etag),
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
        self.ensure_collection_registered(collection).await?;
        let existing = self.fetch_row(collection, &key).await?;
        if let Some(expr) = where_ {
            let ctx = EvalContext::new(&key, existing.as_ref().map(|r| r.etag.as_str()));
            let doc_ref = existing.as_ref().map(|r| &r.value);
            if !eval::eval_predicate(expr, doc_ref, &ctx)? {
                return Err(StoreError::precondition_failed("PUT where clause did not hold"));
            }
        }
        let old_value = existing.map(|r| r.value);
        let etag = Self::new_etag();
        self.upsert_row(collection, &key, &value, &etag).await?;
        Ok(Item {
            key,
            value: resolved_value_for_put(returning, old_value.as_ref(), &value),
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
        self.ensure_collection_exists(collection).await?;
        let existing = self
            .fetch_row(collection, key)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("no document for key {:?}", key)))?;
        let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
        if let Some(expr) = where_ {
            if !eval::eval_predicate(expr, Some(&existing.value), &ctx)? {
                return Err(StoreError::precondition_failed("UPDATE where clause did not hold"));
            }
        }
        let mut new_value = eval::apply_set(&existing.value, set, &ctx)?;
        if let Some(m) = new_value.as_object_mut() {
            m.insert("pk".to_string(), Value::String(key.pk.clone()));
            m.insert("id".to_string(), Value::String(key.id.clone()));
        }
        let etag = Self::new_etag();
        self.upsert_row(collection, key, &new_value, &etag).await?;
        Ok(Item {
            key: key.clone(),
            value: resolved_value_for_mutation(returning, Some(&existing.value), Some(&new_value)),
            properties: Properties::new(etag),
        })
    }

    async fn delete(&self, collection: &str, key: &Key, where_: Option<&Expr>) -> StoreResult<()> {
        self.ensure_collection_exists(collection).await?;
        let existing = self
            .fetch_row(collection, key)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("no document for key {:?}", key)))?;
        if let Some(expr) = where_ {
            let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
            if !eval::eval_predicate(expr, Some(&existing.value), &ctx)? {
                return Err(StoreError::precondition_failed("DELETE where clause did not hold"));
            }
        }
        self.remove_row(collection, key).await
    }

    async fn query(&self, collection: &str, clause: &QueryClause) -> StoreResult<Vec<Value>> {
        if !self.collection_exists(collection).await? {
            return Ok(Vec::new());
        }
        let rows = self.fetch_all(collection).await?;
        let mut matched = filter_rows(rows, clause)?;
        eval::sort_documents(&mut matched, &clause.order_by)?;
        let matched = paginate(matched, clause.offset, clause.limit);
        match &clause.select {
            Some(select) => matched.into_iter().map(|v| eval::apply_select(&v, select)).collect(),
            None => Ok(matched),
        }
    }

    async fn count(&self, collection: &str, clause: &QueryClause) -> StoreResult<u64> {
        if !self.collection_exists(collection).await? {
            return Ok(0);
        }
        let rows = self.fetch_all(collection).await?;
        Ok(filter_rows(rows, clause)?.len() as u64)
    }

    async fn batch(&self, ops: &[BoundDataOp]) -> StoreResult<Vec<OperationResult>> {
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                BoundDataOp::Put { collection, value, where_, returning } => self
                    .put(collection, value.clone(), where_.as_ref(), *returning)
                    .await
                    .map(|item| item.value),
                BoundDataOp::Update { collection, key, set, where_, returning } => self
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

    /// SQLite connections in this adapter are not shared across concurrent
    /// callers with manual locking the way the in-memory adapter locks its
    /// map, so cross-op atomicity is delegated to a native transaction: the
    /// whole check-then-apply sequence (snapshot every op's key, check every
    /// precondition against that snapshot, apply every op) runs inside a
    /// single `rusqlite::Transaction` opened and committed within one
    /// `conn.call()`, so a concurrent writer can't interleave between
    /// snapshot and apply and a mid-apply error rolls the whole thing back.
    async fn transact(&self, ops: &[BoundDataOp]) -> StoreResult<Vec<OperationResult>> {
        let ops = ops.to_vec();
        let outcome = self
            .conn
            .call(move |conn| -> Result<StoreResult<Vec<OperationResult>>, rusqlite::Error> {
                let tx = conn.transaction()?;

                let mut snapshot = Vec::with_capacity(ops.len());
                for op in &ops {
                    let (collection, key) = match bound_op_target(op) {
                        Ok(t) => t,
                        Err(e) => return Ok(Err(e)),
                    };
                    match fetch_row_sync(&tx, collection, &key) {
                        Ok(row) => snapshot.push(row),
                        Err(e) => return Ok(Err(e)),
                    }
                }

                for (op, existing) in ops.iter().zip(snapshot.iter()) {
                    if let Err(e) = check_transact_precondition(op, existing.as_ref()) {
                        return Ok(Err(e));
                    }
                }

                let mut results = Vec::with_capacity(ops.len());
                for (op, existing) in ops.iter().zip(snapshot.into_iter()) {
                    match apply_transact_op_sync(&tx, op, existing) {
                        Ok(r) => results.push(r),
                        Err(e) => return Ok(Err(e)),
                    }
                }

                // Committing here means an error on any op above left `tx`
                // uncommitted; it rolls back on drop.
                tx.commit()?;
                Ok(Ok(results))
            })
            .await;

        match outcome {
            Ok(inner) => inner,
            Err(e) => Err(tokio_rusqlite_err(e)),
        }
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Synchronous counterpart of `SqliteAdapter::fetch_row`, usable against
/// either a plain `Connection` or a `Transaction` (which derefs to one) so
/// `transact` can run it inside a single `conn.call()`.
fn fetch_row_sync(conn: &rusqlite::Connection, collection: &str, key: &Key) -> StoreResult<Option<Row>> {
    let row = conn
        .query_row(
            "SELECT pk, id, etag, doc FROM documents WHERE collection = ?1 AND pk = ?2 AND id = ?3",
            params![collection, key.pk, key.id],
            |row| {
                let pk: String = row.get(0)?;
                let id: String = row.get(1)?;
                let etag: String = row.get(2)?;
                let doc: String = row.get(3)?;
                Ok((pk, id, etag, doc))
            },
        )
        .optional()
        .map_err(rusqlite_err)?;
    row.map(|(pk, id, etag, doc)| -> StoreResult<Row> {
        let value: serde_json::Value = serde_json::from_str(&doc)?;
        Ok(Row { pk, id, etag, value: value.into() })
    })
    .transpose()
}

fn upsert_row_sync(conn: &rusqlite::Connection, collection: &str, key: &Key, value: &Value, etag: &str) -> StoreResult<()> {
    let doc_text = serde_json::to_string(&serde_json::Value::from(value.clone()))?;
    conn.execute(
        "INSERT INTO documents (collection, pk, id, etag, doc) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(collection, pk, id) DO UPDATE SET etag = excluded.etag, doc = excluded.doc",
        params![collection, key.pk, key.id, etag, doc_text],
    )
    .map_err(rusqlite_err)?;
    Ok(())
}

fn remove_row_sync(conn: &rusqlite::Connection, collection: &str, key: &Key) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM documents WHERE collection = ?1 AND pk = ?2 AND id = ?3",
        params![collection, key.pk, key.id],
    )
    .map_err(rusqlite_err)?;
    Ok(())
}

fn ensure_collection_registered_sync(conn: &rusqlite::Connection, collection: &str) -> StoreResult<()> {
    conn.execute("INSERT OR IGNORE INTO collections (name) VALUES (?1)", params![collection])
        .map_err(rusqlite_err)?;
    Ok(())
}

fn apply_transact_op_sync(conn: &rusqlite::Connection, op: &BoundDataOp, existing: Option<Row>) -> StoreResult<OperationResult> {
    match op {
        BoundDataOp::Put { collection, value, returning, .. } => {
            let key = Key::from_value(value)?;
            ensure_collection_registered_sync(conn, collection)?;
            let etag = SqliteAdapter::new_etag();
            upsert_row_sync(conn, collection, &key, value, &etag)?;
            Ok(OperationResult::ok(resolved_value_for_put(
                *returning,
                existing.map(|r| r.value).as_ref(),
                value,
            )))
        }
        BoundDataOp::Update { collection, key, set, returning, .. } => {
            let existing = existing.expect("checked in pass 1");
            let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
            let mut new_value = eval::apply_set(&existing.value, set, &ctx)?;
            if let Some(m) = new_value.as_object_mut() {
                m.insert("pk".to_string(), Value::String(key.pk.clone()));
                m.insert("id".to_string(), Value::String(key.id.clone()));
            }
            let etag = SqliteAdapter::new_etag();
            upsert_row_sync(conn, collection, key, &new_value, &etag)?;
            Ok(OperationResult::ok(resolved_value_for_mutation(
                *returning,
                Some(&existing.value),
                Some(&new_value),
            )))
        }
        BoundDataOp::Delete { collection, key, .. } => {
            remove_row_sync(conn, collection, key)?;
            Ok(OperationResult::ok(None))
        }
    }
}

fn bound_op_target(op: &BoundDataOp) -> StoreResult<(&String, Key)> {
    match op {
        BoundDataOp::Put { collection, value, .. } => Ok((collection, Key::from_value(value)?)),
        BoundDataOp::Update { collection, key, .. } => Ok((collection, key.clone())),
        BoundDataOp::Delete { collection, key, .. } => Ok((collection, key.clone())),
    }
}

fn check_transact_precondition(op: &BoundDataOp, existing: Option<&Row>) -> StoreResult<()> {
    match op {
        BoundDataOp::Put { value, where_, .. } => {
            let key = Key::from_value(value)?;
            if let Some(expr) = where_ {
                let ctx = EvalContext::new(&key, existing.map(|r| r.etag.as_str()));
                if !eval::eval_predicate(expr, existing.map(|r| &r.value), &ctx)? {
                    return Err(StoreError::conflict("PUT precondition failed inside TRANSACT"));
                }
            }
        }
        BoundDataOp::Update { key, where_, .. } => {
            let existing = existing.ok_or_else(|| StoreError::not_found(format!("no document for key {:?}", key)))?;
            if let Some(expr) = where_ {
                let ctx = EvalContext::new(key, Some(existing.etag.as_str()));
                if !eval::eval_predicate(expr, Some(&existing.value), &ctx)? {
                    return Err(StoreError::conflict("UPDATE precondition failed inside TRANSACT"));
                }
            }
        }
        BoundDataOp::Delete { key, where_, .. } => {
            let existing = existing.ok_or_else(|| StoreError::not_found(format!("no document for key {:?}", key)))?;
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

fn filter_rows(rows: Vec<Row>, clause: &QueryClause) -> StoreResult<Vec<Value>> {
    let mut out = Vec::new();
    for row in rows {
        let key = Key::new(row.pk.clone(), row.id.clone());
        let ctx = EvalContext::new(&key, Some(row.etag.as_str()));
        let keep = match &clause.where_ {
            Some(expr) => eval::eval_predicate(expr, Some(&row.value), &ctx)?,
            None => true,
        };
        if keep {
            out.push(row.value);
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

fn resolved_value_for_put(returning: Option<Returning>, old: Option<&Value>, new: &Value) -> Option<Value> {
    match returning {
        Some(Returning::Old) => old.cloned(),
        Some(Returning::New) | None => Some(new.clone()),
    }
}

fn resolved_value_for_mutation(returning: Option<Returning>, old: Option<&Value>, new: Option<&Value>) -> Option<Value> {
    match returning {
        Some(Returning::Old) => old.cloned(),
        Some(Returning::New) => new.cloned(),
        None => None,
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

    async fn adapter() -> SqliteAdapter {
        SqliteAdapter::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let a = adapter().await;
        a.create_collection("widgets", false).await.unwrap();
        a.put("widgets", doc("pk00", "1", 7), None, None).await.unwrap();
        let fetched = a.get("widgets", &Key::new("pk00", "1"), None).await.unwrap().unwrap();
        assert_eq!(fetched.value.unwrap().get_field("int"), Some(&Value::Int(7)));
    }

    #[tokio::test]
    async fn conditional_insert_replace_cycle() {
        let a = adapter().await;
        a.create_collection("widgets", false).await.unwrap();
        let not_exists = parse_expr("not_exists()").unwrap();
        let exists = parse_expr("exists()").unwrap();

        let inserted = a.put("widgets", doc("pk00", "1", 1), Some(&not_exists), None).await.unwrap();
        let e1 = inserted.properties.etag.clone();
        let replaced = a.put("widgets", doc("pk00", "1", 2), Some(&exists), None).await.unwrap();
        let e2 = replaced.properties.etag.clone();
        assert_ne!(e1, e2);

        let stale = parse_expr(&format!("$etag = '{}'", e1)).unwrap();
        let err = a.delete("widgets", &Key::new("pk00", "1"), Some(&stale)).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
    }

    #[tokio::test]
    async fn update_on_absent_document_is_not_found() {
        let a = adapter().await;
        a.create_collection("widgets", false).await.unwrap();
        let set = crate::ql::parse_set_clause("int=put(1)").unwrap();
        let err = a.update("widgets", &Key::new("pk00", "1"), &set, None, None).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn query_filters_and_orders_like_the_reference_backend() {
        let a = adapter().await;
        a.create_collection("widgets", false).await.unwrap();
        for (id, int) in [("0", 0), ("1", 1), ("2", 2), ("3", 3), ("4", 4)] {
            a.put("widgets", doc("pk00", id, int), None, None).await.unwrap();
        }
        let stmt = crate::ql::parse_statement("QUERY WHERE int between 1 and 3 ORDER BY int DESC").unwrap();
        let clause = match stmt {
            crate::ql::Statement::Select(q) => q,
            _ => unreachable!(),
        };
        let docs = a.query("widgets", &clause).await.unwrap();
        let ints: Vec<_> = docs.iter().map(|d| d.get_field("int").unwrap().clone()).collect();
        assert_eq!(ints, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[tokio::test]
    async fn transaction_aborts_entirely_when_one_precondition_fails() {
        let a = adapter().await;
        a.create_collection("widgets", false).await.unwrap();
        a.put("widgets", doc("pk00", "7", 1), None, None).await.unwrap();
        a.put("widgets", doc("pk00", "8", 1), None, None).await.unwrap();
        a.put("widgets", doc("pk00", "9", 1), None, None).await.unwrap();

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
                where_: Some(parse_expr("int = 999").unwrap()),
                returning: None,
            },
        ];
        let err = a.transact(&ops).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert!(a.get("widgets", &Key::new("pk00", "6"), None).await.unwrap().is_none());
        assert!(a.get("widgets", &Key::new("pk00", "8"), None).await.unwrap().is_some());
    }
}
