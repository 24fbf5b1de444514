//! Document Store facade
//!
//! `DocumentStore` is the single call site every backend binds behind:
//! collection/index lifecycle, put/get/delete/update/query/count/batch/
//! transact, plus the statement-form `execute(statement, params)` entry
//! point. It owns nothing but an `Adapter`; all persistence lives in the
//! adapter, all evaluation semantics live in `crate::eval`, and all
//! grammar lives in `crate::ql`. The facade's own job is narrow: resolve
//! the default collection, bind parameters, run the capability check
//! before dispatch, translate `Operation`/`Batch`/`Transaction`
//! structured calls into the same AST the textual form produces, and log
//! one structured event per outcome.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::backends::{Adapter, BoundDataOp, CollectionStatus, IndexKind, IndexSpec, IndexStatus};
use crate::core::capability::Capability;
use crate::core::error::{StoreError, StoreResult};
use crate::core::key::{Item, Key};
use crate::core::operation::{Batch, Operation, OperationResult, Response, Transaction};
use crate::eval::{self, EvalContext};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::ql::{self, Block, BlockVerb, DataOp, Expr, Literal, Mutator, ParamMap, QueryClause, Statement};
use crate::value::Value;

/// Per-instance configuration ("configuration recognized options").
/// `suppress_fields`/`field_types` are adapter-level concerns (they shape
/// how a single backend encodes values) and live on the adapter, not here.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default collection name; used by every operation that doesn't name
    /// an explicit `INTO`/`FROM` override.
    pub collection: String,
    /// Indexes created on the default collection when the store opens.
    pub indexes: Vec<IndexSpec>,
}

impl StoreConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        StoreConfig {
            collection: collection.into(),
            indexes: Vec::new(),
        }
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes = indexes;
        self
    }
}

/// A key or value literal evaluated with no ambient document; used to turn
/// the `Expr` a parsed PUT/GET/UPDATE/DELETE carries for its key/value
/// position into a concrete `Value` before handing it to an adapter.
/// `$etag`/`$pk`/`$id` references are meaningless here (there is no
/// document yet), so the placeholder key/etag are empty.
fn literal_value(expr: &Expr) -> StoreResult<Value> {
    let placeholder = Key::new(String::new(), String::new());
    let ctx = EvalContext::new(&placeholder, None);
    eval::eval_operand(expr, None, &ctx)
}

/// The provider-agnostic facade: one bound adapter, one default
/// collection, a closed/open flag, and a metrics registry. Safe for use
/// from multiple concurrent callers; the adapter owns its own
/// interior mutability, and `closed` is a single atomic flag.
pub struct DocumentStore {
    adapter: Arc<dyn Adapter>,
    config: StoreConfig,
    closed: AtomicBool,
    metrics: MetricsRegistry,
}

impl DocumentStore {
    /// Opens a store against `adapter`, creating the default collection
    /// and its configured indexes if they don't already exist. Acquisition
    /// is lazy in the adapter (connections, if any, are opened on first
    /// use); this call itself is cheap beyond the collection/index setup.
    pub async fn open(adapter: Arc<dyn Adapter>, config: StoreConfig) -> StoreResult<Self> {
        let store = DocumentStore {
            adapter,
            config,
            closed: AtomicBool::new(false),
            metrics: MetricsRegistry::new(),
        };
        match store.adapter.create_collection(&store.config.collection, false).await? {
            CollectionStatus::Created => {
                store.metrics.increment_collections_created();
                Logger::info(Event::CollectionCreated.as_str(), &[("collection", &store.config.collection)]);
            }
            CollectionStatus::Exists => {
                Logger::info(Event::CollectionExists.as_str(), &[("collection", &store.config.collection)]);
            }
            _ => unreachable!("create_collection never returns Dropped/NotExists"),
        }
        for index in store.config.indexes.clone() {
            store.create_index(&store.config.collection.clone(), index).await?;
        }
        Logger::info(Event::StoreOpened.as_str(), &[("collection", &store.config.collection)]);
        Ok(store)
    }

    pub fn default_collection(&self) -> &str {
        &self.config.collection
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    fn collection_or_default<'a>(&'a self, override_: &'a Option<String>) -> &'a str {
        override_.as_deref().unwrap_or(&self.config.collection)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(AtomicOrdering::Acquire) {
            Logger::warn(Event::StoreClosedRejected.as_str(), &[]);
            return Err(StoreError::Internal("store is closed".to_string()));
        }
        Ok(())
    }

    /// Releases the adapter's resources. Idempotent: closing twice is a
    /// no-op, not an error.
    pub async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, AtomicOrdering::AcqRel) {
            return Ok(());
        }
        self.adapter.close().await?;
        Logger::info(Event::StoreClosed.as_str(), &[]);
        Ok(())
    }

    // ---- Collection lifecycle ------------------------------------------

    /// `where_` may be `None` (unconditional) or `Some("not_exists()")`,
    /// matching the collection state machine: unconditional create upgrades
    /// CREATED -> EXISTS (soft), conditional create on CREATED is a hard
    /// CONFLICT error.
    pub async fn create_collection(&self, name: &str, where_: Option<&str>) -> StoreResult<CollectionStatus> {
        self.ensure_open()?;
        let if_not_exists = parse_guard(where_, "not_exists")?;
        let status = self.adapter.create_collection(name, if_not_exists).await?;
        match status {
            CollectionStatus::Created => {
                self.metrics.increment_collections_created();
                Logger::info(Event::CollectionCreated.as_str(), &[("collection", name)]);
            }
            CollectionStatus::Exists => {
                Logger::info(Event::CollectionExists.as_str(), &[("collection", name)]);
            }
            _ => {}
        }
        Ok(status)
    }

    /// `where_` may be `None` or `Some("exists()")`; see `create_collection`.
    pub async fn drop_collection(&self, name: &str, where_: Option<&str>) -> StoreResult<CollectionStatus> {
        self.ensure_open()?;
        let if_exists = parse_guard(where_, "exists")?;
        let status = self.adapter.drop_collection(name, if_exists).await?;
        match status {
            CollectionStatus::Dropped => {
                self.metrics.increment_collections_dropped();
                Logger::info(Event::CollectionDropped.as_str(), &[("collection", name)]);
            }
            CollectionStatus::NotExists => {
                Logger::info(Event::CollectionNotFound.as_str(), &[("collection", name)]);
            }
            _ => {}
        }
        Ok(status)
    }

    pub async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        self.adapter.list_collections().await
    }

    pub async fn has_collection(&self, name: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        self.adapter.has_collection(name).await
    }

    pub async fn create_index(&self, collection: &str, index: IndexSpec) -> StoreResult<IndexStatus> {
        self.ensure_open()?;
        capability_for_index_kind(index.kind)
            .into_iter()
            .try_for_each(|cap| self.require_capability(cap))?;
        let status = self.adapter.create_index(collection, index.clone()).await?;
        match status {
            IndexStatus::Created => {
                self.metrics.increment_indexes_created();
                Logger::info(Event::IndexCreated.as_str(), &[("collection", collection), ("index", &index.name)]);
            }
            IndexStatus::Exists => {
                Logger::info(Event::IndexExists.as_str(), &[("collection", collection), ("index", &index.name)]);
            }
            _ => {}
        }
        Ok(status)
    }

    pub async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<IndexStatus> {
        self.ensure_open()?;
        let status = self.adapter.drop_index(collection, name).await?;
        if status == IndexStatus::Dropped {
            self.metrics.increment_indexes_dropped();
            Logger::info(Event::IndexDropped.as_str(), &[("collection", collection), ("index", name)]);
        }
        Ok(status)
    }

    pub async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        self.ensure_open()?;
        self.adapter.list_indexes(collection).await
    }

    // ---- Capability registry & dispatch --------------------------------

    fn require_capability(&self, cap: Capability) -> StoreResult<()> {
        if self.adapter.supports(cap) {
            Ok(())
        } else {
            Logger::warn(Event::CapabilityRejected.as_str(), &[("capability", cap.as_str())]);
            Err(StoreError::not_supported(format!(
                "backend does not support capability {}",
                cap.as_str()
            )))
        }
    }

    fn check_capabilities(&self, stmt: &Statement) -> StoreResult<()> {
        let mut needed = Vec::new();
        match stmt {
            Statement::Select(q) | Statement::Count(q) => collect_query_caps(q, &mut needed),
            Statement::Get { .. } => {}
            Statement::Data(op) => collect_data_op_caps(op, &mut needed),
            Statement::Block(block) => {
                for op in &block.ops {
                    collect_data_op_caps(op, &mut needed);
                }
                if block.verb == BlockVerb::Transact {
                    let mut collections: Vec<&str> = block
                        .ops
                        .iter()
                        .map(|op| self.collection_or_default(data_op_collection(op)))
                        .collect();
                    collections.sort_unstable();
                    collections.dedup();
                    if collections.len() > 1 {
                        needed.push(Capability::TransactCrossCollection);
                    }
                }
            }
        }
        needed.sort_by_key(|c| c.as_str());
        needed.dedup_by_key(|c| c.as_str());
        for cap in needed {
            self.require_capability(cap)?;
        }
        Ok(())
    }

    // ---- Statement-form entry point ------------------------------------

    /// Parses `statement`, binds `@name` placeholders against `params`,
    /// checks capabilities, and dispatches. Produces the same `Response`
    /// as the equivalent structured `Operation` call.
    pub async fn execute(&self, statement: &str, params: &ParamMap) -> StoreResult<Response> {
        self.ensure_open()?;
        let parsed = match ql::parse_statement(statement) {
            Ok(s) => {
                Logger::info(Event::StatementParsed.as_str(), &[]);
                s
            }
            Err(e) => {
                Logger::warn(Event::StatementRejected.as_str(), &[("reason", &e.to_string())]);
                return Err(e.into());
            }
        };
        let bound = if params.is_empty() {
            parsed
        } else {
            let b = ql::bind_statement(&parsed, params)?;
            Logger::info(Event::ParamsBound.as_str(), &[]);
            b
        };
        self.check_capabilities(&bound)?;
        self.dispatch(bound).await
    }

    /// Structured-call entry point: builds the same AST
    /// `execute` would have parsed, then dispatches identically.
    pub async fn execute_operation(&self, op: Operation) -> StoreResult<Response> {
        self.ensure_open()?;
        let stmt = op.into_statement()?;
        let bound = if op.params.is_empty() {
            stmt
        } else {
            ql::bind_statement(&stmt, &op.params)?
        };
        self.check_capabilities(&bound)?;
        self.dispatch(bound).await
    }

    async fn dispatch(&self, stmt: Statement) -> StoreResult<Response> {
        match stmt {
            Statement::Get { key, select } => {
                let key = Key::from_value(&literal_value(&key)?)?;
                let item = self.adapter.get(&self.config.collection, &key, select.as_ref()).await?;
                self.metrics.increment_gets();
                Logger::info(
                    if item.is_some() { Event::GetHit.as_str() } else { Event::GetMiss.as_str() },
                    &[("collection", &self.config.collection)],
                );
                Ok(Response::Document(item))
            }
            Statement::Select(clause) => {
                let docs = self.adapter.query(&self.config.collection, &clause).await?;
                self.metrics.increment_queries();
                Logger::info(Event::QueryExecuted.as_str(), &[("collection", &self.config.collection)]);
                Ok(Response::Documents(docs))
            }
            Statement::Count(clause) => {
                let n = self.adapter.count(&self.config.collection, &clause).await?;
                self.metrics.increment_counts();
                Logger::info(Event::CountExecuted.as_str(), &[("collection", &self.config.collection)]);
                Ok(Response::Count(n))
            }
            Statement::Data(op) => self.dispatch_data_op(op).await,
            Statement::Block(block) => self.dispatch_block(block).await,
        }
    }

    async fn dispatch_data_op(&self, op: DataOp) -> StoreResult<Response> {
        match op {
            DataOp::Put { value, where_, returning, collection } => {
                let value = literal_value(&value)?;
                let collection = collection.unwrap_or_else(|| self.config.collection.clone());
                let returning = returning.map(|r| fixed_returning(&r)).transpose()?;
                let item = self.adapter.put(&collection, value, where_.as_ref(), returning).await;
                self.finish_mutation(item.as_ref(), Event::PutApplied).await;
                self.metrics.increment_puts();
                Ok(Response::Document(Some(item?)))
            }
            DataOp::Update { key, set, where_, returning, collection } => {
                let key = Key::from_value(&literal_value(&key)?)?;
                let collection = collection.unwrap_or_else(|| self.config.collection.clone());
                let returning = returning.map(|r| fixed_returning(&r)).transpose()?;
                let item = self
                    .adapter
                    .update(&collection, &key, &set, where_.as_ref(), returning)
                    .await;
                self.finish_mutation(item.as_ref(), Event::UpdateApplied).await;
                self.metrics.increment_updates();
                Ok(Response::Document(Some(item?)))
            }
            DataOp::Delete { key, where_, collection, .. } => {
                let key = Key::from_value(&literal_value(&key)?)?;
                let collection = collection.unwrap_or_else(|| self.config.collection.clone());
                let result = self.adapter.delete(&collection, &key, where_.as_ref()).await;
                match &result {
                    Ok(()) => Logger::info(Event::DeleteApplied.as_str(), &[("collection", &collection)]),
                    Err(StoreError::PreconditionFailed(_)) => {
                        Logger::warn(Event::PreconditionFailed.as_str(), &[("collection", &collection)])
                    }
                    Err(_) => {}
                }
                result?;
                self.metrics.increment_deletes();
                Ok(Response::Document(None))
            }
        }
    }

    async fn finish_mutation(&self, result: Result<&Item, &StoreError>, applied: Event) {
        match result {
            Ok(item) => Logger::info(applied.as_str(), &[("pk", &item.key.pk), ("id", &item.key.id)]),
            Err(StoreError::PreconditionFailed(_)) => {
                Logger::warn(Event::PreconditionFailed.as_str(), &[])
            }
            Err(_) => self.metrics.increment_errors(),
        }
    }

    async fn dispatch_block(&self, block: Block) -> StoreResult<Response> {
        let mut bound_ops = Vec::with_capacity(block.ops.len());
        for op in &block.ops {
            bound_ops.push(self.lower_data_op(op).await?);
        }
        match block.verb {
            BlockVerb::Batch => {
                let results = self.adapter.batch(&bound_ops).await?;
                self.metrics.increment_batches();
                Logger::info(Event::BatchExecuted.as_str(), &[("ops", &bound_ops.len().to_string())]);
                Ok(Response::Batch(results))
            }
            BlockVerb::Transact => {
                self.metrics.increment_transactions();
                match self.adapter.transact(&bound_ops).await {
                    Ok(results) => {
                        Logger::info(Event::TransactionCommitted.as_str(), &[("ops", &bound_ops.len().to_string())]);
                        Ok(Response::Transact(results))
                    }
                    Err(e) => {
                        self.metrics.increment_transactions_aborted();
                        Logger::warn(Event::TransactionAborted.as_str(), &[("reason", &e.to_string())]);
                        Err(e)
                    }
                }
            }
        }
    }

    async fn lower_data_op(&self, op: &DataOp) -> StoreResult<BoundDataOp> {
        Ok(match op {
            DataOp::Put { value, where_, returning, collection } => BoundDataOp::Put {
                collection: self.collection_or_default(collection).to_string(),
                value: literal_value(value)?,
                where_: where_.clone(),
                returning: returning.as_ref().map(fixed_returning).transpose()?,
            },
            DataOp::Update { key, set, where_, returning, collection } => BoundDataOp::Update {
                collection: self.collection_or_default(collection).to_string(),
                key: Key::from_value(&literal_value(key)?)?,
                set: set.clone(),
                where_: where_.clone(),
                returning: returning.as_ref().map(fixed_returning).transpose()?,
            },
            DataOp::Delete { key, where_, collection, .. } => BoundDataOp::Delete {
                collection: self.collection_or_default(collection).to_string(),
                key: Key::from_value(&literal_value(key)?)?,
                where_: where_.clone(),
            },
        })
    }

    // ---- Structured sugar over the statement-form core ------------------

    /// `GET`: the stored item (value plus `properties.etag`), or `None` if
    /// absent.
    pub async fn get(&self, key: Value, select: Option<&str>) -> StoreResult<Option<Item>> {
        let mut op = Operation::new(crate::core::operation::Verb::Get);
        op.key = Some(key);
        op.select = select.map(str::to_string);
        match self.execute_operation(op).await? {
            Response::Document(v) => Ok(v),
            other => unreachable!("GET must produce Response::Document, got {:?}", other.name()),
        }
    }

    /// `PUT`: the applied item, with the fresh `etag` the write produced.
    pub async fn put(
        &self,
        value: Value,
        where_: Option<&str>,
        returning: Option<crate::ql::Returning>,
    ) -> StoreResult<Item> {
        let mut op = Operation::new(crate::core::operation::Verb::Put);
        op.value = Some(value);
        op.where_ = where_.map(str::to_string);
        op.returning = returning;
        match self.execute_operation(op).await? {
            Response::Document(Some(item)) => Ok(item),
            other => unreachable!("PUT must produce Response::Document(Some), got {:?}", other.name()),
        }
    }

    /// `UPDATE`: the applied item, with the fresh `etag` the write produced.
    pub async fn update(
        &self,
        key: Value,
        set: &str,
        where_: Option<&str>,
        returning: Option<crate::ql::Returning>,
    ) -> StoreResult<Item> {
        let mut op = Operation::new(crate::core::operation::Verb::Update);
        op.key = Some(key);
        op.set = Some(set.to_string());
        op.where_ = where_.map(str::to_string);
        op.returning = returning;
        match self.execute_operation(op).await? {
            Response::Document(Some(item)) => Ok(item),
            other => unreachable!("UPDATE must produce Response::Document(Some), got {:?}", other.name()),
        }
    }

    pub async fn delete(&self, key: Value, where_: Option<&str>) -> StoreResult<()> {
        let mut op = Operation::new(crate::core::operation::Verb::Delete);
        op.key = Some(key);
        op.where_ = where_.map(str::to_string);
        self.execute_operation(op).await?;
        Ok(())
    }

    pub async fn query(
        &self,
        where_: Option<&str>,
        order_by: Option<&str>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> StoreResult<Vec<Value>> {
        let mut op = Operation::new(crate::core::operation::Verb::Query);
        op.where_ = where_.map(str::to_string);
        op.order_by = order_by.map(str::to_string);
        op.limit = limit;
        op.offset = offset;
        match self.execute_operation(op).await? {
            Response::Documents(v) => Ok(v),
            other => unreachable!("QUERY must produce Response::Documents, got {:?}", other.name()),
        }
    }

    pub async fn count(&self, where_: Option<&str>) -> StoreResult<u64> {
        let mut op = Operation::new(crate::core::operation::Verb::Count);
        op.where_ = where_.map(str::to_string);
        match self.execute_operation(op).await? {
            Response::Count(n) => Ok(n),
            other => unreachable!("COUNT must produce Response::Count, got {:?}", other.name()),
        }
    }

    pub async fn batch(&self, batch: Batch) -> StoreResult<Vec<OperationResult>> {
        self.run_block(batch.ops, BlockVerb::Batch).await
    }

    pub async fn transact(&self, txn: Transaction) -> StoreResult<Vec<OperationResult>> {
        self.run_block(txn.ops, BlockVerb::Transact).await
    }

    async fn run_block(&self, ops: Vec<Operation>, verb: BlockVerb) -> StoreResult<Vec<OperationResult>> {
        self.ensure_open()?;
        let mut data_ops = Vec::with_capacity(ops.len());
        for op in ops {
            match op.into_statement()? {
                Statement::Data(d) => data_ops.push(if op_params_empty(&op) {
                    d
                } else {
                    match ql::bind_statement(&Statement::Data(d), &op.params)? {
                        Statement::Data(d) => d,
                        _ => unreachable!(),
                    }
                }),
                _ => return Err(StoreError::bad_request("BATCH/TRANSACT items must be PUT/UPDATE/DELETE")),
            }
        }
        let block = Block { verb, ops: data_ops };
        let stmt = Statement::Block(block);
        self.check_capabilities(&stmt)?;
        match self.dispatch(stmt).await? {
            Response::Batch(r) | Response::Transact(r) => Ok(r),
            other => unreachable!("BATCH/TRANSACT must produce a list response, got {:?}", other.name()),
        }
    }
}

fn op_params_empty(op: &Operation) -> bool {
    op.params.is_empty()
}

fn fixed_returning(clause: &crate::ql::ReturningClause) -> StoreResult<crate::ql::Returning> {
    match clause {
        crate::ql::ReturningClause::Fixed(r) => Ok(*r),
        crate::ql::ReturningClause::Param(name) => Err(StoreError::internal(format!(
            "unbound RETURNING parameter @{} reached dispatch",
            name
        ))),
    }
}

fn data_op_collection(op: &DataOp) -> &Option<String> {
    match op {
        DataOp::Put { collection, .. } => collection,
        DataOp::Update { collection, .. } => collection,
        DataOp::Delete { collection, .. } => collection,
    }
}

/// Translates a `where="not_exists()"` / `where="exists()"` guard (the
/// only two forms meaningful for collection/index lifecycle)
/// into the adapter's boolean flag.
fn parse_guard(where_: Option<&str>, expect_fn: &str) -> StoreResult<bool> {
    let Some(text) = where_ else { return Ok(false) };
    match ql::parse_expr(text)? {
        Expr::Call { name, args } if name == expect_fn && args.is_empty() => Ok(true),
        _ => Err(StoreError::bad_request(format!(
            "unsupported WHERE clause for this operation; expected '{}()'",
            expect_fn
        ))),
    }
}

fn capability_for_index_kind(kind: IndexKind) -> Option<Capability> {
    match kind {
        IndexKind::Wildcard => Some(Capability::IndexWildcard),
        IndexKind::Vector => Some(Capability::IndexVector),
        _ => None,
    }
}

fn collect_query_caps(clause: &QueryClause, out: &mut Vec<Capability>) {
    if let Some(expr) = &clause.where_ {
        collect_expr_caps(expr, out);
    }
}

fn collect_data_op_caps(op: &DataOp, out: &mut Vec<Capability>) {
    match op {
        DataOp::Put { value, where_, .. } => {
            collect_value_literal_caps(value, out);
            if let Some(w) = where_ {
                collect_expr_caps(w, out);
            }
        }
        DataOp::Update { set, where_, .. } => {
            if let crate::ql::SetClause::Assignments(assignments) = set {
                for a in assignments {
                    if matches!(a.mutator, Mutator::Move(_)) {
                        out.push(Capability::UpdateArrayMove);
                    }
                    collect_mutator_value_caps(&a.mutator, out);
                }
            }
            if let Some(w) = where_ {
                collect_expr_caps(w, out);
            }
        }
        DataOp::Delete { where_, .. } => {
            if let Some(w) = where_ {
                collect_expr_caps(w, out);
            }
        }
    }
}

fn collect_mutator_value_caps(mutator: &Mutator, out: &mut Vec<Capability>) {
    match mutator {
        Mutator::Put(e) | Mutator::Insert(e) | Mutator::Increment(e) | Mutator::Append(e) => {
            collect_value_literal_caps(e, out)
        }
        Mutator::ArrayUnion(e) | Mutator::ArrayRemove(e) => collect_value_literal_caps(e, out),
        Mutator::Delete | Mutator::Move(_) => {}
    }
}

/// Walks a literal-only expression tree (as produced by `Expr::literal`)
/// for `Value::Bytes` leaves, which require `Capability::TypeBinary`.
fn collect_value_literal_caps(expr: &Expr, out: &mut Vec<Capability>) {
    if let Expr::Literal(lit) = expr {
        match lit {
            Literal::Str(_) => {}
            Literal::Array(items) => items.iter().for_each(|e| collect_value_literal_caps(e, out)),
            Literal::Object(entries) => entries.iter().for_each(|(_, e)| collect_value_literal_caps(e, out)),
            _ => {}
        }
    }
}

fn collect_expr_caps(expr: &Expr, out: &mut Vec<Capability>) {
    match expr {
        Expr::Field(path) => {
            if path.0.len() == 1 {
                if let crate::value::PathSegment::Field { name, dollar: true } = &path.0[0] {
                    if name == "etag" {
                        out.push(Capability::Etag);
                    }
                }
            }
        }
        Expr::Not(inner) => collect_expr_caps(inner, out),
        Expr::Logical(l, _, r) => {
            collect_expr_caps(l, out);
            collect_expr_caps(r, out);
        }
        Expr::Compare(l, op, r) => {
            if matches!(
                op,
                crate::ql::BinOp::Lt | crate::ql::BinOp::Lte | crate::ql::BinOp::Gt | crate::ql::BinOp::Gte
            ) && (is_string_literal(l) || is_string_literal(r))
            {
                out.push(Capability::RangeOnString);
            }
            collect_expr_caps(l, out);
            collect_expr_caps(r, out);
        }
        Expr::In { expr, list, .. } => {
            collect_expr_caps(expr, out);
            list.iter().for_each(|e| collect_expr_caps(e, out));
        }
        Expr::Between { expr, low, high } => {
            collect_expr_caps(expr, out);
            collect_expr_caps(low, out);
            collect_expr_caps(high, out);
        }
        Expr::Call { name, args } => {
            if name == "contains" || name == "starts_with" {
                out.push(Capability::StringSearch);
            }
            args.iter().for_each(|e| collect_expr_caps(e, out));
        }
        Expr::Literal(_) | Expr::Param(_) => {}
    }
}

fn is_string_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(Literal::Str(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryAdapter;
    use crate::core::capability::CapabilitySet;
    use serde_json::json;

    async fn open_store() -> DocumentStore {
        DocumentStore::open(Arc::new(MemoryAdapter::new()), StoreConfig::new("widgets"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_creates_default_collection() {
        let store = open_store().await;
        assert!(store.has_collection("widgets").await.unwrap());
    }

    #[tokio::test]
    async fn put_then_get_round_trips_via_statement_form() {
        let store = open_store().await;
        store
            .execute("PUT VALUE {\"pk\": \"pk00\", \"id\": \"1\", \"int\": 7}", &ParamMap::new())
            .await
            .unwrap();
        let resp = store
            .execute("GET KEY {\"pk\": \"pk00\", \"id\": \"1\"}", &ParamMap::new())
            .await
            .unwrap();
        match resp {
            Response::Document(Some(item)) => {
                assert_eq!(item.value.unwrap().get_field("int"), Some(&Value::Int(7)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn structured_and_statement_forms_agree() {
        let store = open_store().await;
        let value: Value = json!({"pk": "pk00", "id": "1", "int": 7}).into();
        store.put(value.clone(), None, None).await.unwrap();

        let structured = store.get(Key::new("pk00", "1").as_value(), None).await.unwrap();
        let textual = match store
            .execute("GET KEY {\"pk\": \"pk00\", \"id\": \"1\"}", &ParamMap::new())
            .await
            .unwrap()
        {
            Response::Document(v) => v,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(structured, textual);
    }

    #[tokio::test]
    async fn conditional_create_collection_conflicts_on_existing() {
        let store = open_store().await;
        let err = store
            .create_collection("widgets", Some("not_exists()"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn conditional_drop_collection_not_found_on_missing() {
        let store = open_store().await;
        let err = store.drop_collection("ghosts", Some("exists()")).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn closed_store_rejects_further_operations() {
        let store = open_store().await;
        store.close().await.unwrap();
        let err = store
            .execute("QUERY", &ParamMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
        // Idempotent close.
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn capability_rejection_surfaces_before_dispatch() {
        let adapter = MemoryAdapter::with_capabilities(CapabilitySet::all().without(Capability::StringSearch));
        let store = DocumentStore::open(Arc::new(adapter), StoreConfig::new("widgets")).await.unwrap();
        let err = store
            .execute("QUERY WHERE contains(str, 'x')", &ParamMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_SUPPORTED");
    }

    #[tokio::test]
    async fn batch_is_independent_per_item() {
        let store = open_store().await;
        let mut batch = Batch::default();
        for id in 0..5 {
            let mut op = Operation::new(crate::core::operation::Verb::Put);
            op.value = Some(json!({"pk": "pk00", "id": id.to_string(), "int": id}).into());
            batch.ops.push(op);
        }
        let results = store.batch(batch).await.unwrap();
        assert_eq!(results.len(), 5);
        for r in &results {
            assert!(matches!(r, OperationResult::Ok { .. }));
        }
    }

    #[tokio::test]
    async fn transaction_aborts_entirely_when_one_precondition_fails() {
        let store = open_store().await;
        for id in [7, 8, 9] {
            store
                .put(json!({"pk": "pk00", "id": id.to_string(), "int": 1}).into(), None, None)
                .await
                .unwrap();
        }
        let mut txn = Transaction::default();
        let mut put6 = Operation::new(crate::core::operation::Verb::Put);
        put6.value = Some(json!({"pk": "pk00", "id": "6", "int": 1}).into());
        put6.where_ = Some("not_exists()".to_string());
        txn.ops.push(put6);

        let mut del8 = Operation::new(crate::core::operation::Verb::Delete);
        del8.key = Some(Key::new("pk00", "8").as_value());
        txn.ops.push(del8);

        let mut bad_update = Operation::new(crate::core::operation::Verb::Update);
        bad_update.key = Some(Key::new("pk00", "9").as_value());
        bad_update.set = Some("int=put(2)".to_string());
        bad_update.where_ = Some("int = 999".to_string());
        txn.ops.push(bad_update);

        let err = store.transact(txn).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert!(store.get(Key::new("pk00", "6").as_value(), None).await.unwrap().is_none());
        assert!(store.get(Key::new("pk00", "8").as_value(), None).await.unwrap().is_some());
    }
}
