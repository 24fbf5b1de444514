//! Representative remote backend
//!
//! A Cosmos/Mongo-style HTTP document service, reached over `reqwest`. Every
//! other adapter in this crate owns its storage directly; this one owns
//! none — it is the adapter contract's demonstration that the AST can be
//! translated into a *wire* native form (a JSON filter document for WHERE,
//! a JSON update document for SET) and shipped to a server that does its
//! own evaluation. `to_native_filter`/`to_native_update` are the
//! translation itself and are exercised without a network in this module's
//! tests; the service round trip is exercised by the `#[ignore]`d suite in
//! `tests/remote_backend.rs`, gated on `PORTADB_REMOTE_URL`.
//!
//! Optimistic concurrency rides standard HTTP conditional requests
//! (RFC 7232): `If-None-Match: *` for `where=not_exists()`, `If-Match: *`
//! for `where=exists()`, `If-Match: "<etag>"` for `where=$etag='...'`.
//! Any other WHERE shape is sent as a `filter` body field for the server
//! to evaluate itself — the one case this adapter cannot simulate locally
//! without fetching the document first, which is exactly the tradeoff
//! this is common for document services lacking
//! native etag/version/if-match mechanisms, or simulating
//! via read-modify-write under a lock").

use async_trait::async_trait;
use reqwest::header::{HeaderValue, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize as SerdeSerialize};
use serde_json::{json, Value as Json};
use std::time::Duration;

use super::{Adapter, BoundDataOp, CollectionStatus, IndexKind, IndexSpec, IndexStatus};
use crate::core::capability::{Capability, CapabilitySet};
use crate::core::error::{StoreError, StoreResult};
use crate::core::key::{Item, Key, Properties};
use crate::core::operation::OperationResult;
use crate::ql::{BinOp, Expr, Literal, LogOp, Mutator, OrderByClause, QueryClause, Returning, Select, SetClause};
use crate::value::{Path, Value};

/// Per-adapter connection parameters ("backend-specific connection
/// parameters").
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        RemoteConfig {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct RemoteAdapter {
    capabilities: CapabilitySet,
    client: Client,
    base_url: String,
}

impl RemoteAdapter {
    pub fn new(config: RemoteConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::internal(format!("failed to build http client: {}", e)))?;
        Ok(RemoteAdapter {
            // Neither binary values nor the atomic move() mutator have an
            // equivalent primitive in the wire protocol this adapter
            // targets; the facade's capability check rejects
            // statements needing either before any request is sent.
            capabilities: CapabilitySet::all()
                .without(Capability::TypeBinary)
                .without(Capability::UpdateArrayMove),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: impl AsRef<str>) -> String {
        format!("{}{}", self.base_url, path.as_ref())
    }

    fn coll_url(&self, collection: &str) -> String {
        self.url(format!("/collections/{}", encode(collection)))
    }

    fn doc_url(&self, collection: &str, key: &Key) -> String {
        self.url(format!(
            "/collections/{}/documents/{}/{}",
            encode(collection),
            encode(&key.pk),
            encode(&key.id)
        ))
    }
}

fn encode(s: &str) -> String {
    // Minimal path-segment escaping; pk/id values are typically identifier-
    // shaped, but `/` would otherwise split the resource path.
    s.replace('/', "%2F")
}

async fn read_error_body(resp: reqwest::Response) -> String {
    resp.text().await.unwrap_or_default()
}

fn map_status(status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::BAD_REQUEST => StoreError::bad_request(body),
        StatusCode::UNAUTHORIZED => StoreError::Unauthorized,
        StatusCode::FORBIDDEN => StoreError::Forbidden(body),
        StatusCode::NOT_FOUND => StoreError::not_found(body),
        StatusCode::CONFLICT => StoreError::conflict(body),
        StatusCode::PRECONDITION_FAILED => StoreError::precondition_failed(body),
        StatusCode::UNPROCESSABLE_ENTITY => StoreError::not_supported(body),
        StatusCode::NOT_MODIFIED => StoreError::NotModified,
        other => StoreError::internal(format!("remote backend returned {}: {}", other, body)),
    }
}

fn map_transport_err(e: reqwest::Error) -> StoreError {
    if e.is_timeout() || e.is_connect() {
        // Timeout exhaustion and connection failures are retryable; keep
        // them out of `Internal` so callers can tell them apart.
        StoreError::transient(format!("remote backend transport error: {}", e))
    } else {
        StoreError::internal(format!("remote backend transport error: {}", e))
    }
}

// ---- Wire shapes -----------------------------------------------------

#[derive(Debug, SerdeSerialize, Deserialize)]
struct DocEnvelope {
    pk: String,
    id: String,
    etag: String,
    value: Json,
}

#[derive(Debug, SerdeSerialize)]
struct PutRequest<'a> {
    value: &'a Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    etag: String,
    #[serde(default)]
    old: Option<Json>,
}

#[derive(Debug, SerdeSerialize)]
struct UpdateRequest {
    update: Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    etag: String,
    #[serde(default)]
    old: Option<Json>,
    new: Json,
}

#[derive(Debug, SerdeSerialize, Default)]
struct DeleteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
}

#[derive(Debug, SerdeSerialize)]
struct QueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    select: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    order_by: Vec<(String, &'static str)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    items: Vec<DocEnvelope>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, SerdeSerialize)]
struct IndexRequest {
    kind: String,
    fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    name: String,
    kind: String,
    fields: Vec<String>,
}

#[derive(Debug, SerdeSerialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
enum WireOp {
    Put {
        collection: String,
        value: Json,
        #[serde(skip_serializing_if = "Option::is_none")]
        filter: Option<Json>,
    },
    Update {
        collection: String,
        pk: String,
        id: String,
        update: Json,
        #[serde(skip_serializing_if = "Option::is_none")]
        filter: Option<Json>,
    },
    Delete {
        collection: String,
        pk: String,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        filter: Option<Json>,
    },
}

#[derive(Debug, SerdeSerialize)]
struct BlockRequest {
    ops: Vec<WireOp>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum WireResult {
    Ok {
        #[serde(default)]
        returned: Option<Json>,
    },
    Err {
        code: String,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    results: Vec<WireResult>,
}

#[derive(Debug, Deserialize, Default)]
struct ConflictBody {
    #[serde(default)]
    causes: Vec<String>,
}

// ---- AST -> native translation ----------------------------------------

fn is_dollar_etag(path: &Path) -> bool {
    matches!(
        path.0.as_slice(),
        [crate::value::PathSegment::Field { name, dollar: true }] if name == "etag"
    )
}

/// The condition under which a PUT/UPDATE/DELETE may proceed, classified
/// into the wire representation it maps to most directly.
enum Precondition {
    None,
    IfNoneExists,
    IfExists,
    IfMatchEtag(String),
    Filter(Json),
}

fn classify_precondition(where_: Option<&Expr>) -> StoreResult<Precondition> {
    let Some(expr) = where_ else {
        return Ok(Precondition::None);
    };
    match expr {
        Expr::Call { name, args } if name == "not_exists" && args.is_empty() => Ok(Precondition::IfNoneExists),
        Expr::Call { name, args } if name == "exists" && args.is_empty() => Ok(Precondition::IfExists),
        Expr::Compare(l, BinOp::Eq, r) => match (l.as_ref(), r.as_ref()) {
            (Expr::Field(p), Expr::Literal(Literal::Str(s))) if is_dollar_etag(p) => {
                Ok(Precondition::IfMatchEtag(s.clone()))
            }
            (Expr::Literal(Literal::Str(s)), Expr::Field(p)) if is_dollar_etag(p) => {
                Ok(Precondition::IfMatchEtag(s.clone()))
            }
            _ => Ok(Precondition::Filter(to_native_filter(expr)?)),
        },
        other => Ok(Precondition::Filter(to_native_filter(other)?)),
    }
}

fn literal_to_value(lit: &Literal) -> StoreResult<Value> {
    Ok(match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::String(s.clone()),
        Literal::Array(items) => Value::Array(
            items
                .iter()
                .map(expr_literal_to_value)
                .collect::<StoreResult<Vec<_>>>()?,
        ),
        Literal::Object(entries) => {
            let mut m = indexmap::IndexMap::new();
            for (k, v) in entries {
                m.insert(k.clone(), expr_literal_to_value(v)?);
            }
            Value::Object(m)
        }
    })
}

fn expr_literal_to_value(expr: &Expr) -> StoreResult<Value> {
    match expr {
        Expr::Literal(lit) => literal_to_value(lit),
        other => Err(StoreError::bad_request(format!(
            "remote backend requires a literal value here, found {:?}",
            other
        ))),
    }
}

fn expr_literal_json(expr: &Expr) -> StoreResult<Json> {
    Ok(expr_literal_to_value(expr)?.into())
}

fn expect_field(expr: &Expr) -> StoreResult<&Path> {
    match expr {
        Expr::Field(p) => Ok(p),
        other => Err(StoreError::bad_request(format!(
            "expected a field path, found {:?}",
            other
        ))),
    }
}

fn expect_str_literal(expr: &Expr) -> StoreResult<&str> {
    match expr {
        Expr::Literal(Literal::Str(s)) => Ok(s.as_str()),
        other => Err(StoreError::bad_request(format!(
            "expected a string literal, found {:?}",
            other
        ))),
    }
}

fn arg(args: &[Expr], idx: usize) -> StoreResult<&Expr> {
    args.get(idx)
        .ok_or_else(|| StoreError::bad_request(format!("missing argument {}", idx)))
}

fn field_and_literal(args: &[Expr]) -> StoreResult<(String, Json)> {
    let path = expect_field(arg(args, 0)?)?.render();
    let value = expr_literal_json(arg(args, 1)?)?;
    Ok((path, value))
}

fn is_plain_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(_))
}

fn flip_op(op: &'static str) -> &'static str {
    match op {
        "$lt" => "$gt",
        "$gt" => "$lt",
        "$lte" => "$gte",
        "$gte" => "$lte",
        other => other,
    }
}

/// A scalar operand inside a comparison: either a field reference, a
/// literal, or a `length`/`array_length` call over one. Anything richer
/// falls outside what this adapter can push down to the wire.
fn native_scalar(expr: &Expr) -> StoreResult<Json> {
    Ok(match expr {
        Expr::Field(path) => json!({ "$field": path.render() }),
        Expr::Literal(lit) => literal_to_value(lit)?.into(),
        Expr::Call { name, args } if name == "length" || name == "array_length" => {
            let inner = native_scalar(arg(args, 0)?)?;
            let op = if name == "length" { "$length" } else { "$arrayLength" };
            json!({ op: inner })
        }
        other => {
            return Err(StoreError::bad_request(format!(
                "{:?} is not representable as a remote-backend scalar",
                other
            )))
        }
    })
}

fn native_compare(l: &Expr, op: BinOp, r: &Expr) -> StoreResult<Json> {
    let native_op: &'static str = match op {
        BinOp::Eq => "$eq",
        BinOp::Neq => "$ne",
        BinOp::Lt => "$lt",
        BinOp::Lte => "$lte",
        BinOp::Gt => "$gt",
        BinOp::Gte => "$gte",
    };
    if let Expr::Field(path) = l {
        if is_plain_literal(r) {
            return Ok(json!({ path.render(): { native_op: native_scalar(r)? } }));
        }
    }
    if let Expr::Field(path) = r {
        if is_plain_literal(l) {
            let flipped = flip_op(native_op);
            return Ok(json!({ path.render(): { flipped: native_scalar(l)? } }));
        }
    }
    Ok(json!({ "$expr": { native_op: [native_scalar(l)?, native_scalar(r)?] } }))
}

fn native_call(name: &str, args: &[Expr]) -> StoreResult<Json> {
    match name {
        // A bare exists()/not_exists() inside a compound WHERE (rather than
        // as the whole clause, which `classify_precondition` special-cases
        // before translation) describes document presence, not a field.
        "exists" | "not_exists" => Ok(json!({ "$documentExists": name == "exists" })),
        "is_defined" | "is_not_defined" => {
            let path = expect_field(arg(args, 0)?)?;
            Ok(json!({ path.render(): { "$exists": name == "is_defined" } }))
        }
        "is_type" => {
            let path = expect_field(arg(args, 0)?)?;
            let ty = expect_str_literal(arg(args, 1)?)?;
            Ok(json!({ path.render(): { "$type": ty } }))
        }
        "contains" => {
            let (field, needle) = field_and_literal(args)?;
            Ok(json!({ field: { "$contains": needle } }))
        }
        "starts_with" => {
            let (field, needle) = field_and_literal(args)?;
            Ok(json!({ field: { "$startsWith": needle } }))
        }
        "array_contains" => {
            let (field, needle) = field_and_literal(args)?;
            Ok(json!({ field: { "$arrayContains": needle } }))
        }
        "array_contains_any" => {
            let path = expect_field(arg(args, 0)?)?;
            let candidates = expr_literal_json(arg(args, 1)?)?;
            Ok(json!({ path.render(): { "$arrayContainsAny": candidates } }))
        }
        other => Err(StoreError::bad_request(format!("unknown predicate function '{}'", other))),
    }
}

/// Translates a WHERE expression into the service's native filter
/// document, in the style of Mongo's query-operator objects / Cosmos's
/// parameterized filter tree.
pub fn to_native_filter(expr: &Expr) -> StoreResult<Json> {
    Ok(match expr {
        Expr::Literal(Literal::Bool(b)) => json!(*b),
        Expr::Not(inner) => json!({ "$not": to_native_filter(inner)? }),
        Expr::Logical(l, LogOp::And, r) => json!({ "$and": [to_native_filter(l)?, to_native_filter(r)?] }),
        Expr::Logical(l, LogOp::Or, r) => json!({ "$or": [to_native_filter(l)?, to_native_filter(r)?] }),
        Expr::Compare(l, op, r) => native_compare(l, *op, r)?,
        Expr::In { expr, list, negated } => {
            let field = expect_field(expr)?.render();
            let values = list.iter().map(expr_literal_json).collect::<StoreResult<Vec<_>>>()?;
            let op = if *negated { "$nin" } else { "$in" };
            json!({ field: { op: values } })
        }
        Expr::Between { expr, low, high } => {
            let field = expect_field(expr)?.render();
            json!({ field: { "$gte": expr_literal_json(low)?, "$lte": expr_literal_json(high)? } })
        }
        Expr::Call { name, args } => native_call(name, args)?,
        Expr::Field(path) => json!({ path.render(): { "$eq": true } }),
        other => {
            return Err(StoreError::bad_request(format!(
                "{:?} is not a valid predicate for the remote backend",
                other
            )))
        }
    })
}

/// Translates an UPDATE SET clause into the service's native update
/// document, in the style of Mongo's `$set`/`$inc`/`$unset`/`$rename`
/// update operators (`$ifAbsent`/`$concat`/`$addToSet.$each`/`$pull.$in`
/// are this protocol's own additions for `insert`/`append`/`array_union`/
/// `array_remove`, which have no standard Mongo counterpart).
pub fn to_native_update(set: &SetClause) -> StoreResult<Json> {
    let assignments = match set {
        SetClause::Assignments(a) => a,
        SetClause::Param(name) => {
            return Err(StoreError::internal(format!(
                "unbound parameter @{} reached the update translator",
                name
            )))
        }
    };
    let mut set_doc = serde_json::Map::new();
    let mut unset_doc = serde_json::Map::new();
    let mut inc_doc = serde_json::Map::new();
    let mut rename_doc = serde_json::Map::new();
    let mut concat_doc = serde_json::Map::new();
    let mut add_to_set_doc = serde_json::Map::new();
    let mut pull_doc = serde_json::Map::new();

    for assignment in assignments {
        let path = assignment.path.render();
        match &assignment.mutator {
            Mutator::Put(e) => {
                set_doc.insert(path, expr_literal_json(e)?);
            }
            Mutator::Insert(e) => {
                set_doc.insert(path, json!({ "$ifAbsent": expr_literal_json(e)? }));
            }
            Mutator::Delete => {
                unset_doc.insert(path, json!(1));
            }
            Mutator::Increment(e) => {
                inc_doc.insert(path, expr_literal_json(e)?);
            }
            Mutator::Move(from) => {
                rename_doc.insert(from.render(), json!(path));
            }
            Mutator::Append(e) => {
                concat_doc.insert(path, expr_literal_json(e)?);
            }
            Mutator::ArrayUnion(e) => {
                add_to_set_doc.insert(path, json!({ "$each": expr_literal_json(e)? }));
            }
            Mutator::ArrayRemove(e) => {
                pull_doc.insert(path, json!({ "$in": expr_literal_json(e)? }));
            }
        }
    }

    let mut doc = serde_json::Map::new();
    if !set_doc.is_empty() {
        doc.insert("$set".to_string(), Json::Object(set_doc));
    }
    if !unset_doc.is_empty() {
        doc.insert("$unset".to_string(), Json::Object(unset_doc));
    }
    if !inc_doc.is_empty() {
        doc.insert("$inc".to_string(), Json::Object(inc_doc));
    }
    if !rename_doc.is_empty() {
        doc.insert("$rename".to_string(), Json::Object(rename_doc));
    }
    if !concat_doc.is_empty() {
        doc.insert("$concat".to_string(), Json::Object(concat_doc));
    }
    if !add_to_set_doc.is_empty() {
        doc.insert("$addToSet".to_string(), Json::Object(add_to_set_doc));
    }
    if !pull_doc.is_empty() {
        doc.insert("$pull".to_string(), Json::Object(pull_doc));
    }
    Ok(Json::Object(doc))
}

fn select_fields(select: Option<&Select>) -> StoreResult<Option<Vec<String>>> {
    match select {
        None | Some(Select::All) => Ok(None),
        Some(Select::Fields(paths)) => Ok(Some(paths.iter().map(|p| p.render()).collect())),
        Some(Select::Param(name)) => Err(StoreError::internal(format!(
            "unbound SELECT parameter @{} reached the remote adapter",
            name
        ))),
    }
}

fn order_terms(order_by: &OrderByClause) -> StoreResult<Vec<(String, &'static str)>> {
    match order_by {
        OrderByClause::Terms(terms) => Ok(terms
            .iter()
            .map(|t| {
                let dir = match t.direction {
                    crate::ql::SortDirection::Asc => "asc",
                    crate::ql::SortDirection::Desc => "desc",
                };
                (t.path.render(), dir)
            })
            .collect()),
        OrderByClause::Param(name) => Err(StoreError::internal(format!(
            "unbound ORDER BY parameter @{} reached the remote adapter",
            name
        ))),
    }
}

fn index_kind_str(kind: IndexKind) -> &'static str {
    match kind {
        IndexKind::Field => "field",
        IndexKind::Composite => "composite",
        IndexKind::Wildcard => "wildcard",
        IndexKind::Array => "array",
        IndexKind::Hash => "hash",
        IndexKind::Vector => "vector",
        IndexKind::Text => "text",
        IndexKind::Geospatial => "geospatial",
        IndexKind::Ttl => "ttl",
    }
}

fn index_kind_from_str(s: &str) -> IndexKind {
    match s {
        "composite" => IndexKind::Composite,
        "wildcard" => IndexKind::Wildcard,
        "array" => IndexKind::Array,
        "hash" => IndexKind::Hash,
        "vector" => IndexKind::Vector,
        "text" => IndexKind::Text,
        "geospatial" => IndexKind::Geospatial,
        "ttl" => IndexKind::Ttl,
        _ => IndexKind::Field,
    }
}

fn resolved_value_for_put(returning: Option<Returning>, old: Option<Value>, new: &Value) -> Option<Value> {
    match returning {
        Some(Returning::Old) => old,
        Some(Returning::New) | None => Some(new.clone()),
    }
}

fn resolved_value_for_mutation(returning: Option<Returning>, old: Option<Value>, new: Value) -> Option<Value> {
    match returning {
        Some(Returning::Old) => old,
        Some(Returning::New) => Some(new),
        None => None,
    }
}

fn wire_op(op: &BoundDataOp) -> StoreResult<WireOp> {
    Ok(match op {
        BoundDataOp::Put {
            collection,
            value,
            where_,
            ..
        } => {
            let filter = match classify_precondition(where_.as_ref())? {
                Precondition::None => None,
                Precondition::IfNoneExists => Some(json!({ "$documentExists": false })),
                Precondition::IfExists => Some(json!({ "$documentExists": true })),
                Precondition::IfMatchEtag(etag) => Some(json!({ "$etag": etag })),
                Precondition::Filter(f) => Some(f),
            };
            WireOp::Put {
                collection: collection.clone(),
                value: value.clone().into(),
                filter,
            }
        }
        BoundDataOp::Update {
            collection,
            key,
            set,
            where_,
            ..
        } => {
            let filter = match classify_precondition(where_.as_ref())? {
                Precondition::None => None,
                Precondition::IfNoneExists => Some(json!({ "$documentExists": false })),
                Precondition::IfExists => Some(json!({ "$documentExists": true })),
                Precondition::IfMatchEtag(etag) => Some(json!({ "$etag": etag })),
                Precondition::Filter(f) => Some(f),
            };
            WireOp::Update {
                collection: collection.clone(),
                pk: key.pk.clone(),
                id: key.id.clone(),
                update: to_native_update(set)?,
                filter,
            }
        }
        BoundDataOp::Delete { collection, key, where_ } => {
            let filter = match classify_precondition(where_.as_ref())? {
                Precondition::None => None,
                Precondition::IfNoneExists => Some(json!({ "$documentExists": false })),
                Precondition::IfExists => Some(json!({ "$documentExists": true })),
                Precondition::IfMatchEtag(etag) => Some(json!({ "$etag": etag })),
                Precondition::Filter(f) => Some(f),
            };
            WireOp::Delete {
                collection: collection.clone(),
                pk: key.pk.clone(),
                id: key.id.clone(),
                filter,
            }
        }
    })
}

#[async_trait]
impl Adapter for RemoteAdapter {
    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn create_collection(&self, name: &str, if_not_exists: bool) -> StoreResult<CollectionStatus> {
        let mut req = self.client.put(self.coll_url(name));
        if if_not_exists {
            req = req.header(IF_NONE_MATCH, HeaderValue::from_static("*"));
        }
        let resp = req.send().await.map_err(map_transport_err)?;
        match resp.status() {
            StatusCode::CREATED => Ok(CollectionStatus::Created),
            StatusCode::OK => Ok(CollectionStatus::Exists),
            StatusCode::PRECONDITION_FAILED => {
                Err(StoreError::conflict(format!("collection '{}' already exists", name)))
            }
            status => Err(map_status(status, read_error_body(resp).await)),
        }
    }

    async fn drop_collection(&self, name: &str, if_exists: bool) -> StoreResult<CollectionStatus> {
        let resp = self
            .client
            .delete(self.coll_url(name))
            .send()
            .await
            .map_err(map_transport_err)?;
        match resp.status() {
            StatusCode::NO_CONTENT => Ok(CollectionStatus::Dropped),
            StatusCode::NOT_FOUND if if_exists => {
                Err(StoreError::not_found(format!("collection '{}' does not exist", name)))
            }
            StatusCode::NOT_FOUND => Ok(CollectionStatus::NotExists),
            status => Err(map_status(status, read_error_body(resp).await)),
        }
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let resp = self
            .client
            .get(self.url("/collections"))
            .send()
            .await
            .map_err(map_transport_err)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        resp.json::<Vec<String>>().await.map_err(map_transport_err)
    }

    async fn has_collection(&self, name: &str) -> StoreResult<bool> {
        let resp = self
            .client
            .head(self.coll_url(name))
            .send()
            .await
            .map_err(map_transport_err)?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(map_status(status, read_error_body(resp).await)),
        }
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> StoreResult<IndexStatus> {
        let body = IndexRequest {
            kind: index_kind_str(index.kind).to_string(),
            fields: index.fields.clone(),
        };
        let resp = self
            .client
            .put(self.url(format!("/collections/{}/indexes/{}", encode(collection), encode(&index.name))))
            .json(&body)
            .send()
            .await
            .map_err(map_transport_err)?;
        match resp.status() {
            StatusCode::CREATED => Ok(IndexStatus::Created),
            StatusCode::OK => Ok(IndexStatus::Exists),
            status => Err(map_status(status, read_error_body(resp).await)),
        }
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<IndexStatus> {
        let resp = self
            .client
            .delete(self.url(format!("/collections/{}/indexes/{}", encode(collection), encode(name))))
            .send()
            .await
            .map_err(map_transport_err)?;
        match resp.status() {
            StatusCode::NO_CONTENT => Ok(IndexStatus::Dropped),
            StatusCode::NOT_FOUND => Ok(IndexStatus::NotExists),
            status => Err(map_status(status, read_error_body(resp).await)),
        }
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        let resp = self
            .client
            .get(self.url(format!("/collections/{}/indexes", encode(collection))))
            .send()
            .await
            .map_err(map_transport_err)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        let parsed: Vec<IndexResponse> = resp.json().await.map_err(map_transport_err)?;
        Ok(parsed
            .into_iter()
            .map(|i| IndexSpec {
                name: i.name,
                kind: index_kind_from_str(&i.kind),
                fields: i.fields,
            })
            .collect())
    }

    async fn get(&self, collection: &str, key: &Key, select: Option<&Select>) -> StoreResult<Option<Item>> {
        let resp = self
            .client
            .get(self.doc_url(collection, key))
            .send()
            .await
            .map_err(map_transport_err)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        let envelope: DocEnvelope = resp.json().await.map_err(map_transport_err)?;
        let value: Value = envelope.value.into();
        let value = match select {
            Some(s) => crate::eval::apply_select(&value, s)?,
            None => value,
        };
        Ok(Some(Item {
            key: key.clone(),
            value: Some(value),
            properties: Properties::new(envelope.etag),
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
        let value_json: Json = value.clone().into();
        let mut req = self.client.put(self.doc_url(collection, &key));
        let filter = match classify_precondition(where_)? {
            Precondition::None => None,
            Precondition::IfNoneExists => {
                req = req.header(IF_NONE_MATCH, HeaderValue::from_static("*"));
                None
            }
            Precondition::IfExists => {
                req = req.header(IF_MATCH, HeaderValue::from_static("*"));
                None
            }
            Precondition::IfMatchEtag(etag) => {
                req = req.header(
                    IF_MATCH,
                    HeaderValue::from_str(&format!("\"{}\"", etag))
                        .map_err(|e| StoreError::internal(e.to_string()))?,
                );
                None
            }
            Precondition::Filter(f) => Some(f),
        };
        let resp = req
            .json(&PutRequest {
                value: &value_json,
                filter,
            })
            .send()
            .await
            .map_err(map_transport_err)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        let parsed: PutResponse = resp.json().await.map_err(map_transport_err)?;
        let old = parsed.old.map(Value::from);
        Ok(Item {
            key,
            value: resolved_value_for_put(returning, old, &value),
            properties: Properties::new(parsed.etag),
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
        let mut req = self.client.patch(self.doc_url(collection, key));
        let filter = match classify_precondition(where_)? {
            Precondition::None => None,
            Precondition::IfNoneExists => return Err(StoreError::bad_request(
                "UPDATE cannot target an absent document; 'not_exists()' is not a valid UPDATE guard",
            )),
            Precondition::IfExists => None,
            Precondition::IfMatchEtag(etag) => {
                req = req.header(
                    IF_MATCH,
                    HeaderValue::from_str(&format!("\"{}\"", etag))
                        .map_err(|e| StoreError::internal(e.to_string()))?,
                );
                None
            }
            Precondition::Filter(f) => Some(f),
        };
        let resp = req
            .json(&UpdateRequest {
                update: to_native_update(set)?,
                filter,
            })
            .send()
            .await
            .map_err(map_transport_err)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        let parsed: UpdateResponse = resp.json().await.map_err(map_transport_err)?;
        let old = parsed.old.map(Value::from);
        let new: Value = parsed.new.into();
        Ok(Item {
            key: key.clone(),
            value: resolved_value_for_mutation(returning, old, new),
            properties: Properties::new(parsed.etag),
        })
    }

    async fn delete(&self, collection: &str, key: &Key, where_: Option<&Expr>) -> StoreResult<()> {
        let mut req = self.client.delete(self.doc_url(collection, key));
        let mut body = DeleteRequest::default();
        match classify_precondition(where_)? {
            Precondition::None | Precondition::IfExists => {}
            Precondition::IfNoneExists => {
                return Err(StoreError::bad_request(
                    "DELETE cannot target an absent document; 'not_exists()' is not a valid DELETE guard",
                ))
            }
            Precondition::IfMatchEtag(etag) => {
                req = req.header(
                    IF_MATCH,
                    HeaderValue::from_str(&format!("\"{}\"", etag))
                        .map_err(|e| StoreError::internal(e.to_string()))?,
                );
            }
            Precondition::Filter(f) => body.filter = Some(f),
        }
        let resp = req.json(&body).send().await.map_err(map_transport_err)?;
        match resp.status() {
            StatusCode::NO_CONTENT => Ok(()),
            status => Err(map_status(status, read_error_body(resp).await)),
        }
    }

    async fn query(&self, collection: &str, clause: &QueryClause) -> StoreResult<Vec<Value>> {
        let req = QueryRequest {
            filter: clause.where_.as_ref().map(to_native_filter).transpose()?,
            select: select_fields(clause.select.as_ref())?,
            order_by: order_terms(&clause.order_by)?,
            limit: clause.limit,
            offset: clause.offset,
        };
        let resp = self
            .client
            .post(self.url(format!("/collections/{}/documents/query", encode(collection))))
            .json(&req)
            .send()
            .await
            .map_err(map_transport_err)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        let parsed: QueryResponse = resp.json().await.map_err(map_transport_err)?;
        Ok(parsed.items.into_iter().map(|e| e.value.into()).collect())
    }

    async fn count(&self, collection: &str, clause: &QueryClause) -> StoreResult<u64> {
        let req = QueryRequest {
            filter: clause.where_.as_ref().map(to_native_filter).transpose()?,
            select: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        };
        let resp = self
            .client
            .post(self.url(format!("/collections/{}/documents/count", encode(collection))))
            .json(&req)
            .send()
            .await
            .map_err(map_transport_err)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        let parsed: CountResponse = resp.json().await.map_err(map_transport_err)?;
        Ok(parsed.count)
    }

    async fn batch(&self, ops: &[BoundDataOp]) -> StoreResult<Vec<OperationResult>> {
        let wire = BlockRequest {
            ops: ops.iter().map(wire_op).collect::<StoreResult<Vec<_>>>()?,
        };
        let resp = self
            .client
            .post(self.url("/batch"))
            .json(&wire)
            .send()
            .await
            .map_err(map_transport_err)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        let parsed: BlockResponse = resp.json().await.map_err(map_transport_err)?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| match r {
                WireResult::Ok { returned } => OperationResult::ok(returned.map(Value::from)),
                WireResult::Err { code, message } => OperationResult::Err { code, message },
            })
            .collect())
    }

    /// Unlike `batch`, a failed TRANSACT aborts the whole block; the
    /// service reports this with 409 and a `causes` array, folded into the
    /// `Conflict` message since `StoreError` carries no structured cause
    /// list of its own (other adapters share this gap).
    async fn transact(&self, ops: &[BoundDataOp]) -> StoreResult<Vec<OperationResult>> {
        let wire = BlockRequest {
            ops: ops.iter().map(wire_op).collect::<StoreResult<Vec<_>>>()?,
        };
        let resp = self
            .client
            .post(self.url("/transact"))
            .json(&wire)
            .send()
            .await
            .map_err(map_transport_err)?;
        if resp.status() == StatusCode::CONFLICT {
            let body = resp.text().await.unwrap_or_default();
            let causes: ConflictBody = serde_json::from_str(&body).unwrap_or_default();
            return Err(StoreError::conflict(if causes.causes.is_empty() {
                "transaction aborted".to_string()
            } else {
                format!("transaction aborted: {}", causes.causes.join("; "))
            }));
        }
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), read_error_body(resp).await));
        }
        let parsed: BlockResponse = resp.json().await.map_err(map_transport_err)?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| match r {
                WireResult::Ok { returned } => OperationResult::ok(returned.map(Value::from)),
                WireResult::Err { code, message } => OperationResult::Err { code, message },
            })
            .collect())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ql::{parse_expr, parse_set_clause};

    #[test]
    fn capabilities_exclude_binary_and_array_move() {
        let adapter = RemoteAdapter::new(RemoteConfig::new("http://localhost:0")).unwrap();
        assert!(!adapter.supports(Capability::TypeBinary));
        assert!(!adapter.supports(Capability::UpdateArrayMove));
        assert!(adapter.supports(Capability::Etag));
    }

    #[test]
    fn compare_on_field_translates_to_operator_object() {
        let expr = parse_expr("int between 1 and 3").unwrap();
        let native = to_native_filter(&expr).unwrap();
        assert_eq!(native, json!({ "int": { "$gte": 1, "$lte": 3 } }));
    }

    #[test]
    fn logical_and_or_nest_native_operators() {
        let expr = parse_expr("pk = 'pk00' and int > 1").unwrap();
        let native = to_native_filter(&expr).unwrap();
        assert_eq!(
            native,
            json!({ "$and": [ {"pk": {"$eq": "pk00"}}, {"int": {"$gt": 1}} ] })
        );
    }

    #[test]
    fn literal_compare_flips_operator_to_keep_field_first() {
        let expr = parse_expr("3 < int").unwrap();
        let native = to_native_filter(&expr).unwrap();
        assert_eq!(native, json!({ "int": { "$gt": 3 } }));
    }

    #[test]
    fn in_and_not_in_translate_to_membership_operators() {
        let expr = parse_expr("int in (1, 2, 3)").unwrap();
        assert_eq!(to_native_filter(&expr).unwrap(), json!({ "int": { "$in": [1, 2, 3] } }));
        let expr = parse_expr("int not in (1, 2)").unwrap();
        assert_eq!(to_native_filter(&expr).unwrap(), json!({ "int": { "$nin": [1, 2] } }));
    }

    #[test]
    fn function_calls_translate_to_custom_operators() {
        let expr = parse_expr("contains(str, 'world')").unwrap();
        assert_eq!(to_native_filter(&expr).unwrap(), json!({ "str": { "$contains": "world" } }));

        let expr = parse_expr("array_contains_any(arrstr, ['a', 'b'])").unwrap();
        assert_eq!(
            to_native_filter(&expr).unwrap(),
            json!({ "arrstr": { "$arrayContainsAny": ["a", "b"] } })
        );

        let expr = parse_expr("is_defined(obj.nstr)").unwrap();
        assert_eq!(to_native_filter(&expr).unwrap(), json!({ "obj.nstr": { "$exists": true } }));
    }

    #[test]
    fn set_clause_translates_each_mutator_to_its_own_operator() {
        let set = parse_set_clause(
            "int=put(99), newint=insert(1), bool=delete(), int2=increment(5), \
             to=move(from), s=append('!'), tags=array_union(['a']), tags2=array_remove(['b'])",
        )
        .unwrap();
        let native = to_native_update(&set).unwrap();
        assert_eq!(native["$set"]["int"], json!(99));
        assert_eq!(native["$set"]["newint"], json!({"$ifAbsent": 1}));
        assert_eq!(native["$unset"]["bool"], json!(1));
        assert_eq!(native["$inc"]["int2"], json!(5));
        assert_eq!(native["$rename"]["from"], json!("to"));
        assert_eq!(native["$concat"]["s"], json!("!"));
        assert_eq!(native["$addToSet"]["tags"], json!({"$each": ["a"]}));
        assert_eq!(native["$pull"]["tags2"], json!({"$in": ["b"]}));
    }

    #[test]
    fn classify_precondition_recognizes_etag_and_existence_guards() {
        let not_exists = parse_expr("not_exists()").unwrap();
        assert!(matches!(
            classify_precondition(Some(&not_exists)).unwrap(),
            Precondition::IfNoneExists
        ));
        let exists = parse_expr("exists()").unwrap();
        assert!(matches!(classify_precondition(Some(&exists)).unwrap(), Precondition::IfExists));
        let etag = parse_expr("$etag = 'abc'").unwrap();
        match classify_precondition(Some(&etag)).unwrap() {
            Precondition::IfMatchEtag(e) => assert_eq!(e, "abc"),
            _ => panic!("expected IfMatchEtag"),
        }
        let general = parse_expr("int = 5").unwrap();
        assert!(matches!(classify_precondition(Some(&general)).unwrap(), Precondition::Filter(_)));
    }
}
