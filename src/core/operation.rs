//! Unified operation/response model
//!
//! An `Operation` is the structured-call counterpart to a statement string:
//! every sub-clause (`where`/`set`/`select`/`order_by`) is itself statement
//! syntax, parsed through the same per-clause parser the textual form uses,
//! so structured calls and `execute(statement, params)` calls produce
//! byte-identical ASTs and therefore identical results.

use serde::Serialize;

use crate::core::error::{StoreError, StoreResult};
use crate::core::key::Item;
use crate::ql::{self, DataOp, Expr, Returning, ReturningClause, Statement};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Put,
    Update,
    Delete,
    Query,
    Count,
}

/// A single operation in structured-call form. Exactly the fields named in
/// Named fields: verb plus optional key/value/set/where/select/order_by/limit/
/// offset/params/collection/returning.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub verb: Option<Verb>,
    pub key: Option<Value>,
    pub value: Option<Value>,
    pub set: Option<String>,
    pub where_: Option<String>,
    pub select: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub params: ql::ParamMap,
    pub collection: Option<String>,
    pub returning: Option<Returning>,
}

impl Operation {
    pub fn new(verb: Verb) -> Self {
        Operation {
            verb: Some(verb),
            ..Default::default()
        }
    }

    fn where_expr(&self) -> StoreResult<Option<Expr>> {
        match &self.where_ {
            Some(text) => Ok(Some(ql::parse_expr(text)?)),
            None => Ok(None),
        }
    }

    fn returning_clause(&self) -> Option<ReturningClause> {
        self.returning.map(ReturningClause::Fixed)
    }

    /// Builds the AST this operation is equivalent to, reusing the same
    /// per-clause parse functions the textual statement form delegates to.
    pub fn into_statement(&self) -> StoreResult<Statement> {
        let verb = self
            .verb
            .ok_or_else(|| StoreError::bad_request("operation is missing a verb"))?;
        match verb {
            Verb::Get => {
                let key = self
                    .key
                    .clone()
                    .ok_or_else(|| StoreError::bad_request("GET requires a key"))?;
                let select = match &self.select {
                    Some(text) => Some(ql::parse_select_clause(text)?),
                    None => None,
                };
                Ok(Statement::Get {
                    key: Expr::literal(key),
                    select,
                })
            }
            Verb::Put => {
                let value = self
                    .value
                    .clone()
                    .ok_or_else(|| StoreError::bad_request("PUT requires a value"))?;
                Ok(Statement::Data(DataOp::Put {
                    value: Expr::literal(value),
                    where_: self.where_expr()?,
                    returning: self.returning_clause(),
                    collection: self.collection.clone(),
                }))
            }
            Verb::Update => {
                let key = self
                    .key
                    .clone()
                    .ok_or_else(|| StoreError::bad_request("UPDATE requires a key"))?;
                let set = self
                    .set
                    .as_deref()
                    .ok_or_else(|| StoreError::bad_request("UPDATE requires a SET clause"))?;
                Ok(Statement::Data(DataOp::Update {
                    key: Expr::literal(key),
                    set: ql::parse_set_clause(set)?,
                    where_: self.where_expr()?,
                    returning: self.returning_clause(),
                    collection: self.collection.clone(),
                }))
            }
            Verb::Delete => {
                let key = self
                    .key
                    .clone()
                    .ok_or_else(|| StoreError::bad_request("DELETE requires a key"))?;
                Ok(Statement::Data(DataOp::Delete {
                    key: Expr::literal(key),
                    where_: self.where_expr()?,
                    returning: self.returning_clause(),
                    collection: self.collection.clone(),
                }))
            }
            Verb::Query => {
                let select = match &self.select {
                    Some(text) => Some(ql::parse_select_clause(text)?),
                    None => None,
                };
                let order_by = match &self.order_by {
                    Some(text) => ql::parse_order_by_clause(text)?,
                    None => Default::default(),
                };
                Ok(Statement::Select(ql::QueryClause {
                    select,
                    where_: self.where_expr()?,
                    order_by,
                    limit: self.limit,
                    offset: self.offset,
                }))
            }
            Verb::Count => Ok(Statement::Count(ql::QueryClause {
                select: None,
                where_: self.where_expr()?,
                order_by: Default::default(),
                limit: self.limit,
                offset: self.offset,
            })),
        }
    }
}

/// A sequence of PUT/UPDATE/DELETE operations applied independently;
/// per-item success or failure never aborts siblings.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub ops: Vec<Operation>,
}

/// A sequence of PUT/UPDATE/DELETE operations applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub ops: Vec<Operation>,
}

/// The outcome of a single GET/PUT/UPDATE/DELETE/SELECT/COUNT statement.
/// `Document` carries the full item — key, value (when the verb produces
/// one), and `properties.etag` ("document-shaped item with key,
/// value, properties.etag") — not just the bare value, so callers can
/// read the etag a write produced without a second round trip.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Document(Option<Item>),
    Documents(Vec<Value>),
    Count(u64),
    Batch(Vec<OperationResult>),
    Transact(Vec<OperationResult>),
}

impl Response {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Document(_) => "document",
            Self::Documents(_) => "documents",
            Self::Count(_) => "count",
            Self::Batch(_) => "batch",
            Self::Transact(_) => "transact",
        }
    }
}

/// The per-item outcome of a data op inside a BATCH or TRANSACT block.
/// BATCH items each carry their own `OperationResult`, independent of their
/// siblings; TRANSACT items are all `Ok` or the whole block is rolled back
/// and reported as a single top-level error instead.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult {
    Ok { returned: Option<Value> },
    Err { code: String, message: String },
}

impl OperationResult {
    pub fn ok(returned: Option<Value>) -> Self {
        Self::Ok { returned }
    }

    pub fn err(e: &StoreError) -> Self {
        Self::Err {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_name_matches_variant() {
        assert_eq!(Response::Count(3).name(), "count");
        assert_eq!(Response::Document(None).name(), "document");
    }

    #[test]
    fn get_operation_builds_get_statement() {
        let op = Operation {
            verb: Some(Verb::Get),
            key: Some(Value::Object(Default::default())),
            ..Default::default()
        };
        let stmt = op.into_statement().unwrap();
        assert!(matches!(stmt, Statement::Get { .. }));
    }

    #[test]
    fn put_without_value_is_rejected() {
        let op = Operation::new(Verb::Put);
        assert!(op.into_statement().is_err());
    }

    #[test]
    fn query_parses_where_and_order_by_into_same_ast_as_textual_form() {
        let op = Operation {
            verb: Some(Verb::Query),
            where_: Some("pk = 'pk00' and int between 1 and 3".to_string()),
            order_by: Some("int DESC".to_string()),
            ..Default::default()
        };
        let structured = op.into_statement().unwrap();
        let textual = ql::parse_statement(
            "QUERY WHERE pk = 'pk00' and int between 1 and 3 ORDER BY int DESC",
        )
        .unwrap();
        assert_eq!(structured, textual);
    }
}
