//! Statement AST

use crate::value::{Path, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOp {
    And,
    Or,
}

/// A literal value as written in the statement text. Arrays/objects carry
/// nested `Expr`s (not raw `Value`s) so a parameter can appear inside a
/// composite literal, e.g. `array_contains_any(arrstr, [@p7])`.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Field(Path),
    /// `@name` placeholder; resolved by the binder before evaluation.
    Param(String),
    Not(Box<Expr>),
    Logical(Box<Expr>, LogOp, Box<Expr>),
    Compare(Box<Expr>, BinOp, Box<Expr>),
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn literal(v: Value) -> Self {
        Expr::Literal(literal_from_value(v))
    }
}

fn literal_from_value(v: Value) -> Literal {
    match v {
        Value::Null => Literal::Null,
        Value::Bool(b) => Literal::Bool(b),
        Value::Int(i) => Literal::Int(i),
        Value::Float(f) => Literal::Float(f),
        Value::String(s) => Literal::Str(s),
        Value::Bytes(b) => Literal::Str(crate::value::Value::Bytes(b).to_string()),
        Value::Array(a) => Literal::Array(a.into_iter().map(|x| Expr::literal(x)).collect()),
        Value::Object(m) => {
            Literal::Object(m.into_iter().map(|(k, v)| (k, Expr::literal(v))).collect())
        }
    }
}

/// Projection clause of a SELECT/QUERY.
#[derive(Debug, Clone, PartialEq)]
pub enum Select {
    All,
    Fields(Vec<Path>),
    Param(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub path: Path,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderByClause {
    Terms(Vec<OrderTerm>),
    Param(String),
}

impl Default for OrderByClause {
    fn default() -> Self {
        OrderByClause::Terms(Vec::new())
    }
}

/// The SELECT/QUERY/COUNT clause body: projection, predicate, ordering,
/// and pagination.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryClause {
    pub select: Option<Select>,
    pub where_: Option<Expr>,
    pub order_by: OrderByClause,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// An UPDATE SET mutator.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutator {
    Put(Expr),
    Insert(Expr),
    Delete,
    Increment(Expr),
    Move(Path),
    Append(Expr),
    ArrayUnion(Expr),
    ArrayRemove(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub path: Path,
    pub mutator: Mutator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetClause {
    Assignments(Vec<Assignment>),
    Param(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returning {
    Old,
    New,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturningClause {
    Fixed(Returning),
    Param(String),
}

/// A single PUT/UPDATE/DELETE, either top-level or inside a BATCH/TRANSACT
/// block. `collection` carries the optional `INTO`/`FROM` override.
#[derive(Debug, Clone, PartialEq)]
pub enum DataOp {
    Put {
        value: Expr,
        where_: Option<Expr>,
        returning: Option<ReturningClause>,
        collection: Option<String>,
    },
    Update {
        key: Expr,
        set: SetClause,
        where_: Option<Expr>,
        returning: Option<ReturningClause>,
        collection: Option<String>,
    },
    Delete {
        key: Expr,
        where_: Option<Expr>,
        returning: Option<ReturningClause>,
        collection: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockVerb {
    Batch,
    Transact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub verb: BlockVerb,
    pub ops: Vec<DataOp>,
}

/// A fully parsed statement: one production of the statement grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Bare `WHERE ...` / explicit `SELECT ...` / `QUERY ...`.
    Select(QueryClause),
    Get {
        key: Expr,
        select: Option<Select>,
    },
    Count(QueryClause),
    Data(DataOp),
    Block(Block),
}
