//! Renders a parsed statement back to statement-language text. Used by the
//! round-trip testable property (parse . serialize . parse == parse) and by
//! diagnostics/logging that want to echo a bound statement.

use super::ast::*;

pub trait Serialize {
    fn serialize(&self) -> String;
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn fmt_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

impl Serialize for Literal {
    fn serialize(&self) -> String {
        match self {
            Literal::Null => "null".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => fmt_float(*f),
            Literal::Str(s) => quote(s),
            Literal::Array(items) => {
                let inner: Vec<String> = items.iter().map(|e| e.serialize()).collect();
                format!("[{}]", inner.join(", "))
            }
            Literal::Object(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.serialize()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }
}

impl Serialize for Expr {
    fn serialize(&self) -> String {
        match self {
            Expr::Literal(l) => l.serialize(),
            Expr::Field(p) => p.render(),
            Expr::Param(name) => format!("@{}", name),
            Expr::Not(inner) => format!("NOT {}", inner.serialize()),
            Expr::Logical(l, op, r) => {
                let op = match op {
                    LogOp::And => "AND",
                    LogOp::Or => "OR",
                };
                format!("({} {} {})", l.serialize(), op, r.serialize())
            }
            Expr::Compare(l, op, r) => {
                let op = match op {
                    BinOp::Eq => "=",
                    BinOp::Neq => "!=",
                    BinOp::Lt => "<",
                    BinOp::Lte => "<=",
                    BinOp::Gt => ">",
                    BinOp::Gte => ">=",
                };
                format!("{} {} {}", l.serialize(), op, r.serialize())
            }
            Expr::In { expr, list, negated } => {
                let inner: Vec<String> = list.iter().map(|e| e.serialize()).collect();
                format!(
                    "{} {}IN ({})",
                    expr.serialize(),
                    if *negated { "NOT " } else { "" },
                    inner.join(", ")
                )
            }
            Expr::Between { expr, low, high } => format!(
                "{} BETWEEN {} AND {}",
                expr.serialize(),
                low.serialize(),
                high.serialize()
            ),
            Expr::Call { name, args } => {
                let inner: Vec<String> = args.iter().map(|e| e.serialize()).collect();
                format!("{}({})", name, inner.join(", "))
            }
        }
    }
}

impl Serialize for Select {
    fn serialize(&self) -> String {
        match self {
            Select::All => "*".to_string(),
            Select::Fields(paths) => paths
                .iter()
                .map(|p| p.render())
                .collect::<Vec<_>>()
                .join(", "),
            Select::Param(name) => format!("@{}", name),
        }
    }
}

impl Serialize for OrderByClause {
    fn serialize(&self) -> String {
        match self {
            OrderByClause::Param(name) => format!("@{}", name),
            OrderByClause::Terms(terms) => terms
                .iter()
                .map(|t| {
                    let dir = match t.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {}", t.path.render(), dir)
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl Serialize for Mutator {
    fn serialize(&self) -> String {
        match self {
            Mutator::Put(e) => format!("put({})", e.serialize()),
            Mutator::Insert(e) => format!("insert({})", e.serialize()),
            Mutator::Delete => "delete()".to_string(),
            Mutator::Increment(e) => format!("increment({})", e.serialize()),
            Mutator::Move(p) => format!("move({})", p.render()),
            Mutator::Append(e) => format!("append({})", e.serialize()),
            Mutator::ArrayUnion(e) => format!("array_union({})", e.serialize()),
            Mutator::ArrayRemove(e) => format!("array_remove({})", e.serialize()),
        }
    }
}

impl Serialize for SetClause {
    fn serialize(&self) -> String {
        match self {
            SetClause::Param(name) => format!("@{}", name),
            SetClause::Assignments(assignments) => assignments
                .iter()
                .map(|a| format!("{} = {}", a.path.render(), a.mutator.serialize()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl Serialize for ReturningClause {
    fn serialize(&self) -> String {
        match self {
            ReturningClause::Param(name) => format!("@{}", name),
            ReturningClause::Fixed(Returning::Old) => "\"old\"".to_string(),
            ReturningClause::Fixed(Returning::New) => "\"new\"".to_string(),
        }
    }
}

fn serialize_query_tail(clause: &QueryClause) -> String {
    let mut parts = Vec::new();
    if let Some(w) = &clause.where_ {
        parts.push(format!("WHERE {}", w.serialize()));
    }
    if let OrderByClause::Terms(terms) = &clause.order_by {
        if !terms.is_empty() {
            parts.push(format!("ORDER BY {}", clause.order_by.serialize()));
        }
    } else {
        parts.push(format!("ORDER BY {}", clause.order_by.serialize()));
    }
    if let Some(limit) = clause.limit {
        parts.push(format!("LIMIT {}", limit));
    }
    if let Some(offset) = clause.offset {
        parts.push(format!("OFFSET {}", offset));
    }
    parts.join(" ")
}

fn serialize_trailing(
    where_: &Option<Expr>,
    collection: &Option<String>,
    returning: &Option<ReturningClause>,
) -> String {
    let mut parts = Vec::new();
    if let Some(w) = where_ {
        parts.push(format!("WHERE {}", w.serialize()));
    }
    if let Some(c) = collection {
        parts.push(format!("INTO {}", c));
    }
    if let Some(r) = returning {
        parts.push(format!("RETURNING {}", r.serialize()));
    }
    parts.join(" ")
}

impl Serialize for DataOp {
    fn serialize(&self) -> String {
        match self {
            DataOp::Put {
                value,
                where_,
                returning,
                collection,
            } => {
                let tail = serialize_trailing(where_, collection, returning);
                format!(
                    "PUT VALUE {}{}{}",
                    value.serialize(),
                    if tail.is_empty() { "" } else { " " },
                    tail
                )
            }
            DataOp::Update {
                key,
                set,
                where_,
                returning,
                collection,
            } => {
                let tail = serialize_trailing(where_, collection, returning);
                format!(
                    "UPDATE KEY {} SET {}{}{}",
                    key.serialize(),
                    set.serialize(),
                    if tail.is_empty() { "" } else { " " },
                    tail
                )
            }
            DataOp::Delete {
                key,
                where_,
                returning,
                collection,
            } => {
                let tail = serialize_trailing(where_, collection, returning);
                format!(
                    "DELETE KEY {}{}{}",
                    key.serialize(),
                    if tail.is_empty() { "" } else { " " },
                    tail
                )
            }
        }
    }
}

impl Serialize for Statement {
    fn serialize(&self) -> String {
        match self {
            Statement::Select(q) => {
                let mut out = match &q.select {
                    Some(select) => format!("SELECT {}", select.serialize()),
                    None => String::new(),
                };
                let tail = serialize_query_tail(q);
                if !tail.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&tail);
                }
                out
            }
            Statement::Get { key, select } => {
                let mut out = format!("GET KEY {}", key.serialize());
                if let Some(select) = select {
                    out.push_str(" SELECT ");
                    out.push_str(&select.serialize());
                }
                out
            }
            Statement::Count(q) => {
                let tail = serialize_query_tail(q);
                if tail.is_empty() {
                    "COUNT".to_string()
                } else {
                    format!("COUNT {}", tail)
                }
            }
            Statement::Data(op) => op.serialize(),
            Statement::Block(block) => {
                let verb = match block.verb {
                    BlockVerb::Batch => "BATCH",
                    BlockVerb::Transact => "TRANSACT",
                };
                let ops: Vec<String> = block.ops.iter().map(|op| format!("{};", op.serialize())).collect();
                format!("{} {} END", verb, ops.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ql::parse_statement;

    #[test]
    fn round_trips_simple_where() {
        let stmt = parse_statement("WHERE int = 1 AND bool = true").unwrap();
        let text = stmt.serialize();
        let reparsed = parse_statement(&text).unwrap();
        assert_eq!(stmt, reparsed);
    }

    #[test]
    fn round_trips_put_with_returning() {
        let stmt = parse_statement("PUT VALUE {\"id\": \"1\"} WHERE NOT_EXISTS() RETURNING \"new\"").unwrap();
        let text = stmt.serialize();
        let reparsed = parse_statement(&text).unwrap();
        assert_eq!(stmt, reparsed);
    }

    #[test]
    fn round_trips_batch_block() {
        let stmt =
            parse_statement("BATCH PUT VALUE {\"id\": \"1\"} INTO test; DELETE KEY {\"id\": \"2\"} FROM test; END")
                .unwrap();
        let text = stmt.serialize();
        let reparsed = parse_statement(&text).unwrap();
        assert_eq!(stmt, reparsed);
    }
}
