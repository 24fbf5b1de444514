//! Parameter substitution: resolves `@name` placeholders against a
//! caller-supplied parameter map, producing a statement with no remaining
//! `Param` nodes. A binding may be a scalar `Value` (substituted at a
//! literal position) or a raw clause `String` (re-parsed and, since the
//! re-parsed clause may itself reference `@name`, bound recursively against
//! the same map).

use std::collections::HashMap;

use super::ast::*;
use super::errors::{QlError, QlResult};
use super::parser::{parse_expr, parse_order_by_clause, parse_select_clause, parse_set_clause};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamBinding {
    Value(Value),
    Clause(String),
}

pub type ParamMap = HashMap<String, ParamBinding>;

fn lookup<'a>(params: &'a ParamMap, name: &str) -> QlResult<&'a ParamBinding> {
    params
        .get(name)
        .ok_or_else(|| QlError::UnboundParameter(name.to_string()))
}

fn bind_expr(expr: &Expr, params: &ParamMap) -> QlResult<Expr> {
    match expr {
        Expr::Literal(Literal::Array(items)) => Ok(Expr::Literal(Literal::Array(
            items.iter().map(|e| bind_expr(e, params)).collect::<QlResult<_>>()?,
        ))),
        Expr::Literal(Literal::Object(entries)) => Ok(Expr::Literal(Literal::Object(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), bind_expr(v, params)?)))
                .collect::<QlResult<_>>()?,
        ))),
        Expr::Literal(_) => Ok(expr.clone()),
        Expr::Field(_) => Ok(expr.clone()),
        Expr::Param(name) => match lookup(params, name)? {
            ParamBinding::Value(v) => Ok(Expr::literal(v.clone())),
            ParamBinding::Clause(text) => {
                let parsed = parse_expr(text)?;
                bind_expr(&parsed, params)
            }
        },
        Expr::Not(inner) => Ok(Expr::Not(Box::new(bind_expr(inner, params)?))),
        Expr::Logical(l, op, r) => Ok(Expr::Logical(
            Box::new(bind_expr(l, params)?),
            *op,
            Box::new(bind_expr(r, params)?),
        )),
        Expr::Compare(l, op, r) => Ok(Expr::Compare(
            Box::new(bind_expr(l, params)?),
            *op,
            Box::new(bind_expr(r, params)?),
        )),
        Expr::In { expr, list, negated } => Ok(Expr::In {
            expr: Box::new(bind_expr(expr, params)?),
            list: list.iter().map(|e| bind_expr(e, params)).collect::<QlResult<_>>()?,
            negated: *negated,
        }),
        Expr::Between { expr, low, high } => Ok(Expr::Between {
            expr: Box::new(bind_expr(expr, params)?),
            low: Box::new(bind_expr(low, params)?),
            high: Box::new(bind_expr(high, params)?),
        }),
        Expr::Call { name, args } => Ok(Expr::Call {
            name: name.clone(),
            args: args.iter().map(|e| bind_expr(e, params)).collect::<QlResult<_>>()?,
        }),
    }
}

fn bind_select(select: &Select, params: &ParamMap) -> QlResult<Select> {
    match select {
        Select::Param(name) => match lookup(params, name)? {
            ParamBinding::Clause(text) => {
                let parsed = parse_select_clause(text)?;
                bind_select(&parsed, params)
            }
            ParamBinding::Value(_) => Err(QlError::NotAClause(name.clone())),
        },
        other => Ok(other.clone()),
    }
}

fn bind_order_by(order_by: &OrderByClause, params: &ParamMap) -> QlResult<OrderByClause> {
    match order_by {
        OrderByClause::Param(name) => match lookup(params, name)? {
            ParamBinding::Clause(text) => {
                let parsed = parse_order_by_clause(text)?;
                bind_order_by(&parsed, params)
            }
            ParamBinding::Value(_) => Err(QlError::NotAClause(name.clone())),
        },
        other => Ok(other.clone()),
    }
}

fn bind_set_clause(set: &SetClause, params: &ParamMap) -> QlResult<SetClause> {
    match set {
        SetClause::Param(name) => match lookup(params, name)? {
            ParamBinding::Clause(text) => {
                let parsed = parse_set_clause(text)?;
                bind_set_clause(&parsed, params)
            }
            ParamBinding::Value(_) => Err(QlError::NotAClause(name.clone())),
        },
        SetClause::Assignments(assignments) => {
            let mut seen: Vec<String> = Vec::new();
            let mut out = Vec::new();
            for a in assignments {
                let rendered = a.path.render();
                if let Some(prev) = seen.iter().find(|s| **s == rendered) {
                    return Err(QlError::ConflictingAssignment(prev.clone(), rendered));
                }
                seen.push(rendered);
                out.push(Assignment {
                    path: a.path.clone(),
                    mutator: bind_mutator(&a.mutator, params)?,
                });
            }
            Ok(SetClause::Assignments(out))
        }
    }
}

fn bind_mutator(mutator: &Mutator, params: &ParamMap) -> QlResult<Mutator> {
    Ok(match mutator {
        Mutator::Put(e) => Mutator::Put(bind_expr(e, params)?),
        Mutator::Insert(e) => Mutator::Insert(bind_expr(e, params)?),
        Mutator::Delete => Mutator::Delete,
        Mutator::Increment(e) => Mutator::Increment(bind_expr(e, params)?),
        Mutator::Move(p) => Mutator::Move(p.clone()),
        Mutator::Append(e) => Mutator::Append(bind_expr(e, params)?),
        Mutator::ArrayUnion(e) => Mutator::ArrayUnion(bind_expr(e, params)?),
        Mutator::ArrayRemove(e) => Mutator::ArrayRemove(bind_expr(e, params)?),
    })
}

fn bind_returning(returning: &ReturningClause, params: &ParamMap) -> QlResult<ReturningClause> {
    match returning {
        ReturningClause::Param(name) => match lookup(params, name)? {
            ParamBinding::Clause(text) => {
                let word = text.trim();
                if word.eq_ignore_ascii_case("old") {
                    Ok(ReturningClause::Fixed(Returning::Old))
                } else if word.eq_ignore_ascii_case("new") {
                    Ok(ReturningClause::Fixed(Returning::New))
                } else {
                    Err(QlError::InvalidLiteral(format!("RETURNING {:?}", text)))
                }
            }
            ParamBinding::Value(Value::String(s)) if s.eq_ignore_ascii_case("old") => {
                Ok(ReturningClause::Fixed(Returning::Old))
            }
            ParamBinding::Value(Value::String(s)) if s.eq_ignore_ascii_case("new") => {
                Ok(ReturningClause::Fixed(Returning::New))
            }
            ParamBinding::Value(_) => Err(QlError::NotAClause(name.clone())),
        },
        other => Ok(other.clone()),
    }
}

fn bind_query_clause(clause: &QueryClause, params: &ParamMap) -> QlResult<QueryClause> {
    Ok(QueryClause {
        select: clause.select.as_ref().map(|s| bind_select(s, params)).transpose()?,
        where_: clause.where_.as_ref().map(|e| bind_expr(e, params)).transpose()?,
        order_by: bind_order_by(&clause.order_by, params)?,
        limit: clause.limit,
        offset: clause.offset,
    })
}

fn bind_data_op(op: &DataOp, params: &ParamMap) -> QlResult<DataOp> {
    Ok(match op {
        DataOp::Put {
            value,
            where_,
            returning,
            collection,
        } => DataOp::Put {
            value: bind_expr(value, params)?,
            where_: where_.as_ref().map(|e| bind_expr(e, params)).transpose()?,
            returning: returning.as_ref().map(|r| bind_returning(r, params)).transpose()?,
            collection: collection.clone(),
        },
        DataOp::Update {
            key,
            set,
            where_,
            returning,
            collection,
        } => DataOp::Update {
            key: bind_expr(key, params)?,
            set: bind_set_clause(set, params)?,
            where_: where_.as_ref().map(|e| bind_expr(e, params)).transpose()?,
            returning: returning.as_ref().map(|r| bind_returning(r, params)).transpose()?,
            collection: collection.clone(),
        },
        DataOp::Delete {
            key,
            where_,
            returning,
            collection,
        } => DataOp::Delete {
            key: bind_expr(key, params)?,
            where_: where_.as_ref().map(|e| bind_expr(e, params)).transpose()?,
            returning: returning.as_ref().map(|r| bind_returning(r, params)).transpose()?,
            collection: collection.clone(),
        },
    })
}

/// Resolves every `@name` reference in `stmt` against `params`, returning a
/// fully-bound statement with no remaining `Param` nodes.
pub fn bind_statement(stmt: &Statement, params: &ParamMap) -> QlResult<Statement> {
    Ok(match stmt {
        Statement::Select(q) => Statement::Select(bind_query_clause(q, params)?),
        Statement::Get { key, select } => Statement::Get {
            key: bind_expr(key, params)?,
            select: select.as_ref().map(|s| bind_select(s, params)).transpose()?,
        },
        Statement::Count(q) => Statement::Count(bind_query_clause(q, params)?),
        Statement::Data(op) => Statement::Data(bind_data_op(op, params)?),
        Statement::Block(block) => Statement::Block(Block {
            verb: block.verb.clone(),
            ops: block
                .ops
                .iter()
                .map(|op| bind_data_op(op, params))
                .collect::<QlResult<_>>()?,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ql::parse_statement;

    #[test]
    fn binds_scalar_param_in_where() {
        let stmt = parse_statement("WHERE int = @p1").unwrap();
        let mut params = ParamMap::new();
        params.insert("p1".into(), ParamBinding::Value(Value::Int(7)));
        let bound = bind_statement(&stmt, &params).unwrap();
        match bound {
            Statement::Select(q) => match q.where_.unwrap() {
                Expr::Compare(_, BinOp::Eq, right) => {
                    assert_eq!(*right, Expr::Literal(Literal::Int(7)))
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn binds_whole_where_clause_param() {
        let stmt = parse_statement("WHERE @p1").unwrap();
        let mut params = ParamMap::new();
        params.insert(
            "p1".into(),
            ParamBinding::Clause("int > 1 AND int < @p2".into()),
        );
        params.insert("p2".into(), ParamBinding::Value(Value::Int(9)));
        let bound = bind_statement(&stmt, &params).unwrap();
        match bound {
            Statement::Select(q) => assert!(q.where_.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unbound_param_errors() {
        let stmt = parse_statement("WHERE int = @missing").unwrap();
        let params = ParamMap::new();
        assert!(bind_statement(&stmt, &params).is_err());
    }
}
