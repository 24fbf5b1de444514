//! WHERE predicate evaluation and the scalar/boolean function library.

use indexmap::IndexMap;
use std::cmp::Ordering;

use super::EvalContext;
use crate::core::error::{StoreError, StoreResult};
use crate::ql::{BinOp, Expr, Literal, LogOp};
use crate::value::{self, Path, Value};

/// Resolves a field reference against the document, special-casing
/// `$etag` (which lives in `Properties`, not the document value). `$pk`
/// and `$id` fall through to the ordinary lookup since key fields are
/// themselves stored in the document.
fn resolve_field(path: &Path, doc: Option<&Value>, ctx: &EvalContext) -> Option<Value> {
    if let [crate::value::PathSegment::Field { name, dollar: true }] = path.0.as_slice() {
        if name == "etag" {
            return ctx.etag.map(|e| Value::String(e.to_string()));
        }
    }
    doc.and_then(|d| value::get(d, path)).cloned()
}

fn field_is_defined(path: &Path, doc: Option<&Value>, ctx: &EvalContext) -> bool {
    if let [crate::value::PathSegment::Field { name, dollar: true }] = path.0.as_slice() {
        if name == "etag" {
            return ctx.etag.is_some();
        }
    }
    doc.map(|d| value::get(d, path).is_some()).unwrap_or(false)
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

/// Evaluates any expression to a concrete `Value`: literals, field
/// references, and scalar function calls. Used both as the top-level
/// operand of a comparison and as the argument to a mutator.
pub fn eval_operand(expr: &Expr, doc: Option<&Value>, ctx: &EvalContext) -> StoreResult<Value> {
    match expr {
        Expr::Literal(lit) => eval_literal(lit, doc, ctx),
        Expr::Field(path) => Ok(resolve_field(path, doc, ctx).unwrap_or(Value::Null)),
        Expr::Call { name, args } => eval_scalar_call(name, args, doc, ctx),
        Expr::Param(name) => Err(StoreError::internal(format!(
            "unbound parameter @{} reached the evaluator",
            name
        ))),
        other => Err(StoreError::bad_request(format!(
            "{:?} is not valid in value position",
            other
        ))),
    }
}

fn eval_literal(lit: &Literal, doc: Option<&Value>, ctx: &EvalContext) -> StoreResult<Value> {
    Ok(match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::String(s.clone()),
        Literal::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_operand(item, doc, ctx)?);
            }
            Value::Array(out)
        }
        Literal::Object(entries) => {
            let mut map = IndexMap::new();
            for (k, v) in entries {
                map.insert(k.clone(), eval_operand(v, doc, ctx)?);
            }
            Value::Object(map)
        }
    })
}

fn eval_scalar_call(
    name: &str,
    args: &[Expr],
    doc: Option<&Value>,
    ctx: &EvalContext,
) -> StoreResult<Value> {
    match name {
        "length" => {
            let v = eval_operand(
                args.first()
                    .ok_or_else(|| StoreError::bad_request("length() requires one argument"))?,
                doc,
                ctx,
            )?;
            match v {
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Array(a) => Ok(Value::Int(a.len() as i64)),
                other => Err(StoreError::bad_request(format!(
                    "length() expects a string or array, found {}",
                    other.type_name()
                ))),
            }
        }
        "array_length" => {
            let v = eval_operand(
                args.first().ok_or_else(|| {
                    StoreError::bad_request("array_length() requires one argument")
                })?,
                doc,
                ctx,
            )?;
            match v.as_array() {
                Some(a) => Ok(Value::Int(a.len() as i64)),
                None => Err(StoreError::bad_request(format!(
                    "array_length() expects an array, found {}",
                    v.type_name()
                ))),
            }
        }
        other => Err(StoreError::bad_request(format!(
            "unknown function '{}'",
            other
        ))),
    }
}

/// Evaluates a WHERE predicate to a boolean. `doc` is `None` when the
/// target document does not currently exist (e.g. a `put` insert guard).
pub fn eval_predicate(expr: &Expr, doc: Option<&Value>, ctx: &EvalContext) -> StoreResult<bool> {
    match expr {
        Expr::Literal(Literal::Bool(b)) => Ok(*b),
        Expr::Not(inner) => Ok(!eval_predicate(inner, doc, ctx)?),
        Expr::Logical(l, LogOp::And, r) => {
            Ok(eval_predicate(l, doc, ctx)? && eval_predicate(r, doc, ctx)?)
        }
        Expr::Logical(l, LogOp::Or, r) => {
            Ok(eval_predicate(l, doc, ctx)? || eval_predicate(r, doc, ctx)?)
        }
        Expr::Compare(l, op, r) => {
            let lv = eval_operand(l, doc, ctx)?;
            let rv = eval_operand(r, doc, ctx)?;
            Ok(eval_compare(&lv, *op, &rv))
        }
        Expr::In { expr, list, negated } => {
            let v = eval_operand(expr, doc, ctx)?;
            let mut found = false;
            for item in list {
                if eval_operand(item, doc, ctx)? == v {
                    found = true;
                    break;
                }
            }
            Ok(found != *negated)
        }
        Expr::Between { expr, low, high } => {
            let v = eval_operand(expr, doc, ctx)?;
            let lo = eval_operand(low, doc, ctx)?;
            let hi = eval_operand(high, doc, ctx)?;
            Ok(matches!(value::compare(&v, &lo), Some(Ordering::Greater) | Some(Ordering::Equal))
                && matches!(value::compare(&v, &hi), Some(Ordering::Less) | Some(Ordering::Equal)))
        }
        Expr::Call { name, args } => eval_bool_call(name, args, doc, ctx),
        Expr::Field(path) => match resolve_field(path, doc, ctx) {
            Some(Value::Bool(b)) => Ok(b),
            Some(other) => Err(StoreError::bad_request(format!(
                "field '{}' used as a predicate is not boolean (found {})",
                path,
                other.type_name()
            ))),
            None => Ok(false),
        },
        other => Err(StoreError::bad_request(format!(
            "{:?} is not a valid predicate",
            other
        ))),
    }
}

fn eval_compare(l: &Value, op: BinOp, r: &Value) -> bool {
    match op {
        BinOp::Eq => l == r,
        BinOp::Neq => l != r,
        BinOp::Lt => value::compare(l, r) == Some(Ordering::Less),
        BinOp::Lte => matches!(value::compare(l, r), Some(Ordering::Less) | Some(Ordering::Equal)),
        BinOp::Gt => value::compare(l, r) == Some(Ordering::Greater),
        BinOp::Gte => matches!(
            value::compare(l, r),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
    }
}

fn eval_bool_call(
    name: &str,
    args: &[Expr],
    doc: Option<&Value>,
    ctx: &EvalContext,
) -> StoreResult<bool> {
    match name {
        "exists" => Ok(doc.is_some()),
        "not_exists" => Ok(doc.is_none()),
        "is_defined" => Ok(field_is_defined(expect_field(arg(args, 0)?)?, doc, ctx)),
        "is_not_defined" => Ok(!field_is_defined(expect_field(arg(args, 0)?)?, doc, ctx)),
        "is_type" => {
            let path = expect_field(arg(args, 0)?)?;
            let expect_type = match arg(args, 1)? {
                Expr::Literal(Literal::Str(s)) => s.as_str(),
                other => {
                    return Err(StoreError::bad_request(format!(
                        "is_type()'s second argument must be a string literal, found {:?}",
                        other
                    )))
                }
            };
            Ok(resolve_field(path, doc, ctx)
                .map(|v| v.type_name() == expect_type)
                .unwrap_or(false))
        }
        "contains" => {
            let haystack = eval_operand(arg(args, 0)?, doc, ctx)?;
            let needle = eval_operand(arg(args, 1)?, doc, ctx)?;
            match (haystack.as_str(), needle.as_str()) {
                (Some(h), Some(n)) => Ok(h.contains(n)),
                _ => Err(StoreError::bad_request("contains() expects two strings")),
            }
        }
        "starts_with" => {
            let haystack = eval_operand(arg(args, 0)?, doc, ctx)?;
            let prefix = eval_operand(arg(args, 1)?, doc, ctx)?;
            match (haystack.as_str(), prefix.as_str()) {
                (Some(h), Some(p)) => Ok(h.starts_with(p)),
                _ => Err(StoreError::bad_request("starts_with() expects two strings")),
            }
        }
        "array_contains" => {
            let arr = eval_operand(arg(args, 0)?, doc, ctx)?;
            let needle = eval_operand(arg(args, 1)?, doc, ctx)?;
            match arr.as_array() {
                Some(items) => Ok(items.contains(&needle)),
                None => Err(StoreError::bad_request("array_contains() expects an array")),
            }
        }
        "array_contains_any" => {
            let arr = eval_operand(arg(args, 0)?, doc, ctx)?;
            let candidates = eval_operand(arg(args, 1)?, doc, ctx)?;
            match (arr.as_array(), candidates.as_array()) {
                (Some(items), Some(candidates)) => {
                    Ok(candidates.iter().any(|c| items.contains(c)))
                }
                _ => Err(StoreError::bad_request(
                    "array_contains_any() expects two arrays",
                )),
            }
        }
        other => Err(StoreError::bad_request(format!(
            "unknown predicate function '{}'",
            other
        ))),
    }
}

fn arg(args: &[Expr], idx: usize) -> StoreResult<&Expr> {
    args.get(idx)
        .ok_or_else(|| StoreError::bad_request(format!("missing argument {}", idx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Key;
    use crate::ql::parse_expr;
    use serde_json::json;

    fn ctx(key: &Key) -> EvalContext<'_> {
        EvalContext::new(key, Some("e1"))
    }

    #[test]
    fn eq_is_tolerant_between_int_and_float() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"int": 9}).into();
        let expr = parse_expr("int = 9.0").unwrap();
        assert!(eval_predicate(&expr, Some(&doc), &ctx(&key)).unwrap());
    }

    #[test]
    fn between_is_inclusive() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"int": 3}).into();
        let expr = parse_expr("int between 1 and 3").unwrap();
        assert!(eval_predicate(&expr, Some(&doc), &ctx(&key)).unwrap());
    }

    #[test]
    fn type_mismatch_compares_false_not_error() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"str": "nine"}).into();
        let expr = parse_expr("str > 3").unwrap();
        assert!(!eval_predicate(&expr, Some(&doc), &ctx(&key)).unwrap());
    }

    #[test]
    fn contains_and_starts_with() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"str": "hello world"}).into();
        let c = ctx(&key);
        assert!(
            eval_predicate(&parse_expr("contains(str, 'world')").unwrap(), Some(&doc), &c)
                .unwrap()
        );
        assert!(
            eval_predicate(&parse_expr("starts_with(str, 'hello')").unwrap(), Some(&doc), &c)
                .unwrap()
        );
    }

    #[test]
    fn exists_and_not_exists_use_document_presence() {
        let key = Key::new("pk00", "0");
        let c = ctx(&key);
        assert!(eval_predicate(&parse_expr("not_exists()").unwrap(), None, &c).unwrap());
        let doc: Value = json!({}).into();
        assert!(eval_predicate(&parse_expr("exists()").unwrap(), Some(&doc), &c).unwrap());
    }

    #[test]
    fn dollar_etag_resolves_from_context_not_document() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({}).into();
        let c = ctx(&key);
        let expr = parse_expr("$etag = 'e1'").unwrap();
        assert!(eval_predicate(&expr, Some(&doc), &c).unwrap());
    }

    #[test]
    fn array_contains_any_checks_either_direction() {
        let key = Key::new("pk01", "9");
        let doc: Value = json!({"arrstr": ["a", "b", "c"]}).into();
        let c = ctx(&key);
        let expr = parse_expr("array_contains_any(arrstr, ['z', 'b'])").unwrap();
        assert!(eval_predicate(&expr, Some(&doc), &c).unwrap());
    }
}
