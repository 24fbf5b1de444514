//! SET mutator application.
//!
//! All assignments in one SET clause execute against a stable snapshot of
//! the pre-image: a mutator's own current-value read (for `increment`,
//! `append`, `array_union`, `array_remove`, `move`) and any expression
//! arguments always read the document as it was before this UPDATE, never
//! a partially-built result. Overlapping assignment paths are rejected
//! upstream by `ql::binder::bind_set_clause`, so assignments here are
//! independent of each other's order.

use super::predicate::eval_operand;
use super::EvalContext;
use crate::core::error::{StoreError, StoreResult};
use crate::ql::{Assignment, Mutator, SetClause};
use crate::value::{self, Value};

pub fn apply_set(doc: &Value, set: &SetClause, ctx: &EvalContext) -> StoreResult<Value> {
    let assignments = match set {
        SetClause::Assignments(a) => a,
        SetClause::Param(name) => {
            return Err(StoreError::internal(format!(
                "unbound SET parameter @{} reached the evaluator",
                name
            )))
        }
    };
    let pre_image = doc.clone();
    let mut result = doc.clone();
    for assignment in assignments {
        apply_assignment(&mut result, &pre_image, assignment, ctx)?;
    }
    Ok(result)
}

fn apply_assignment(
    result: &mut Value,
    pre_image: &Value,
    assignment: &Assignment,
    ctx: &EvalContext,
) -> StoreResult<()> {
    let path = &assignment.path;
    match &assignment.mutator {
        Mutator::Put(expr) => {
            let v = eval_operand(expr, Some(pre_image), ctx)?;
            value::set(result, path, v)?;
        }
        Mutator::Insert(expr) => {
            let v = eval_operand(expr, Some(pre_image), ctx)?;
            value::insert(result, path, v)?;
        }
        Mutator::Delete => {
            value::delete(result, path)?;
        }
        Mutator::Increment(expr) => {
            let delta = eval_operand(expr, Some(pre_image), ctx)?;
            let current = value::get(pre_image, path).cloned().unwrap_or(Value::Int(0));
            value::set(result, path, numeric_add(&current, &delta)?)?;
        }
        Mutator::Move(other_path) => {
            let v = value::get(pre_image, other_path).cloned().unwrap_or(Value::Null);
            value::delete(result, other_path)?;
            value::set(result, path, v)?;
        }
        Mutator::Append(expr) => {
            let addition = eval_operand(expr, Some(pre_image), ctx)?;
            let current = value::get(pre_image, path)
                .cloned()
                .unwrap_or(Value::String(String::new()));
            value::set(result, path, string_append(&current, &addition)?)?;
        }
        Mutator::ArrayUnion(expr) => {
            let additions = eval_operand(expr, Some(pre_image), ctx)?;
            let current = value::get(pre_image, path)
                .and_then(Value::as_array)
                .map(|a| a.to_vec())
                .unwrap_or_default();
            value::set(result, path, array_union(current, array_arg(additions)?))?;
        }
        Mutator::ArrayRemove(expr) => {
            let removals = eval_operand(expr, Some(pre_image), ctx)?;
            let current = value::get(pre_image, path)
                .and_then(Value::as_array)
                .map(|a| a.to_vec())
                .unwrap_or_default();
            value::set(result, path, array_remove(current, array_arg(removals)?))?;
        }
    }
    Ok(())
}

fn array_arg(v: Value) -> StoreResult<Vec<Value>> {
    match v {
        Value::Array(a) => Ok(a),
        other => Err(StoreError::bad_request(format!(
            "expected an array argument, found {}",
            other.type_name()
        ))),
    }
}

fn numeric_add(current: &Value, delta: &Value) -> StoreResult<Value> {
    match (current, delta) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
            Ok(Value::Float(a.as_f64().unwrap() + b.as_f64().unwrap()))
        }
        _ => Err(StoreError::bad_request(format!(
            "increment() requires numeric operands, found {} and {}",
            current.type_name(),
            delta.type_name()
        ))),
    }
}

fn string_append(current: &Value, addition: &Value) -> StoreResult<Value> {
    match (current.as_str(), addition.as_str()) {
        (Some(a), Some(b)) => Ok(Value::String(format!("{}{}", a, b))),
        _ => Err(StoreError::bad_request(format!(
            "append() requires string operands, found {} and {}",
            current.type_name(),
            addition.type_name()
        ))),
    }
}

/// Union preserving the order of first occurrence: existing elements keep
/// their position, then new elements from `additions` not already present.
fn array_union(current: Vec<Value>, additions: Vec<Value>) -> Value {
    let mut out = current;
    for item in additions {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Value::Array(out)
}

/// Removes every element equal to any value in `removals`.
fn array_remove(current: Vec<Value>, removals: Vec<Value>) -> Value {
    Value::Array(
        current
            .into_iter()
            .filter(|item| !removals.contains(item))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Key;
    use crate::ql::parse_set_clause;
    use serde_json::json;

    fn ctx(key: &Key) -> EvalContext<'_> {
        EvalContext::new(key, Some("e1"))
    }

    #[test]
    fn multiple_mutators_apply_against_pre_image() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({
            "int": 8, "str": "eight", "float": 1.4, "obj": {"nint": -800, "narr": [1]},
            "bool": true
        })
        .into();
        let set = parse_set_clause(
            "int=put(99), str=put('new nine'), obj.nstr=put('90'), float=insert(1.9), \
             newint=insert(999), obj.nnewstr=insert(null), bool=delete(), obj.narr=delete(), \
             arrint=put([1,2,3]), newobj=put({\"int\":90,\"str\":\"ninety\"})",
        )
        .unwrap();
        let result = apply_set(&doc, &set, &ctx(&key)).unwrap();

        assert_eq!(result.get_field("int"), Some(&Value::Int(99)));
        assert_eq!(result.get_field("str"), Some(&Value::String("new nine".into())));
        assert_eq!(
            result.get_field("obj").unwrap().get_field("nstr"),
            Some(&Value::String("90".into()))
        );
        // insert() on an already-present leaf is a no-op.
        assert_eq!(result.get_field("float"), Some(&Value::Float(1.4)));
        assert_eq!(result.get_field("newint"), Some(&Value::Int(999)));
        assert_eq!(
            result.get_field("obj").unwrap().get_field("nnewstr"),
            Some(&Value::Null)
        );
        assert_eq!(result.get_field("bool"), None);
        assert_eq!(result.get_field("obj").unwrap().get_field("narr"), None);
        assert_eq!(
            result.get_field("arrint"),
            Some(&Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
        let newobj = result.get_field("newobj").unwrap();
        assert_eq!(newobj.get_field("int"), Some(&Value::Int(90)));
    }

    #[test]
    fn increment_reads_pre_image_not_intermediate_result() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"n": 10}).into();
        let set = parse_set_clause("n=increment(5), m=put(n)").unwrap();
        let result = apply_set(&doc, &set, &ctx(&key)).unwrap();
        assert_eq!(result.get_field("n"), Some(&Value::Int(15)));
        // `m=put(n)` reads the pre-image value of n (10), not the freshly
        // incremented 15.
        assert_eq!(result.get_field("m"), Some(&Value::Int(10)));
    }

    #[test]
    fn array_union_preserves_first_occurrence_order_and_dedups() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"tags": ["a", "b"]}).into();
        let set = parse_set_clause("tags=array_union(['b', 'c', 'a'])").unwrap();
        let result = apply_set(&doc, &set, &ctx(&key)).unwrap();
        assert_eq!(
            result.get_field("tags"),
            Some(&Value::Array(vec![
                Value::String("a".into()),
                Value::String("b".into()),
                Value::String("c".into()),
            ]))
        );
    }

    #[test]
    fn array_remove_drops_matching_elements() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"tags": ["a", "b", "c"]}).into();
        let set = parse_set_clause("tags=array_remove(['b'])").unwrap();
        let result = apply_set(&doc, &set, &ctx(&key)).unwrap();
        assert_eq!(
            result.get_field("tags"),
            Some(&Value::Array(vec![Value::String("a".into()), Value::String("c".into())]))
        );
    }

    #[test]
    fn move_deletes_source_and_sets_destination() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"from": 7}).into();
        let set = parse_set_clause("to=move(from)").unwrap();
        let result = apply_set(&doc, &set, &ctx(&key)).unwrap();
        assert_eq!(result.get_field("to"), Some(&Value::Int(7)));
        assert_eq!(result.get_field("from"), None);
    }

    #[test]
    fn append_requires_string_operands() {
        let key = Key::new("pk00", "0");
        let doc: Value = json!({"s": "hello "}).into();
        let set = parse_set_clause("s=append('world')").unwrap();
        let result = apply_set(&doc, &set, &ctx(&key)).unwrap();
        assert_eq!(result.get_field("s"), Some(&Value::String("hello world".into())));
    }
}
