//! ORDER BY sorting: stable, multi-term, with undefined sorting last.

use std::cmp::Ordering;

use crate::core::error::{StoreError, StoreResult};
use crate::ql::{OrderByClause, OrderTerm, SortDirection};
use crate::value::{self, Value};

pub fn sort_documents(docs: &mut [Value], order_by: &OrderByClause) -> StoreResult<()> {
    let terms = match order_by {
        OrderByClause::Terms(terms) => terms,
        OrderByClause::Param(name) => {
            return Err(StoreError::internal(format!(
                "unbound ORDER BY parameter @{} reached the evaluator",
                name
            )))
        }
    };
    if terms.is_empty() {
        return Ok(());
    }
    docs.sort_by(|a, b| compare_by_terms(a, b, terms));
    Ok(())
}

fn compare_by_terms(a: &Value, b: &Value, terms: &[OrderTerm]) -> Ordering {
    for term in terms {
        let av = value::get(a, &term.path);
        let bv = value::get(b, &term.path);
        let ord = match (av, bv) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => value::compare(x, y).unwrap_or(Ordering::Equal),
        };
        let ord = if term.direction == SortDirection::Desc {
            ord.reverse()
        } else {
            ord
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ql::parse_order_by_clause;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Value {
        v.into()
    }

    #[test]
    fn sorts_descending_by_single_term() {
        let mut docs = vec![
            doc(json!({"id": "1", "int": 1})),
            doc(json!({"id": "2", "int": 3})),
            doc(json!({"id": "3", "int": 2})),
        ];
        let order = parse_order_by_clause("int DESC").unwrap();
        sort_documents(&mut docs, &order).unwrap();
        let ids: Vec<_> = docs
            .iter()
            .map(|d| d.get_field("id").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn undefined_values_sort_to_the_end() {
        let mut docs = vec![
            doc(json!({"id": "1"})),
            doc(json!({"id": "2", "int": 5})),
        ];
        let order = parse_order_by_clause("int ASC").unwrap();
        sort_documents(&mut docs, &order).unwrap();
        assert_eq!(docs[0].get_field("id").unwrap(), &Value::String("2".into()));
        assert_eq!(docs[1].get_field("id").unwrap(), &Value::String("1".into()));
    }

    #[test]
    fn ties_are_broken_by_subsequent_terms() {
        let mut docs = vec![
            doc(json!({"id": "a", "pk": "x", "int": 1})),
            doc(json!({"id": "b", "pk": "x", "int": 1})),
        ];
        let order = parse_order_by_clause("pk ASC, id DESC").unwrap();
        sort_documents(&mut docs, &order).unwrap();
        assert_eq!(docs[0].get_field("id").unwrap(), &Value::String("b".into()));
    }
}
