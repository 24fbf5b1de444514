//! SELECT projection: produces a sparse document containing only
//! the requested paths, or the whole document for `SELECT *`.

use crate::core::error::{StoreError, StoreResult};
use crate::ql::Select;
use crate::value::{self, Value};

pub fn apply_select(doc: &Value, select: &Select) -> StoreResult<Value> {
    match select {
        Select::All => Ok(doc.clone()),
        Select::Fields(paths) => {
            let mut projected = Value::object();
            for path in paths {
                if let Some(v) = value::get(doc, path) {
                    value::set(&mut projected, path, v.clone())?;
                }
            }
            Ok(projected)
        }
        Select::Param(name) => Err(StoreError::internal(format!(
            "unbound SELECT parameter @{} reached the evaluator",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Path;
    use serde_json::json;

    #[test]
    fn select_all_returns_whole_document() {
        let doc: Value = json!({"a": 1, "b": 2}).into();
        assert_eq!(apply_select(&doc, &Select::All).unwrap(), doc);
    }

    #[test]
    fn select_fields_returns_sparse_document() {
        let doc: Value = json!({"a": 1, "b": {"c": 2, "d": 3}}).into();
        let select = Select::Fields(vec![Path::parse("b.c").unwrap()]);
        let projected = apply_select(&doc, &select).unwrap();
        assert_eq!(projected.get_field("a"), None);
        assert_eq!(projected.get_field("b").unwrap().get_field("c"), Some(&Value::Int(2)));
        assert_eq!(projected.get_field("b").unwrap().get_field("d"), None);
    }

    #[test]
    fn select_fields_skips_undefined_paths() {
        let doc: Value = json!({"a": 1}).into();
        let select = Select::Fields(vec![Path::parse("missing").unwrap()]);
        let projected = apply_select(&doc, &select).unwrap();
        assert_eq!(projected.get_field("missing"), None);
    }
}
