//! Dotted-path accessor
//!
//! `obj.nobj.nnstr`, `arrstr[3]`, `arrstr[-]` (append sentinel), and
//! `$pk`/`$id`/`$etag` (system-field namespace, `$` stripped on lookup).

use super::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A field name. `dollar` records whether the source text carried a
    /// leading `$` (system-field namespace); lookups always strip it.
    Field { name: String, dollar: bool },
    /// A concrete array index.
    Index(usize),
    /// The `-` append sentinel (valid only as the final segment of a set).
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path(pub Vec<PathSegment>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("malformed path segment: {0}")]
    Malformed(String),
    #[error("path traverses a non-container at segment {0}")]
    NotAContainer(usize),
    #[error("append sentinel only valid as the final segment")]
    AppendNotFinal,
}

pub type PathResult<T> = Result<T, PathError>;

impl Path {
    /// Parses a dotted path string, e.g. `"obj.narr[-]"` or `"$pk"`.
    pub fn parse(s: &str) -> PathResult<Self> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = Vec::new();
        for (i, raw) in s.split('.').enumerate() {
            if raw.is_empty() {
                return Err(PathError::Malformed(s.to_string()));
            }
            let (name_part, index_part) = split_index(raw)?;
            let dollar = name_part.starts_with('$');
            let name = if dollar {
                name_part[1..].to_string()
            } else {
                name_part.to_string()
            };
            if !name.is_empty() {
                segments.push(PathSegment::Field { name, dollar });
            }
            if let Some(idx) = index_part {
                segments.push(idx);
            }
            let _ = i;
        }
        if segments.is_empty() {
            return Err(PathError::Malformed(s.to_string()));
        }
        Ok(Path(segments))
    }

    pub fn single_field(name: impl Into<String>) -> Self {
        Path(vec![PathSegment::Field {
            name: name.into(),
            dollar: false,
        }])
    }

    /// Returns the path rendered as statement-language text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                PathSegment::Field { name, dollar } => {
                    if i > 0 {
                        out.push('.');
                    }
                    if *dollar {
                        out.push('$');
                    }
                    out.push_str(name);
                }
                PathSegment::Index(n) => out.push_str(&format!("[{}]", n)),
                PathSegment::Append => out.push_str("[-]"),
            }
        }
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Splits `"arrstr[3]"` into (`"arrstr"`, `Some(Index(3))`), `"arrstr[-]"`
/// into (`"arrstr"`, `Some(Append)`), and `"foo"` into (`"foo"`, `None`).
fn split_index(raw: &str) -> PathResult<(&str, Option<PathSegment>)> {
    if let Some(open) = raw.find('[') {
        if !raw.ends_with(']') {
            return Err(PathError::Malformed(raw.to_string()));
        }
        let name = &raw[..open];
        let inner = &raw[open + 1..raw.len() - 1];
        let seg = if inner == "-" {
            PathSegment::Append
        } else {
            let n: usize = inner
                .parse()
                .map_err(|_| PathError::Malformed(raw.to_string()))?;
            PathSegment::Index(n)
        };
        Ok((name, Some(seg)))
    } else {
        Ok((raw, None))
    }
}

/// Returns the value at `path`, or `None` if any segment is absent
/// (`not_defined`).
pub fn get<'a>(value: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = value;
    for seg in &path.0 {
        current = match (seg, current) {
            (PathSegment::Field { name, .. }, Value::Object(map)) => map.get(name)?,
            (PathSegment::Index(i), Value::Array(arr)) => arr.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Creates intermediate maps/arrays as needed and sets the leaf value.
/// Fails if an intermediate segment addresses a non-container.
pub fn set(value: &mut Value, path: &Path, new_value: Value) -> PathResult<()> {
    set_at(value, &path.0, new_value, 0)
}

fn set_at(value: &mut Value, segs: &[PathSegment], new_value: Value, depth: usize) -> PathResult<()> {
    let (seg, rest) = match segs.split_first() {
        Some(x) => x,
        None => {
            *value = new_value;
            return Ok(());
        }
    };
    match seg {
        PathSegment::Field { name, .. } => {
            if matches!(value, Value::Null) {
                *value = Value::object();
            }
            let map = value.as_object_mut().ok_or(PathError::NotAContainer(depth))?;
            if rest.is_empty() {
                map.insert(name.clone(), new_value);
                return Ok(());
            }
            let entry = map.entry(name.clone()).or_insert(Value::Null);
            set_at(entry, rest, new_value, depth + 1)
        }
        PathSegment::Index(i) => {
            if matches!(value, Value::Null) {
                *value = Value::Array(Vec::new());
            }
            let arr = value.as_array_mut().ok_or(PathError::NotAContainer(depth))?;
            while arr.len() <= *i {
                arr.push(Value::Null);
            }
            if rest.is_empty() {
                arr[*i] = new_value;
                return Ok(());
            }
            set_at(&mut arr[*i], rest, new_value, depth + 1)
        }
        PathSegment::Append => {
            if matches!(value, Value::Null) {
                *value = Value::Array(Vec::new());
            }
            let arr = value.as_array_mut().ok_or(PathError::NotAContainer(depth))?;
            if !rest.is_empty() {
                return Err(PathError::AppendNotFinal);
            }
            arr.push(new_value);
            Ok(())
        }
    }
}

/// Like `set`, but only applies when the leaf is absent; for an array
/// `[k]` index it splice-inserts at `k` rather than overwriting, and `[-]`
/// appends.
pub fn insert(value: &mut Value, path: &Path, new_value: Value) -> PathResult<()> {
    insert_at(value, &path.0, new_value, 0)
}

fn insert_at(value: &mut Value, segs: &[PathSegment], new_value: Value, depth: usize) -> PathResult<()> {
    let (seg, rest) = match segs.split_first() {
        Some(x) => x,
        None => return Ok(()), // nothing to do at zero-length path
    };
    match seg {
        PathSegment::Field { name, .. } => {
            if matches!(value, Value::Null) {
                *value = Value::object();
            }
            let map = value.as_object_mut().ok_or(PathError::NotAContainer(depth))?;
            if rest.is_empty() {
                if !map.contains_key(name) {
                    map.insert(name.clone(), new_value);
                }
                return Ok(());
            }
            let entry = map.entry(name.clone()).or_insert(Value::Null);
            insert_at(entry, rest, new_value, depth + 1)
        }
        PathSegment::Index(i) => {
            if matches!(value, Value::Null) {
                *value = Value::Array(Vec::new());
            }
            let arr = value.as_array_mut().ok_or(PathError::NotAContainer(depth))?;
            if rest.is_empty() {
                let idx = (*i).min(arr.len());
                arr.insert(idx, new_value);
                return Ok(());
            }
            while arr.len() <= *i {
                arr.push(Value::Null);
            }
            insert_at(&mut arr[*i], rest, new_value, depth + 1)
        }
        PathSegment::Append => {
            if matches!(value, Value::Null) {
                *value = Value::Array(Vec::new());
            }
            let arr = value.as_array_mut().ok_or(PathError::NotAContainer(depth))?;
            if !rest.is_empty() {
                return Err(PathError::AppendNotFinal);
            }
            arr.push(new_value);
            Ok(())
        }
    }
}

/// Removes the leaf; for array elements, removes and shifts.
pub fn delete(value: &mut Value, path: &Path) -> PathResult<()> {
    delete_at(value, &path.0)
}

fn delete_at(value: &mut Value, segs: &[PathSegment]) -> PathResult<()> {
    if segs.is_empty() {
        return Ok(());
    }
    if segs.len() == 1 {
        match (&segs[0], value) {
            (PathSegment::Field { name, .. }, Value::Object(map)) => {
                map.shift_remove(name);
            }
            (PathSegment::Index(i), Value::Array(arr)) => {
                if *i < arr.len() {
                    arr.remove(*i);
                }
            }
            _ => {}
        }
        return Ok(());
    }
    let (seg, rest) = segs.split_first().unwrap();
    match (seg, value) {
        (PathSegment::Field { name, .. }, Value::Object(map)) => {
            if let Some(v) = map.get_mut(name) {
                delete_at(v, rest)?;
            }
        }
        (PathSegment::Index(i), Value::Array(arr)) => {
            if let Some(v) = arr.get_mut(*i) {
                delete_at(v, rest)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Deletes from `from` and sets at `to`, atomically from the caller's
/// perspective (both mutations happen against the same in-memory value
/// before the containing operation commits).
pub fn mov(value: &mut Value, from: &Path, to: &Path) -> PathResult<()> {
    let taken = get(value, from).cloned().unwrap_or(Value::Null);
    delete(value, from)?;
    set(value, to, taken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        j.into()
    }

    #[test]
    fn parse_field_path() {
        let p = Path::parse("obj.nobj.nnstr").unwrap();
        assert_eq!(p.0.len(), 3);
    }

    #[test]
    fn parse_index_path() {
        let p = Path::parse("arrstr[3]").unwrap();
        assert_eq!(p.0, vec![
            PathSegment::Field { name: "arrstr".into(), dollar: false },
            PathSegment::Index(3),
        ]);
    }

    #[test]
    fn parse_append_sentinel() {
        let p = Path::parse("arrstr[-]").unwrap();
        assert_eq!(p.0[1], PathSegment::Append);
    }

    #[test]
    fn parse_dollar_prefixed() {
        let p = Path::parse("$pk").unwrap();
        assert_eq!(p.0[0], PathSegment::Field { name: "pk".into(), dollar: true });
    }

    #[test]
    fn get_nested_field() {
        let val = v(json!({"obj": {"nstr": "hi"}}));
        let p = Path::parse("obj.nstr").unwrap();
        assert_eq!(get(&val, &p), Some(&Value::String("hi".into())));
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut val = Value::object();
        let p = Path::parse("obj.nested.leaf").unwrap();
        set(&mut val, &p, Value::Int(1)).unwrap();
        assert_eq!(get(&val, &p), Some(&Value::Int(1)));
    }

    #[test]
    fn insert_splice_at_index() {
        let mut val = v(json!({"arr": [1, 2, 3]}));
        let p = Path::parse("arr[1]").unwrap();
        insert(&mut val, &p, Value::Int(99)).unwrap();
        assert_eq!(val.get_field("arr").unwrap().as_array().unwrap().len(), 4);
        assert_eq!(get(&val, &Path::parse("arr[1]").unwrap()), Some(&Value::Int(99)));
    }

    #[test]
    fn insert_append_sentinel() {
        let mut val = v(json!({"arr": [1, 2]}));
        let p = Path::parse("arr[-]").unwrap();
        insert(&mut val, &p, Value::Int(3)).unwrap();
        assert_eq!(val.get_field("arr").unwrap().as_array().unwrap().len(), 3);
    }

    #[test]
    fn delete_array_element_shifts() {
        let mut val = v(json!({"arr": [1, 2, 3]}));
        let p = Path::parse("arr[0]").unwrap();
        delete(&mut val, &p).unwrap();
        assert_eq!(val.get_field("arr").unwrap().as_array().unwrap(), &[Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn move_deletes_source_and_sets_dest() {
        let mut val = v(json!({"from": "x"}));
        mov(&mut val, &Path::parse("from").unwrap(), &Path::parse("to").unwrap()).unwrap();
        assert_eq!(get(&val, &Path::parse("to").unwrap()), Some(&Value::String("x".into())));
        assert_eq!(get(&val, &Path::parse("from").unwrap()), None);
    }
}
