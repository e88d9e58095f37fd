//! Dotted/bracket path access over `serde_json::Value`.
//!
//! Provider configs address request and response fields with small path
//! strings like `input.prompt` or `data[0].url`. Bracket segments are
//! normalized to key segments (`data[0]` == `data.0`), matching the
//! dynamic-language configs these paths come from, where array index and
//! object key lookup are indistinguishable.

use serde_json::Value;

/// Parse a path into its segments.
///
/// Splits on `.`, rewrites `[k]` to a plain segment, ignores a leading dot
/// and empty segments.
pub fn parse_path(path: &str) -> Vec<String> {
    let mut segs = Vec::new();
    let mut cur = String::new();
    for ch in path.chars() {
        match ch {
            '.' | '[' => {
                if !cur.is_empty() {
                    segs.push(std::mem::take(&mut cur));
                }
            }
            ']' => {
                if !cur.is_empty() {
                    segs.push(std::mem::take(&mut cur));
                }
            }
            _ => cur.push(ch),
        }
    }
    if !cur.is_empty() {
        segs.push(cur);
    }
    segs
}

/// Read the value at `path`, or `None` if any intermediate step is missing
/// or null. Never panics; an empty path yields `None`.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segs = parse_path(path);
    if segs.is_empty() {
        return None;
    }
    let mut cur = root;
    for seg in &segs {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(arr) => arr.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
        if cur.is_null() {
            // A null midway (or at the leaf) reads as absent.
            return None;
        }
    }
    Some(cur)
}

/// Write `value` at `path`, mutating `root` in place.
///
/// Intermediate segments that do not already hold a container are overwritten
/// with a fresh empty object; a numeric segment over an existing array indexes
/// into it (growing it with nulls when short). An empty path is a no-op.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let segs = parse_path(path);
    let Some((last, parents)) = segs.split_last() else {
        return;
    };
    let mut cur = root;
    for seg in parents {
        cur = match cur {
            Value::Array(arr) => {
                let Ok(idx) = seg.parse::<usize>() else {
                    return;
                };
                if arr.len() <= idx {
                    arr.resize(idx + 1, Value::Null);
                }
                if !arr[idx].is_object() && !arr[idx].is_array() {
                    arr[idx] = Value::Object(serde_json::Map::new());
                }
                &mut arr[idx]
            }
            _ => {
                if !cur.is_object() {
                    *cur = Value::Object(serde_json::Map::new());
                }
                let map = cur.as_object_mut().unwrap();
                let entry = map.entry(seg.clone()).or_insert(Value::Null);
                if !entry.is_object() && !entry.is_array() {
                    *entry = Value::Object(serde_json::Map::new());
                }
                entry
            }
        };
    }
    match cur {
        Value::Array(arr) => {
            if let Ok(idx) = last.parse::<usize>() {
                if arr.len() <= idx {
                    arr.resize(idx + 1, Value::Null);
                }
                arr[idx] = value;
            }
        }
        _ => {
            if !cur.is_object() {
                *cur = Value::Object(serde_json::Map::new());
            }
            cur.as_object_mut().unwrap().insert(last.clone(), value);
        }
    }
}

/// Truthiness in the sense of the configs this crate consumes: null, `false`,
/// `0`, and `""` are falsy, everything else is truthy.
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form of a value for URL substitution and status comparison.
/// Strings come through unquoted; everything else uses its JSON rendering.
pub fn display_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
