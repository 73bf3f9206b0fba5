//! Dot-notation access over `serde_json::Value` trees.
//!
//! These helpers hold the merge-vs-replace rule used by the envelope: only
//! JSON objects are ever merged, everything else is replaced outright.

use serde_json::{Map, Value};

/// Split a dot path into segments. The empty path addresses the root.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Get the value at a dot path, e.g. `"task.stored_data.foo"`.
///
/// Numeric segments index into arrays.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;

    for part in segments(path) {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Write `value` at a dot path, creating intermediate objects as needed.
///
/// Intermediate values that are not objects are replaced by empty objects.
/// Writing the empty path replaces the root.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for part in parents {
        current = ensure_object(current)
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    ensure_object(current).insert(last.to_string(), value);
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// A value is mergeable iff it is a JSON object. Null, arrays and scalars
/// are always replaced.
pub fn is_mergeable(value: &Value) -> bool {
    value.is_object()
}

/// Shallow merge of two objects; keys from `overlay` win.
///
/// If either side is not an object, `overlay` is returned unchanged.
pub fn shallow_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path_nested() {
        let value = json!({"task": {"command": "memorize@x.domain", "tags": ["a", "b"]}});

        assert_eq!(get_path(&value, "task.command"), Some(&json!("memorize@x.domain")));
        assert_eq!(get_path(&value, "task.tags.1"), Some(&json!("b")));
        assert_eq!(get_path(&value, ""), Some(&value));
        assert!(get_path(&value, "task.missing").is_none());
        assert!(get_path(&value, "task.command.deeper").is_none());
        assert!(get_path(&value, "task.tags.9").is_none());
    }

    #[test]
    fn test_get_path_distinguishes_falsy_from_missing() {
        let value = json!({"a": 0, "b": "", "c": false, "d": null});

        assert_eq!(get_path(&value, "a"), Some(&json!(0)));
        assert_eq!(get_path(&value, "b"), Some(&json!("")));
        assert_eq!(get_path(&value, "c"), Some(&json!(false)));
        assert_eq!(get_path(&value, "d"), Some(&Value::Null));
        assert!(get_path(&value, "e").is_none());
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut value = json!({"version": "1"});
        set_path(&mut value, "task.stored_data.foo", json!("bar"));

        assert_eq!(value, json!({"version": "1", "task": {"stored_data": {"foo": "bar"}}}));
    }

    #[test]
    fn test_set_path_replaces_scalar_intermediate() {
        let mut value = json!({"task": 5});
        set_path(&mut value, "task.completed", json!(true));

        assert_eq!(value, json!({"task": {"completed": true}}));
    }

    #[test]
    fn test_set_empty_path_replaces_root() {
        let mut value = json!({"a": 1});
        set_path(&mut value, "", json!({"b": 2}));

        assert_eq!(value, json!({"b": 2}));
    }

    #[test]
    fn test_is_mergeable() {
        assert!(is_mergeable(&json!({})));
        assert!(is_mergeable(&json!({"a": 1})));
        assert!(!is_mergeable(&json!([1, 2])));
        assert!(!is_mergeable(&Value::Null));
        assert!(!is_mergeable(&json!("text")));
        assert!(!is_mergeable(&json!(0)));
    }

    #[test]
    fn test_shallow_merge_overlay_wins() {
        let merged = shallow_merge(&json!({"a": 1, "b": {"x": 1}}), &json!({"b": {"y": 2}, "c": 3}));

        // Nested objects are replaced, not merged recursively.
        assert_eq!(merged, json!({"a": 1, "b": {"y": 2}, "c": 3}));
    }

    #[test]
    fn test_shallow_merge_non_objects() {
        assert_eq!(shallow_merge(&json!([1]), &json!([2])), json!([2]));
        assert_eq!(shallow_merge(&json!({"a": 1}), &json!("x")), json!("x"));
    }
}
