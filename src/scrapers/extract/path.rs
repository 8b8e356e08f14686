//! Resolve a sequence of keys against a decoded JSON tree.

use serde_json::Value;

/// Take one step from `node` along `key`.
///
/// Objects are indexed by name and arrays by a numeric key. A non-numeric
/// key against an array looks the key up in the array's first element, so
/// `["offers", "price"]` reaches into `"offers": [{"price": ...}]`.
pub fn step<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => match key.parse::<usize>() {
            Ok(index) => items.get(index),
            Err(_) => items.first().and_then(|first| first.as_object()?.get(key)),
        },
        _ => None,
    }
}

/// Follow every key in `path`; `None` as soon as a step fails.
pub fn resolve<'a, K: AsRef<str>>(node: &'a Value, path: &[K]) -> Option<&'a Value> {
    path.iter()
        .try_fold(node, |current, key| step(current, key.as_ref()))
}
