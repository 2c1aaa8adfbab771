//! Dot-notation lookups into JSON values.

use serde_json::Value;

/// Resolve a dot-notation path (e.g. `"order.items.0.sku"`) against `root`.
///
/// Object segments are looked up by key; numeric segments index into
/// arrays. Returns `None` when any segment is missing. An empty path
/// resolves to `root` itself.
pub fn resolve_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
