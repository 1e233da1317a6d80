use serde_json::Value;

/// Nesting levels searched before giving up. The OCR response is a parsed
/// JSON document, so it is acyclic, but a malformed reply must not be able
/// to exhaust the stack.
const MAX_DEPTH: usize = 64;

/// Depth-first search for the first value stored under `target_key`.
///
/// Object entries are visited in their natural iteration order and the first
/// match wins; nested objects and arrays are descended into only when the
/// key is not found at the current level. Returns `None` when the key is
/// absent anywhere in the tree (or buried deeper than `MAX_DEPTH`).
pub fn find_key<'a>(value: &'a Value, target_key: &str) -> Option<&'a Value> {
    find_key_bounded(value, target_key, MAX_DEPTH)
}

fn find_key_bounded<'a>(value: &'a Value, target_key: &str, depth: usize) -> Option<&'a Value> {
    if depth == 0 {
        return None;
    }
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if key == target_key {
                    return Some(nested);
                }
                if nested.is_object() || nested.is_array() {
                    if let Some(found) = find_key_bounded(nested, target_key, depth - 1) {
                        return Some(found);
                    }
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| find_key_bounded(item, target_key, depth - 1)),
        _ => None,
    }
}
