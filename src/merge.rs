//! Deep merge of document bodies.
//!
//! Bodies are merged left to right: on a key collision the later body wins.
//! Nested mappings merge recursively, anything else is replaced outright.

use serde_json::{Map, Value};

/// Merge `overlay` into `base` in place.
pub fn merge_into(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Merge an ordered sequence of bodies into one mapping.
pub fn deep_merge<'a, I>(bodies: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut merged = Value::Object(Map::new());
    for body in bodies {
        merge_into(&mut merged, body);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_body_overrides_earlier() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 3, "z": 4});
        assert_eq!(deep_merge([&a, &b]), json!({"x": 1, "y": 3, "z": 4}));
    }

    #[test]
    fn nested_mappings_merge_recursively() {
        let a = json!({"data": {"x": 1, "y": 2}, "uid": "a"});
        let b = json!({"data": {"y": 5, "w": 6}, "uid": "b"});
        assert_eq!(
            deep_merge([&a, &b]),
            json!({"data": {"x": 1, "y": 5, "w": 6}, "uid": "b"})
        );
    }

    #[test]
    fn non_mapping_values_are_replaced() {
        let a = json!({"data": {"x": 1}, "shape": [1, 2, 3]});
        let b = json!({"data": 7, "shape": [4]});
        assert_eq!(deep_merge([&a, &b]), json!({"data": 7, "shape": [4]}));

        let c = json!({"data": {"y": 1}});
        assert_eq!(deep_merge([&b, &c]), json!({"data": {"y": 1}, "shape": [4]}));
    }

    #[test]
    fn empty_sequence_is_empty_mapping() {
        assert_eq!(deep_merge(std::iter::empty()), json!({}));
    }
}
