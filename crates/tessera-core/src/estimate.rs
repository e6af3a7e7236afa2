//! Serialized-size estimation and split predicates.
//!
//! [`estimate`] approximates the UTF-8 byte length of a value under a
//! canonical JSON encoding. When encoding fails it falls back to a recursive
//! cost model. Owned [`serde_json::Value`] trees are acyclic by construction,
//! so the traversal is inherently cycle-safe; a depth guard bounds recursion
//! on degenerate inputs.

use serde_json::Value;

/// Depth at which the fallback traversal stops descending.
const MAX_TRAVERSAL_DEPTH: usize = 512;

/// Cost returned once the traversal depth guard trips.
const LEAF_COST: usize = 4;

/// Maximum inline children before a node is split regardless of size.
const MAX_INLINE_CHILDREN: usize = 10;

/// Estimated serialized byte size of `value`.
#[must_use]
pub fn estimate(value: &Value) -> usize {
    match serde_json::to_string(value) {
        Ok(encoded) => encoded.len(),
        Err(_) => traverse(value, 0),
    }
}

/// Whether `value`'s estimated size exceeds `max` bytes.
#[must_use]
pub fn exceeds(value: &Value, max: usize) -> bool {
    estimate(value) > max
}

/// Whether a node value should be split into its own chunks.
///
/// True when the node is over budget, has more than ten children, is a
/// `PAGE`/`CANVAS`, or any of its fills is an image.
#[must_use]
pub fn should_split_node(node: &Value, max: usize) -> bool {
    if exceeds(node, max) {
        return true;
    }

    if let Some(children) = node.get("children").and_then(Value::as_array) {
        if children.len() > MAX_INLINE_CHILDREN {
            return true;
        }
    }

    if let Some(node_type) = node.get("type").and_then(Value::as_str) {
        if node_type == "PAGE" || node_type == "CANVAS" {
            return true;
        }
    }

    if let Some(fills) = node.get("fills").and_then(Value::as_array) {
        if fills
            .iter()
            .any(|fill| fill.get("type").and_then(Value::as_str) == Some("IMAGE"))
        {
            return true;
        }
    }

    false
}

fn traverse(value: &Value, depth: usize) -> usize {
    if depth > MAX_TRAVERSAL_DEPTH {
        return LEAF_COST;
    }
    match value {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(_) => 8,
        Value::String(s) => s.len() * 2,
        Value::Array(items) => {
            2 + items
                .iter()
                .map(|item| traverse(item, depth + 1) + 1)
                .sum::<usize>()
        }
        Value::Object(map) => {
            2 + map
                .iter()
                .map(|(key, val)| key.len() + 3 + traverse(val, depth + 1) + 1)
                .sum::<usize>()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_estimate_matches_json_encoding() {
        let v = json!({"a": 1, "b": [true, null, "x"]});
        assert_eq!(estimate(&v), serde_json::to_string(&v).unwrap().len());
    }

    #[test]
    fn test_estimate_scales_with_content() {
        let small = json!({"name": "a"});
        let large = json!({"name": "a".repeat(1000)});
        assert!(estimate(&large) > estimate(&small) + 900);
    }

    #[test]
    fn test_exceeds() {
        let v = json!({"payload": "x".repeat(100)});
        assert!(exceeds(&v, 50));
        assert!(!exceeds(&v, 10_000));
    }

    #[test]
    fn test_fallback_cost_model() {
        assert_eq!(traverse(&json!(null), 0), 4);
        assert_eq!(traverse(&json!(true), 0), 5);
        assert_eq!(traverse(&json!(42), 0), 8);
        assert_eq!(traverse(&json!("ab"), 0), 4);
        // [] = 2, [null] = 2 + (4 + 1)
        assert_eq!(traverse(&json!([]), 0), 2);
        assert_eq!(traverse(&json!([null]), 0), 7);
        // {"a": null} = 2 + (1 + 3 + 4 + 1)
        assert_eq!(traverse(&json!({"a": null}), 0), 11);
    }

    #[test]
    fn test_fallback_depth_guard() {
        let mut v = json!("leaf");
        for _ in 0..(MAX_TRAVERSAL_DEPTH + 10) {
            v = json!([v]);
        }
        // Must terminate rather than blow the stack
        assert!(traverse(&v, 0) > 0);
    }

    #[test]
    fn test_should_split_over_budget() {
        let node = json!({"id": "1", "type": "FRAME", "name": "x".repeat(200)});
        assert!(should_split_node(&node, 64));
        assert!(!should_split_node(&node, 10_000));
    }

    #[test]
    fn test_should_split_many_children() {
        let children: Vec<Value> = (0..11).map(|i| json!({"id": i.to_string()})).collect();
        let node = json!({"id": "1", "type": "FRAME", "children": children});
        assert!(should_split_node(&node, 1_000_000));

        let children: Vec<Value> = (0..10).map(|i| json!({"id": i.to_string()})).collect();
        let node = json!({"id": "1", "type": "FRAME", "children": children});
        assert!(!should_split_node(&node, 1_000_000));
    }

    #[test]
    fn test_should_split_page_and_canvas() {
        assert!(should_split_node(
            &json!({"id": "1", "type": "PAGE"}),
            1_000_000
        ));
        assert!(should_split_node(
            &json!({"id": "1", "type": "CANVAS"}),
            1_000_000
        ));
        assert!(!should_split_node(
            &json!({"id": "1", "type": "FRAME"}),
            1_000_000
        ));
    }

    #[test]
    fn test_should_split_image_fill() {
        let node = json!({
            "id": "1",
            "type": "RECTANGLE",
            "fills": [{"type": "SOLID"}, {"type": "IMAGE", "ref": "img-1"}]
        });
        assert!(should_split_node(&node, 1_000_000));

        let node = json!({
            "id": "1",
            "type": "RECTANGLE",
            "fills": [{"type": "SOLID"}]
        });
        assert!(!should_split_node(&node, 1_000_000));
    }
}
