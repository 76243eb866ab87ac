//! Nested JSON → single-level row transform
//!
//! Objects recurse with dot-joined paths. Arrays never expand into rows here;
//! they collapse into one `", "`-joined text cell. Date wrappers such as
//! `{"$date": "2024-05-01T09:00:00Z"}` are leaves, not nested objects.

use crate::domain::flat_row::{FlatRow, FlatValue};
use serde_json::{Map, Value};

pub const ARRAY_DELIMITER: &str = ", ";
pub const PATH_SEPARATOR: &str = ".";

const DATE_WRAPPER_KEYS: [&str; 2] = ["$date", "$datetime"];

/// Flatten `value` under `prefix` (empty prefix means top-level keys are
/// used as-is).
pub fn flatten(value: &Value, prefix: &str) -> FlatRow {
    let mut row = FlatRow::new();
    flatten_into(value, prefix, &mut row);
    row
}

pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{key}")
    }
}

fn flatten_into(value: &Value, prefix: &str, row: &mut FlatRow) {
    match value {
        Value::Object(map) if date_wrapper(map).is_none() => {
            for (key, child) in map {
                flatten_into(child, &join_path(prefix, key), row);
            }
        }
        leaf => {
            // A bare scalar only has somewhere to go when it has a name.
            if !prefix.is_empty() {
                row.insert(prefix, leaf_value(leaf));
            }
        }
    }
}

fn date_wrapper(map: &Map<String, Value>) -> Option<&Value> {
    if map.len() != 1 {
        return None;
    }
    DATE_WRAPPER_KEYS.iter().find_map(|key| map.get(*key))
}

fn leaf_value(value: &Value) -> FlatValue {
    match value {
        Value::Array(items) => FlatValue::Text(join_array(items)),
        Value::Object(map) => match date_wrapper(map) {
            Some(inner) => FlatValue::Text(render_element(inner)),
            None => FlatValue::Text(value.to_string()),
        },
        scalar => FlatValue::from_json(scalar),
    }
}

fn join_array(items: &[Value]) -> String {
    items
        .iter()
        .map(render_element)
        .collect::<Vec<_>>()
        .join(ARRAY_DELIMITER)
}

fn render_element(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => join_array(items),
        Value::Object(map) => match date_wrapper(map) {
            Some(inner) => render_element(inner),
            None => value.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, FlatValue)]) -> FlatRow {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_nested_objects_use_dot_paths() {
        let flat = flatten(&json!({"a": {"b": 1, "c": 2}}), "");
        assert_eq!(flat, row(&[("a.b", 1_i64.into()), ("a.c", 2_i64.into())]));
    }

    #[test]
    fn test_deep_nesting_with_prefix() {
        let flat = flatten(&json!({"info": {"training": {"title": "Rust 101"}}}), "session");
        assert_eq!(
            flat.get("session.info.training.title"),
            Some(&FlatValue::text("Rust 101"))
        );
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn test_arrays_join_into_single_cell() {
        let flat = flatten(&json!({"tags": ["x", "y"]}), "");
        assert_eq!(flat, row(&[("tags", FlatValue::text("x, y"))]));
    }

    #[test]
    fn test_array_of_objects_renders_compact_json() {
        let flat = flatten(&json!({"links": [{"rel": "self"}, 3, null, true]}), "");
        assert_eq!(
            flat.get("links"),
            Some(&FlatValue::text(r#"{"rel":"self"}, 3, , true"#))
        );
    }

    #[test]
    fn test_date_wrapper_is_a_leaf() {
        let value = json!({"startDate": {"$date": "2024-05-01T09:00:00Z"}});
        let flat = flatten(&value, "session");
        assert_eq!(
            flat.get("session.startDate"),
            Some(&FlatValue::text("2024-05-01T09:00:00Z"))
        );
    }

    #[test]
    fn test_scalars_and_null() {
        let flat = flatten(&json!({"n": 1.5, "ok": false, "none": null, "s": "t"}), "");
        assert_eq!(flat.get("ok"), Some(&FlatValue::Bool(false)));
        assert_eq!(flat.get("none"), Some(&FlatValue::Empty));
        assert_eq!(flat.get("s"), Some(&FlatValue::text("t")));
        assert_eq!(flat.get("n").map(ToString::to_string), Some("1.5".to_string()));
    }

    #[test]
    fn test_top_level_scalar_needs_prefix() {
        assert!(flatten(&json!("orphan"), "").is_empty());
        assert_eq!(
            flatten(&json!("named"), "note").get("note"),
            Some(&FlatValue::text("named"))
        );
    }

    proptest! {
        #[test]
        fn prop_flattening_flat_mapping_is_identity(
            fields in prop::collection::btree_map(
                "[a-z]{1,6}(\\.[a-z]{1,6}){0,2}",
                prop_oneof![
                    any::<i64>().prop_map(FlatValue::from),
                    any::<bool>().prop_map(FlatValue::from),
                    "[a-zA-Z0-9 ]{0,12}".prop_map(FlatValue::from),
                    Just(FlatValue::Empty),
                ],
                0..8,
            )
        ) {
            let expected: FlatRow = fields.clone().into_iter().collect();
            let input = expected.to_json();
            prop_assert_eq!(flatten(&input, ""), expected);
        }

        #[test]
        fn prop_flatten_is_deterministic(depth in 1usize..6, leaf in any::<i64>()) {
            let mut value = json!(leaf);
            let mut path = Vec::new();
            for level in 0..depth {
                let key = format!("k{level}");
                path.push(key.clone());
                let mut map = serde_json::Map::new();
                map.insert(key, value);
                value = Value::Object(map);
            }
            path.reverse();
            let expected: BTreeMap<String, FlatValue> =
                [(path.join("."), FlatValue::from(leaf))].into_iter().collect();
            let flat = flatten(&value, "");
            prop_assert_eq!(flat.clone(), expected.into_iter().collect::<FlatRow>());
            prop_assert_eq!(flatten(&value, ""), flat);
        }
    }
}
