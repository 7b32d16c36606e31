//! Document building: nested assignment and array aggregation.

use serde_json::{Map, Value};

use crate::error::{MappingError, MappingResult};

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Assign `value` at a dotted `path`, creating intermediate objects.
///
/// Existing objects along the path are merged into. Descending through a
/// scalar, or replacing an object with a non-object, is a conflict.
pub fn assign_nested(doc: &mut Map<String, Value>, path: &str, value: Value) -> MappingResult<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((leaf, prefix)) = parts.split_last() else {
        return Ok(());
    };

    let conflict = |depth: usize| MappingError::NestedPathConflict {
        path: path.to_string(),
        segment: parts[..=depth].join("."),
    };

    let mut current = doc;
    for (depth, part) in prefix.iter().enumerate() {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => return Err(conflict(depth)),
        };
    }

    if current.get(*leaf).is_some_and(Value::is_object) && !value.is_object() {
        return Err(conflict(prefix.len()));
    }
    current.insert(leaf.to_string(), value);
    Ok(())
}

/// Append `value` to the array stored under `target`, creating it if needed.
///
/// Array values are spliced in element by element.
pub fn append_to(doc: &mut Map<String, Value>, target: &str, value: Value) -> MappingResult<()> {
    let slot = doc
        .entry(target.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    match slot {
        Value::Array(items) => {
            match value {
                Value::Array(values) => items.extend(values),
                other => items.push(other),
            }
            Ok(())
        }
        other => Err(MappingError::InsertIntoTypeConflict {
            target: target.to_string(),
            found: describe(other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_paths_merge() {
        let mut doc = Map::new();
        assign_nested(&mut doc, "address.city", json!("Berlin")).unwrap();
        assign_nested(&mut doc, "address.zip", json!("10115")).unwrap();
        assign_nested(&mut doc, "address.geo.lat", json!("52.5")).unwrap();

        assert_eq!(
            Value::Object(doc),
            json!({ "address": { "city": "Berlin", "zip": "10115", "geo": { "lat": "52.5" } } })
        );
    }

    #[test]
    fn test_nested_through_scalar_conflicts() {
        let mut doc = Map::new();
        doc.insert("address".into(), json!("somewhere"));

        let err = assign_nested(&mut doc, "address.city", json!("Berlin")).unwrap_err();
        assert!(matches!(err, MappingError::NestedPathConflict { ref segment, .. } if segment == "address"));
    }

    #[test]
    fn test_scalar_never_replaces_object() {
        let mut doc = Map::new();
        assign_nested(&mut doc, "address.city", json!("Berlin")).unwrap();

        let err = assign_nested(&mut doc, "address", json!("flat")).unwrap_err();
        assert!(matches!(err, MappingError::NestedPathConflict { .. }));
        assert_eq!(doc["address"]["city"], "Berlin");
    }

    #[test]
    fn test_append_splices_arrays() {
        let mut doc = Map::new();
        append_to(&mut doc, "tags", json!(["a", "b"])).unwrap();
        append_to(&mut doc, "tags", json!("c")).unwrap();
        assert_eq!(doc["tags"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_append_to_scalar_conflicts() {
        let mut doc = Map::new();
        doc.insert("tags".into(), json!("solo"));

        let err = append_to(&mut doc, "tags", json!("c")).unwrap_err();
        assert!(matches!(
            err,
            MappingError::InsertIntoTypeConflict { found: "a string", .. }
        ));
    }
}
