//! Depth-first traversal of a `serde_json::Value` document.
//!
//! Patches implement [`JsonVisitor`] and only see objects; the walker handles
//! recursion through arrays and nested objects. `path` is a slash-separated
//! location used in log and error messages.

use serde_json::{Map, Value};

/// Mutating visitor over every object in a JSON tree
pub trait JsonVisitor {
    /// Called for each object before its children are visited.
    /// Returns the number of changes made.
    fn visit_object(&mut self, path: &str, object: &mut Map<String, Value>) -> usize;
}

/// Read-only visitor, used to inspect a document without changing it
pub trait JsonInspector {
    /// Stop the walk early by returning `false`
    fn inspect_object(&mut self, path: &str, object: &Map<String, Value>) -> bool;
}

/// Apply `visitor` to every object in `value`, returning the total change count
pub fn walk_mut<V: JsonVisitor + ?Sized>(value: &mut Value, visitor: &mut V) -> usize {
    walk_mut_at(value, "", visitor)
}

fn walk_mut_at<V: JsonVisitor + ?Sized>(value: &mut Value, path: &str, visitor: &mut V) -> usize {
    match value {
        Value::Object(object) => {
            let mut changes = visitor.visit_object(path, object);
            for (key, child) in object.iter_mut() {
                changes += walk_mut_at(child, &format!("{}/{}", path, key), visitor);
            }
            changes
        }
        Value::Array(items) => items
            .iter_mut()
            .enumerate()
            .map(|(i, child)| walk_mut_at(child, &format!("{}/{}", path, i), visitor))
            .sum(),
        _ => 0,
    }
}

/// Visit every object in `value` until the inspector asks to stop
pub fn walk<I: JsonInspector + ?Sized>(value: &Value, inspector: &mut I) {
    walk_at(value, "", inspector);
}

fn walk_at<I: JsonInspector + ?Sized>(value: &Value, path: &str, inspector: &mut I) -> bool {
    match value {
        Value::Object(object) => {
            if !inspector.inspect_object(path, object) {
                return false;
            }
            object
                .iter()
                .all(|(key, child)| walk_at(child, &format!("{}/{}", path, key), inspector))
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .all(|(i, child)| walk_at(child, &format!("{}/{}", path, i), inspector)),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct CountObjects(usize);

    impl JsonInspector for CountObjects {
        fn inspect_object(&mut self, _path: &str, _object: &Map<String, Value>) -> bool {
            self.0 += 1;
            true
        }
    }

    struct DropKey(&'static str);

    impl JsonVisitor for DropKey {
        fn visit_object(&mut self, _path: &str, object: &mut Map<String, Value>) -> usize {
            usize::from(object.remove(self.0).is_some())
        }
    }

    struct FirstPathWith(&'static str, Option<String>);

    impl JsonInspector for FirstPathWith {
        fn inspect_object(&mut self, path: &str, object: &Map<String, Value>) -> bool {
            if object.contains_key(self.0) {
                self.1 = Some(path.to_string());
                return false;
            }
            true
        }
    }

    #[test]
    fn test_walk_reaches_objects_inside_arrays() {
        let doc = json!({"a": [{"b": 1}, [{"c": {"d": 2}}]], "e": "x"});
        let mut counter = CountObjects(0);
        walk(&doc, &mut counter);
        assert_eq!(counter.0, 4);
    }

    #[test]
    fn test_walk_mut_counts_changes_at_every_depth() {
        let mut doc = json!({"x": 1, "list": [{"x": 2}, {"y": {"x": 3}}]});
        assert_eq!(walk_mut(&mut doc, &mut DropKey("x")), 3);
        assert_eq!(doc, json!({"list": [{}, {"y": {}}]}));
        assert_eq!(walk_mut(&mut doc, &mut DropKey("x")), 0);
    }

    #[test]
    fn test_inspector_reports_path_and_stops() {
        let doc = json!({"layers": [{"config": {}}, {"config": {"ragged": false}}]});
        let mut finder = FirstPathWith("ragged", None);
        walk(&doc, &mut finder);
        assert_eq!(finder.1.as_deref(), Some("/layers/1/config"));
    }
}
