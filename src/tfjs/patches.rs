//! Rewrites that bring a current-format layers model down to the schema the
//! browser runtime loads. Every patch is idempotent.

// External imports
use log::debug;
use serde_json::{Map, Value};

// Internal imports
use super::json_visitor::{walk_mut, JsonVisitor};

/// Keys the older inference schema does not know about
pub const UNSUPPORTED_KEYS: [&str; 3] = ["ragged", "sparse", "optional"];

/// Rename a key inside the `config` of every layer of one class
#[derive(Debug, Clone)]
pub struct RenameConfigKey {
    pub class_name: String,
    pub from: String,
    pub to: String,
}

impl RenameConfigKey {
    /// `batch_shape` -> `batch_input_shape` on input layers
    pub fn input_layer_batch_shape() -> Self {
        Self {
            class_name: "InputLayer".into(),
            from: "batch_shape".into(),
            to: "batch_input_shape".into(),
        }
    }
}

impl JsonVisitor for RenameConfigKey {
    fn visit_object(&mut self, path: &str, object: &mut Map<String, Value>) -> usize {
        if object.get("class_name").and_then(Value::as_str) != Some(self.class_name.as_str()) {
            return 0;
        }
        let Some(Value::Object(config)) = object.get_mut("config") else {
            return 0;
        };
        let Some(value) = config.remove(&self.from) else {
            return 0;
        };
        // an existing target key wins
        if !config.contains_key(&self.to) {
            config.insert(self.to.clone(), value);
        }
        debug!("{}: renamed {} -> {}", path, self.from, self.to);
        1
    }
}

/// Drop the model scope from weight names such as `sequential/lstm_layer/...`
///
/// Only names whose remainder starts with a known layer name are touched, so
/// an unrelated name that happens to share the prefix is left alone.
#[derive(Debug, Clone)]
pub struct StripWeightPrefix {
    pub prefix: String,
    pub layer_names: Vec<String>,
}

impl StripWeightPrefix {
    pub fn new(scope: &str, layer_names: &[&str]) -> Self {
        Self {
            prefix: format!("{}/", scope),
            layer_names: layer_names.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn stripped<'a>(&self, name: &'a str) -> Option<&'a str> {
        let rest = name.strip_prefix(&self.prefix)?;
        self.layer_names
            .iter()
            .any(|layer| rest == layer || rest.starts_with(&format!("{}/", layer)))
            .then_some(rest)
    }
}

impl JsonVisitor for StripWeightPrefix {
    fn visit_object(&mut self, path: &str, object: &mut Map<String, Value>) -> usize {
        // weight specs are the objects carrying both a name and a shape
        if !object.contains_key("shape") {
            return 0;
        }
        let Some(name) = object.get("name").and_then(Value::as_str) else {
            return 0;
        };
        let Some(rest) = self.stripped(name).map(str::to_string) else {
            return 0;
        };
        debug!("{}: weight {} -> {}", path, name, rest);
        object.insert("name".into(), Value::String(rest));
        1
    }
}

/// Remove keys the older schema rejects, at any depth
///
/// `dtype` is only removed when it is a policy object; plain dtype strings
/// such as the ones in the weights manifest stay.
#[derive(Debug, Clone, Default)]
pub struct StripUnsupportedKeys;

impl JsonVisitor for StripUnsupportedKeys {
    fn visit_object(&mut self, path: &str, object: &mut Map<String, Value>) -> usize {
        let mut removed = 0;
        for key in UNSUPPORTED_KEYS {
            if object.remove(key).is_some() {
                removed += 1;
            }
        }
        if matches!(object.get("dtype"), Some(Value::Object(_))) {
            object.remove("dtype");
            removed += 1;
        }
        if removed > 0 {
            debug!("{}: removed {} unsupported keys", path, removed);
        }
        removed
    }
}

/// Apply the naming fixes that every converted model needs
pub fn normalize_naming(document: &mut Value, scope: &str, layer_names: &[&str]) -> usize {
    walk_mut(document, &mut RenameConfigKey::input_layer_batch_shape())
        + walk_mut(document, &mut StripWeightPrefix::new(scope, layer_names))
}

/// Strip every unsupported key from the document
pub fn strip_unsupported(document: &mut Value) -> usize {
    walk_mut(document, &mut StripUnsupportedKeys)
}
