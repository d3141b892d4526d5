// External imports
use serde_json::{Map, Value};

// Internal imports
use super::json_visitor::{walk, JsonInspector};
use super::patches::UNSUPPORTED_KEYS;
use crate::error::{PipelineError, PipelineResult};

pub const LAYERS_MODEL_FORMAT: &str = "layers-model";

/// Load check against the layers-model schema of the browser runtime
///
/// Structural problems are reported as `InvalidArtifact`; keys the runtime
/// would reject are reported as `SchemaMismatch` so the caller can patch and
/// retry.
pub struct InferenceSchema;

struct FirstMismatch(Option<(String, String)>);

impl FirstMismatch {
    fn found(&mut self, key: &str, path: &str) -> bool {
        self.0 = Some((key.to_string(), path.to_string()));
        false
    }
}

impl JsonInspector for FirstMismatch {
    fn inspect_object(&mut self, path: &str, object: &Map<String, Value>) -> bool {
        for key in UNSUPPORTED_KEYS {
            if object.contains_key(key) {
                return self.found(key, path);
            }
        }
        if matches!(object.get("dtype"), Some(Value::Object(_))) {
            return self.found("dtype", path);
        }
        // layer configs must use the legacy input shape key
        if object.contains_key("class_name") {
            if let Some(Value::Object(config)) = object.get("config") {
                if config.contains_key("batch_shape") {
                    return self.found("batch_shape", &format!("{}/config", path));
                }
            }
        }
        true
    }
}

impl InferenceSchema {
    pub fn load(document: &Value) -> PipelineResult<()> {
        let format = document.get("format").and_then(Value::as_str);
        if format != Some(LAYERS_MODEL_FORMAT) {
            return Err(PipelineError::InvalidArtifact(format!(
                "expected format {:?}, found {:?}",
                LAYERS_MODEL_FORMAT, format
            )));
        }
        let topology = document
            .get("modelTopology")
            .and_then(Value::as_object)
            .ok_or_else(|| PipelineError::InvalidArtifact("missing modelTopology".into()))?;
        if !topology.contains_key("class_name") && !topology.contains_key("model_config") {
            return Err(PipelineError::InvalidArtifact(
                "modelTopology has no model class".into(),
            ));
        }

        let manifest = document
            .get("weightsManifest")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::InvalidArtifact("missing weightsManifest".into()))?;
        for group in manifest {
            let has_paths = group.get("paths").map_or(false, Value::is_array);
            let has_weights = group.get("weights").map_or(false, Value::is_array);
            if !has_paths || !has_weights {
                return Err(PipelineError::InvalidArtifact(
                    "weights group needs paths and weights".into(),
                ));
            }
        }

        let mut inspector = FirstMismatch(None);
        walk(document, &mut inspector);
        match inspector.0 {
            Some((key, location)) => Err(PipelineError::SchemaMismatch { key, location }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "format": "layers-model",
            "modelTopology": {"class_name": "Sequential", "config": {"layers": [
                {"class_name": "InputLayer", "config": {"batch_input_shape": [null, 7, 10]}}
            ]}},
            "weightsManifest": [{"paths": ["group1-shard1of1.bin"], "weights": []}]
        })
    }

    #[test]
    fn test_valid_document_loads() {
        assert!(InferenceSchema::load(&valid()).is_ok());
    }

    #[test]
    fn test_unsupported_key_is_mismatch_with_location() {
        let mut doc = valid();
        doc["modelTopology"]["config"]["layers"][0]["config"]["ragged"] = json!(false);
        match InferenceSchema::load(&doc).unwrap_err() {
            PipelineError::SchemaMismatch { key, location } => {
                assert_eq!(key, "ragged");
                assert_eq!(location, "/modelTopology/config/layers/0/config");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_dtype_policy_and_batch_shape_are_mismatches() {
        let mut doc = valid();
        doc["modelTopology"]["config"]["dtype"] = json!({"class_name": "DTypePolicy"});
        assert!(InferenceSchema::load(&doc).unwrap_err().is_schema_mismatch());

        let mut doc = valid();
        doc["modelTopology"]["config"]["layers"][0]["config"] = json!({"batch_shape": [null, 7, 10]});
        assert!(InferenceSchema::load(&doc).unwrap_err().is_schema_mismatch());
    }

    #[test]
    fn test_structural_errors_are_not_mismatches() {
        let mut doc = valid();
        doc["format"] = json!("graph-model");
        let err = InferenceSchema::load(&doc).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArtifact(_)));

        let doc = json!({"format": "layers-model", "modelTopology": {"class_name": "Sequential"}});
        assert!(!InferenceSchema::load(&doc).unwrap_err().is_schema_mismatch());
    }
}
