// External imports
use log::{info, warn};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

// Internal imports
use super::patches::{normalize_naming, strip_unsupported};
use super::schema::{InferenceSchema, LAYERS_MODEL_FORMAT};
use crate::built_info;
use crate::constants::{TFJS_MODEL_FILE, TFJS_SHARD_SIZE_BYTES};
use crate::daily::lstm::step_3_lstm_model_arch::NamedWeight;
use crate::error::{PipelineError, PipelineResult};

const KERAS_VERSION: &str = "3.3.3";

/// A converted model: the `model.json` document plus its binary weight shards
#[derive(Debug, Clone, PartialEq)]
pub struct TfjsArtifact {
    pub model_json: Value,
    pub shards: Vec<(String, Vec<u8>)>,
}

impl TfjsArtifact {
    /// Every file of the artifact, shards first so `model.json` never
    /// references a shard that is not there yet
    pub fn files(&self) -> PipelineResult<Vec<(String, Vec<u8>)>> {
        let mut files = self.shards.clone();
        files.push((
            TFJS_MODEL_FILE.to_string(),
            serde_json::to_vec(&self.model_json)?,
        ));
        Ok(files)
    }

    /// Replace the contents of `dir` with this artifact
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> PipelineResult<()> {
        let dir = dir.as_ref();
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        for (name, bytes) in self.files()? {
            fs::write(dir.join(name), bytes)?;
        }
        Ok(())
    }
}

pub fn shard_name(index: usize, count: usize) -> String {
    format!("group1-shard{}of{}.bin", index + 1, count)
}

/// Split little-endian `float32` weight bytes into fixed-size shards
pub fn shard_weights(weights: &[NamedWeight], shard_size: usize) -> Vec<(String, Vec<u8>)> {
    let bytes: Vec<u8> = weights
        .iter()
        .flat_map(|w| w.values.iter().flat_map(|v| v.to_le_bytes()))
        .collect();
    let chunks: Vec<&[u8]> = bytes.chunks(shard_size.max(1)).collect();
    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| (shard_name(i, count), chunk.to_vec()))
        .collect()
}

fn build_document(topology: &Value, weights: &[NamedWeight], shard_names: &[String]) -> Value {
    let mut model_topology = topology.clone();
    if let Some(object) = model_topology.as_object_mut() {
        object.insert("keras_version".into(), json!(KERAS_VERSION));
        object.insert("backend".into(), json!("tensorflow"));
    }
    let specs: Vec<Value> = weights
        .iter()
        .map(|w| json!({"name": w.name, "shape": w.shape, "dtype": "float32"}))
        .collect();

    json!({
        "format": LAYERS_MODEL_FORMAT,
        "generatedBy": format!("keras v{}", KERAS_VERSION),
        "convertedBy": format!("{} v{}", built_info::PKG_NAME, built_info::PKG_VERSION),
        "modelTopology": model_topology,
        "weightsManifest": [{"paths": shard_names, "weights": specs}]
    })
}

/// Normalize names, then load-check; on a schema mismatch strip unsupported
/// keys and check exactly once more
pub fn patch_document(document: &mut Value, scope: &str, layer_names: &[&str]) -> PipelineResult<()> {
    normalize_naming(document, scope, layer_names);
    match InferenceSchema::load(document) {
        Ok(()) => Ok(()),
        Err(PipelineError::SchemaMismatch { key, location }) => {
            warn!(
                "Schema mismatch on `{}` at {}, stripping unsupported keys and retrying",
                key, location
            );
            let removed = strip_unsupported(document);
            info!("Removed {} unsupported keys", removed);
            InferenceSchema::load(document)
        }
        Err(e) => Err(e),
    }
}

/// Convert a trained model's topology and weights into a browser-loadable artifact
pub fn convert_model(
    topology: &Value,
    weights: &[NamedWeight],
    scope: &str,
    layer_names: &[&str],
) -> PipelineResult<TfjsArtifact> {
    for weight in weights {
        let expected: usize = weight.shape.iter().product();
        if expected != weight.values.len() {
            return Err(PipelineError::InvalidArtifact(format!(
                "weight {} has {} values for shape {:?}",
                weight.name,
                weight.values.len(),
                weight.shape
            )));
        }
    }

    let shards = shard_weights(weights, TFJS_SHARD_SIZE_BYTES);
    let shard_names: Vec<String> = shards.iter().map(|(name, _)| name.clone()).collect();
    let mut model_json = build_document(topology, weights, &shard_names);
    patch_document(&mut model_json, scope, layer_names)?;

    Ok(TfjsArtifact { model_json, shards })
}
