#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use serde_json::Value;

    use crate::constants::{FEATURES, FORECAST_DAYS, LSTM_UNITS, WINDOW_SIZE};
    use crate::daily::lstm::step_3_lstm_model_arch::{ForecastLstmConfig, LAYER_NAMES, MODEL_SCOPE};
    use crate::tfjs::convert_model;
    use crate::tfjs::schema::InferenceSchema;

    type TestBackend = NdArray<f32>;

    fn converted() -> (crate::tfjs::TfjsArtifact, usize) {
        let device = Default::default();
        let config = ForecastLstmConfig::default();
        let model = config.init::<TestBackend>(&device);
        let weights = model.named_weights().unwrap();
        let floats: usize = weights.iter().map(|w| w.values.len()).sum();
        let artifact = convert_model(&config.keras_topology(), &weights, MODEL_SCOPE, &LAYER_NAMES).unwrap();
        (artifact, floats)
    }

    #[test]
    fn test_fresh_model_converts_to_loadable_artifact() {
        let (artifact, floats) = converted();
        let doc = &artifact.model_json;
        assert!(InferenceSchema::load(doc).is_ok());

        let input = &doc["modelTopology"]["config"]["layers"][0]["config"];
        assert_eq!(
            input["batch_input_shape"],
            serde_json::json!([null, WINDOW_SIZE, FEATURES.len()])
        );
        assert!(input.get("batch_shape").is_none());

        let text = serde_json::to_string(doc).unwrap();
        for key in ["\"ragged\"", "\"sparse\"", "\"optional\"", "DTypePolicy", "sequential/"] {
            assert!(!text.contains(key), "{} left in model.json", key);
        }

        // a single shard holds every float32 weight
        assert_eq!(artifact.shards.len(), 1);
        assert_eq!(artifact.shards[0].0, "group1-shard1of1.bin");
        assert_eq!(artifact.shards[0].1.len(), floats * 4);
    }

    #[test]
    fn test_manifest_names_and_shapes() {
        let (artifact, _) = converted();
        let specs = artifact.model_json["weightsManifest"][0]["weights"]
            .as_array()
            .unwrap()
            .clone();
        let names: Vec<&str> = specs.iter().filter_map(|s| s["name"].as_str()).collect();
        assert_eq!(
            names,
            vec![
                "lstm_layer/lstm_cell/kernel",
                "lstm_layer/lstm_cell/recurrent_kernel",
                "lstm_layer/lstm_cell/bias",
                "output_layer/kernel",
                "output_layer/bias",
            ]
        );

        let shape = |i: usize| -> Vec<u64> {
            specs[i]["shape"]
                .as_array()
                .unwrap()
                .iter()
                .filter_map(Value::as_u64)
                .collect()
        };
        let units = LSTM_UNITS as u64;
        assert_eq!(shape(0), vec![FEATURES.len() as u64, 4 * units]);
        assert_eq!(shape(1), vec![units, 4 * units]);
        assert_eq!(shape(2), vec![4 * units]);
        assert_eq!(shape(3), vec![units, FORECAST_DAYS as u64]);
        assert!(specs.iter().all(|s| s["dtype"] == "float32"));
    }

    #[test]
    fn test_files_end_with_model_json() {
        let (artifact, _) = converted();
        let files = artifact.files().unwrap();
        assert_eq!(files.last().map(|(n, _)| n.as_str()), Some("model.json"));
        let reparsed: Value = serde_json::from_slice(&files.last().unwrap().1).unwrap();
        assert_eq!(reparsed, artifact.model_json);
    }
}
