// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Internal imports
use super::step_2_lstm_cell::{tensor_values, ForecastLstmCell};
use crate::constants::{DROPOUT, FEATURES, FORECAST_DAYS, LSTM_UNITS, WINDOW_SIZE};
use crate::error::PipelineResult;

/// Scope every exported weight name is prefixed with
pub const MODEL_SCOPE: &str = "sequential";
pub const INPUT_LAYER_NAME: &str = "input_layer";
pub const LSTM_LAYER_NAME: &str = "lstm_layer";
pub const DROPOUT_LAYER_NAME: &str = "dropout_layer";
pub const OUTPUT_LAYER_NAME: &str = "output_layer";

/// Names of the layers that own weights in the exported model
pub const LAYER_NAMES: [&str; 4] = [
    INPUT_LAYER_NAME,
    LSTM_LAYER_NAME,
    DROPOUT_LAYER_NAME,
    OUTPUT_LAYER_NAME,
];

/// LSTM -> dropout -> dense forecaster of the next `output_size` scaled closes
#[derive(Module, Debug)]
pub struct ForecastLstm<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    output_size: usize,

    lstm: ForecastLstmCell<B>,
    dropout: Dropout,
    output_layer: Linear<B>,
}

/// A named, shaped parameter tensor ready for export
#[derive(Debug, Clone, PartialEq)]
pub struct NamedWeight {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl<B: Backend> ForecastLstm<B> {
    pub fn new(config: &ForecastLstmConfig, device: &B::Device) -> Self {
        Self {
            input_size: config.input_size,
            hidden_size: config.hidden_size,
            output_size: config.output_size,
            lstm: ForecastLstmCell::new(config.input_size, config.hidden_size, device),
            dropout: DropoutConfig::new(config.dropout).init(),
            output_layer: LinearConfig::new(config.hidden_size, config.output_size).init(device),
        }
    }

    /// Forward pass `[batch, window, features]` -> `[batch, output_size]`
    ///
    /// Dropout is only active on autodiff backends, so inference through
    /// `model.valid()` or a plain backend is deterministic.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let last_hidden = self.lstm.forward(x);
        let dropped = self.dropout.forward(last_hidden);
        self.output_layer.forward(dropped)
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Every trainable parameter under its scoped layer name, in layer order
    pub fn named_weights(&self) -> PipelineResult<Vec<NamedWeight>> {
        let fused = self.lstm.fused_weights()?;
        let lstm_scope = format!("{}/{}/lstm_cell", MODEL_SCOPE, LSTM_LAYER_NAME);
        let dense_scope = format!("{}/{}", MODEL_SCOPE, OUTPUT_LAYER_NAME);

        let mut weights = vec![
            NamedWeight {
                name: format!("{}/kernel", lstm_scope),
                shape: vec![self.input_size, 4 * self.hidden_size],
                values: fused.kernel,
            },
            NamedWeight {
                name: format!("{}/recurrent_kernel", lstm_scope),
                shape: vec![self.hidden_size, 4 * self.hidden_size],
                values: fused.recurrent_kernel,
            },
            NamedWeight {
                name: format!("{}/bias", lstm_scope),
                shape: vec![4 * self.hidden_size],
                values: fused.bias,
            },
            NamedWeight {
                name: format!("{}/kernel", dense_scope),
                shape: vec![self.hidden_size, self.output_size],
                values: tensor_values(self.output_layer.weight.val())?,
            },
        ];
        if let Some(bias) = &self.output_layer.bias {
            weights.push(NamedWeight {
                name: format!("{}/bias", dense_scope),
                shape: vec![self.output_size],
                values: tensor_values(bias.val())?,
            });
        }
        Ok(weights)
    }
}

/// Architecture of a [`ForecastLstm`], persisted as `model_config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastLstmConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub dropout: f64,
    pub window_size: usize,
}

impl Default for ForecastLstmConfig {
    fn default() -> Self {
        Self::new(WINDOW_SIZE, FORECAST_DAYS)
    }
}

impl ForecastLstmConfig {
    pub fn new(window_size: usize, forecast_days: usize) -> Self {
        Self {
            input_size: FEATURES.len(),
            hidden_size: LSTM_UNITS,
            output_size: forecast_days,
            dropout: DROPOUT,
            window_size,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ForecastLstm<B> {
        ForecastLstm::new(self, device)
    }

    /// Layers-model topology in the current Keras serialization format
    ///
    /// This is what a freshly trained model describes itself as; the TF.js
    /// converter patches it down to the schema the browser runtime accepts.
    pub fn keras_topology(&self) -> Value {
        let dtype_policy = json!({
            "module": "keras",
            "class_name": "DTypePolicy",
            "config": {"name": "float32"},
            "registered_name": null
        });
        let input_shape = json!([null, self.window_size, self.input_size]);

        json!({
            "class_name": "Sequential",
            "config": {
                "name": MODEL_SCOPE,
                "trainable": true,
                "dtype": dtype_policy,
                "layers": [
                    {
                        "class_name": "InputLayer",
                        "config": {
                            "batch_shape": input_shape,
                            "dtype": "float32",
                            "sparse": false,
                            "ragged": false,
                            "name": INPUT_LAYER_NAME,
                            "optional": false
                        }
                    },
                    {
                        "class_name": "LSTM",
                        "config": {
                            "name": LSTM_LAYER_NAME,
                            "trainable": true,
                            "dtype": dtype_policy,
                            "return_sequences": false,
                            "return_state": false,
                            "go_backwards": false,
                            "stateful": false,
                            "unroll": false,
                            "units": self.hidden_size,
                            "activation": "tanh",
                            "recurrent_activation": "sigmoid",
                            "use_bias": true,
                            "unit_forget_bias": true,
                            "dropout": 0.0,
                            "recurrent_dropout": 0.0
                        }
                    },
                    {
                        "class_name": "Dropout",
                        "config": {
                            "name": DROPOUT_LAYER_NAME,
                            "trainable": true,
                            "dtype": dtype_policy,
                            "rate": self.dropout
                        }
                    },
                    {
                        "class_name": "Dense",
                        "config": {
                            "name": OUTPUT_LAYER_NAME,
                            "trainable": true,
                            "dtype": dtype_policy,
                            "units": self.output_size,
                            "activation": "linear",
                            "use_bias": true
                        }
                    }
                ],
                "build_input_shape": input_shape
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_forward_output_shape() {
        let device = NdArrayDevice::Cpu;
        let config = ForecastLstmConfig::default().with_hidden_size(16);
        let model = config.init::<NdArray>(&device);
        let x = Tensor::<NdArray, 3>::zeros([5, 7, FEATURES.len()], &device);
        assert_eq!(model.forward(x).dims(), [5, 3]);
    }

    #[test]
    fn test_named_weights_are_scoped_and_sized() {
        let device = NdArrayDevice::Cpu;
        let config = ForecastLstmConfig::default().with_hidden_size(4);
        let model = config.init::<NdArray>(&device);
        let weights = model.named_weights().unwrap();

        let names: Vec<&str> = weights.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "sequential/lstm_layer/lstm_cell/kernel",
                "sequential/lstm_layer/lstm_cell/recurrent_kernel",
                "sequential/lstm_layer/lstm_cell/bias",
                "sequential/output_layer/kernel",
                "sequential/output_layer/bias",
            ]
        );
        for weight in &weights {
            assert_eq!(weight.values.len(), weight.shape.iter().product::<usize>());
        }
    }

    #[test]
    fn test_topology_uses_current_conventions() {
        let topology = ForecastLstmConfig::default().keras_topology();
        let layers = topology["config"]["layers"].as_array().unwrap();
        assert_eq!(layers[0]["config"]["batch_shape"], json!([null, 7, 10]));
        assert_eq!(layers[1]["config"]["units"], 64);
        assert_eq!(layers[1]["config"]["dtype"]["class_name"], "DTypePolicy");
        assert_eq!(layers[3]["config"]["units"], 3);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = ForecastLstmConfig::new(7, 3).with_dropout(0.1);
        let json = serde_json::to_string(&config).unwrap();
        let back: ForecastLstmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
