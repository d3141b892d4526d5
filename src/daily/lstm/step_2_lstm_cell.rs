// External imports
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};

// Internal imports
use crate::error::{PipelineError, PipelineResult};

/// Single-layer LSTM returning the hidden state after the last time step
///
/// Input projections carry the gate biases; recurrent projections are bias
/// free so the parameters map one-to-one onto a fused `kernel`,
/// `recurrent_kernel` and `bias` in gate order input, forget, cell, output.
/// Gate biases start at zero except the forget gate, which starts at one.
#[derive(Module, Debug)]
pub struct ForecastLstmCell<B: Backend> {
    input_size: usize,
    hidden_size: usize,

    // Input projections
    input_gate: Linear<B>,
    forget_gate: Linear<B>,
    cell_gate: Linear<B>,
    output_gate: Linear<B>,

    // Recurrent projections
    input_recurrent: Linear<B>,
    forget_recurrent: Linear<B>,
    cell_recurrent: Linear<B>,
    output_recurrent: Linear<B>,
}

/// Fused LSTM parameters, row-major, gates concatenated along the last axis
#[derive(Debug, Clone, PartialEq)]
pub struct LstmWeights {
    /// `[input_size, 4 * hidden_size]`
    pub kernel: Vec<f32>,
    /// `[hidden_size, 4 * hidden_size]`
    pub recurrent_kernel: Vec<f32>,
    /// `[4 * hidden_size]`
    pub bias: Vec<f32>,
}

pub(crate) fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> PipelineResult<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PipelineError::Model(format!("failed to read tensor data: {:?}", e)))
}

impl<B: Backend> ForecastLstmCell<B> {
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let gate = |bias: f32| {
            let mut linear = LinearConfig::new(input_size, hidden_size).init(device);
            linear.bias = Some(Param::from_tensor(
                Tensor::ones([hidden_size], device).mul_scalar(bias),
            ));
            linear
        };
        let recurrent = || {
            LinearConfig::new(hidden_size, hidden_size)
                .with_bias(false)
                .init(device)
        };

        Self {
            input_size,
            hidden_size,
            input_gate: gate(0.0),
            forget_gate: gate(1.0),
            cell_gate: gate(0.0),
            output_gate: gate(0.0),
            input_recurrent: recurrent(),
            forget_recurrent: recurrent(),
            cell_recurrent: recurrent(),
            output_recurrent: recurrent(),
        }
    }

    /// Run the sequence `[batch, steps, input_size]` and return `[batch, hidden_size]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let device = x.device();
        let [batch_size, sequence_length, _] = x.dims();

        let mut h = Tensor::zeros([batch_size, self.hidden_size], &device);
        let mut c = Tensor::zeros([batch_size, self.hidden_size], &device);

        for t in 0..sequence_length {
            let x_t = x
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, self.input_size]);

            let i_t = activation::sigmoid(
                self.input_gate.forward(x_t.clone()) + self.input_recurrent.forward(h.clone()),
            );
            let f_t = activation::sigmoid(
                self.forget_gate.forward(x_t.clone()) + self.forget_recurrent.forward(h.clone()),
            );
            let g_t = activation::tanh(
                self.cell_gate.forward(x_t.clone()) + self.cell_recurrent.forward(h.clone()),
            );
            let o_t = activation::sigmoid(
                self.output_gate.forward(x_t) + self.output_recurrent.forward(h.clone()),
            );

            c = f_t * c + i_t * g_t;
            h = o_t * activation::tanh(c.clone());
        }

        h
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Export the parameters in fused `[i | f | c | o]` layout
    pub fn fused_weights(&self) -> PipelineResult<LstmWeights> {
        let gates = [
            &self.input_gate,
            &self.forget_gate,
            &self.cell_gate,
            &self.output_gate,
        ];
        let recurrents = [
            &self.input_recurrent,
            &self.forget_recurrent,
            &self.cell_recurrent,
            &self.output_recurrent,
        ];

        // burn stores linear weights as [d_input, d_output]
        let kernel = Tensor::cat(gates.iter().map(|l| l.weight.val()).collect(), 1);
        let recurrent_kernel = Tensor::cat(recurrents.iter().map(|l| l.weight.val()).collect(), 1);

        let mut biases = Vec::with_capacity(gates.len());
        for gate in gates {
            let bias = gate
                .bias
                .as_ref()
                .ok_or_else(|| PipelineError::Model("LSTM gate without bias".into()))?;
            biases.push(bias.val());
        }
        let bias = Tensor::cat(biases, 0);

        Ok(LstmWeights {
            kernel: tensor_values(kernel)?,
            recurrent_kernel: tensor_values(recurrent_kernel)?,
            bias: tensor_values(bias)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_forward_returns_last_hidden_state() {
        let device = NdArrayDevice::Cpu;
        let cell = ForecastLstmCell::<NdArray>::new(10, 16, &device);
        let x = Tensor::<NdArray, 3>::ones([4, 7, 10], &device);
        let h = cell.forward(x);
        assert_eq!(h.dims(), [4, 16]);

        // tanh-bounded output
        let values = tensor_values(h).unwrap();
        assert!(values.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_fused_weight_layout() {
        let device = NdArrayDevice::Cpu;
        let cell = ForecastLstmCell::<NdArray>::new(10, 8, &device);
        let weights = cell.fused_weights().unwrap();
        assert_eq!(weights.kernel.len(), 10 * 4 * 8);
        assert_eq!(weights.recurrent_kernel.len(), 8 * 4 * 8);
        assert_eq!(weights.bias.len(), 4 * 8);

        // first row of the fused kernel starts with the input gate's first row
        let input_gate = tensor_values(cell.input_gate.weight.val()).unwrap();
        assert_eq!(&weights.kernel[..8], &input_gate[..8]);
        let forget_gate = tensor_values(cell.forget_gate.weight.val()).unwrap();
        assert_eq!(&weights.kernel[8..16], &forget_gate[..8]);
    }

    #[test]
    fn test_forget_gate_bias_starts_at_one() {
        let device = NdArrayDevice::Cpu;
        let cell = ForecastLstmCell::<NdArray>::new(10, 8, &device);
        let bias = cell.fused_weights().unwrap().bias;
        assert!(bias[..8].iter().all(|&b| b == 0.0));
        assert!(bias[8..16].iter().all(|&b| b == 1.0));
        assert!(bias[16..].iter().all(|&b| b == 0.0));
    }
}
