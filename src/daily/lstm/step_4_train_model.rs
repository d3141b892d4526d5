// External imports
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

// Internal imports
use super::step_1_tensor_preparation::{samples_to_tensors, SequenceSample};
use super::step_3_lstm_model_arch::{ForecastLstm, ForecastLstmConfig};
use crate::constants::{
    BATCH_SIZE, EPOCHS, LEARNING_RATE, PATIENCE, SHUFFLE_SEED, VALIDATION_SPLIT_RATIO,
};
use crate::error::{PipelineError, PipelineResult};

/// Configuration for training the model
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    pub validation_split: f64,
    pub patience: usize,
    /// Minimum decrease in validation loss that counts as an improvement
    pub min_delta: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: LEARNING_RATE,
            batch_size: BATCH_SIZE,
            epochs: EPOCHS,
            validation_split: VALIDATION_SPLIT_RATIO,
            patience: PATIENCE,
            min_delta: 0.0,
            seed: SHUFFLE_SEED,
        }
    }
}

/// Mean training and validation loss of one epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochLoss {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
}

/// Result of a training run, holding the restored best weights
#[derive(Debug)]
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: ForecastLstm<B>,
    pub best_val_loss: f64,
    pub best_epoch: usize,
    pub epochs_ran: usize,
    pub train_samples: usize,
    pub val_samples: usize,
    pub history: Vec<EpochLoss>,
}

/// Mean squared error of `model` over a full tensor set
fn evaluate<B: Backend>(model: &ForecastLstm<B>, x: Tensor<B, 3>, y: Tensor<B, 2>) -> f64 {
    let predictions = model.forward(x);
    MseLoss::new()
        .forward(predictions, y, Reduction::Mean)
        .into_scalar()
        .elem::<f64>()
}

/// Train a fresh model with early stopping on validation loss
///
/// Batches are drawn in a seeded shuffled order from the training prefix.
/// After `patience` epochs without improvement training stops, and the
/// weights from the best validation epoch are always the ones returned.
pub fn train_model<B: AutodiffBackend>(
    train: &[SequenceSample],
    validation: &[SequenceSample],
    model_config: &ForecastLstmConfig,
    config: &TrainingConfig,
    device: &B::Device,
) -> PipelineResult<TrainingOutcome<B>> {
    if train.is_empty() {
        return Err(PipelineError::InvalidData("no training samples".into()));
    }
    if config.batch_size == 0 || config.epochs == 0 {
        return Err(PipelineError::InvalidData(format!(
            "batch size ({}) and epochs ({}) must be positive",
            config.batch_size, config.epochs
        )));
    }

    let mut model: ForecastLstm<B> = model_config.init(device);
    let mut optimizer = AdamConfig::new()
        .with_epsilon(1e-7)
        .init::<B, ForecastLstm<B>>();
    let loss_fn = MseLoss::new();

    // Validation never shuffles and never needs gradients
    let validation_tensors = if validation.is_empty() {
        None
    } else {
        Some(samples_to_tensors::<B::InnerBackend, _>(validation, device)?)
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..train.len()).collect();

    let mut best_model = model.clone();
    let mut best_val_loss = f64::INFINITY;
    let mut best_epoch = 0;
    let mut epochs_no_improve = 0;
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        order.shuffle(&mut rng);

        let mut epoch_loss = 0.0;
        let mut batches = 0;
        for chunk in order.chunks(config.batch_size) {
            let (x, y) = samples_to_tensors::<B, _>(chunk.iter().map(|&i| &train[i]), device)?;
            let predictions = model.forward(x);
            let loss = loss_fn.forward(predictions, y, Reduction::Mean);
            epoch_loss += loss.clone().into_scalar().elem::<f64>();
            batches += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);
        }
        let train_loss = epoch_loss / batches as f64;

        let val_loss = match &validation_tensors {
            Some((x, y)) => evaluate(&model.valid(), x.clone(), y.clone()),
            None => train_loss,
        };
        if !val_loss.is_finite() {
            return Err(PipelineError::Model(format!(
                "validation loss diverged at epoch {}",
                epoch
            )));
        }

        debug!(
            "Epoch {}/{}: loss {:.6}, val_loss {:.6}",
            epoch, config.epochs, train_loss, val_loss
        );
        history.push(EpochLoss {
            epoch,
            train_loss,
            val_loss,
        });

        if val_loss < best_val_loss - config.min_delta {
            best_val_loss = val_loss;
            best_epoch = epoch;
            best_model = model.clone();
            epochs_no_improve = 0;
        } else {
            epochs_no_improve += 1;
            if epochs_no_improve >= config.patience {
                info!(
                    "Early stopping at epoch {} (best val_loss {:.6} at epoch {})",
                    epoch, best_val_loss, best_epoch
                );
                break;
            }
        }
    }

    let epochs_ran = history.len();
    Ok(TrainingOutcome {
        model: best_model,
        best_val_loss,
        best_epoch,
        epochs_ran,
        train_samples: train.len(),
        val_samples: validation.len(),
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daily::lstm::step_1_tensor_preparation::{build_sequences, split_sequences};
    use burn_autodiff::Autodiff;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use ndarray::Array2;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn sine_samples(rows: usize) -> (Vec<SequenceSample>, Vec<SequenceSample>) {
        let matrix = Array2::from_shape_fn((rows, 2), |(i, j)| {
            0.5 + 0.4 * ((i as f64) * 0.3 + j as f64).sin()
        });
        let samples = build_sequences(&matrix, 7, 3, 0).unwrap();
        split_sequences(samples, 0.2)
    }

    fn small_config() -> (ForecastLstmConfig, TrainingConfig) {
        let model_config = ForecastLstmConfig {
            input_size: 2,
            hidden_size: 8,
            output_size: 3,
            dropout: 0.0,
            window_size: 7,
        };
        let config = TrainingConfig {
            epochs: 4,
            batch_size: 16,
            learning_rate: 0.01,
            ..TrainingConfig::default()
        };
        (model_config, config)
    }

    #[test]
    fn test_train_model_records_history() {
        let device = NdArrayDevice::Cpu;
        let (train, validation) = sine_samples(80);
        let (model_config, config) = small_config();

        let outcome =
            train_model::<TestBackend>(&train, &validation, &model_config, &config, &device).unwrap();
        assert_eq!(outcome.train_samples, train.len());
        assert_eq!(outcome.val_samples, validation.len());
        assert!(outcome.epochs_ran >= 1 && outcome.epochs_ran <= 4);
        assert_eq!(outcome.history.len(), outcome.epochs_ran);
        assert!(outcome.best_val_loss.is_finite());

        let min_val = outcome
            .history
            .iter()
            .map(|h| h.val_loss)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(outcome.best_val_loss, min_val);
    }

    #[test]
    fn test_restored_weights_reproduce_best_loss() {
        let device = NdArrayDevice::Cpu;
        let (train, validation) = sine_samples(80);
        let (model_config, config) = small_config();
        let outcome =
            train_model::<TestBackend>(&train, &validation, &model_config, &config, &device).unwrap();

        let (x, y) = samples_to_tensors::<NdArray<f32>, _>(&validation, &device).unwrap();
        let loss = evaluate(&outcome.model.valid(), x, y);
        assert!((loss - outcome.best_val_loss).abs() < 1e-6);
    }

    #[test]
    fn test_patience_stops_early() {
        let device = NdArrayDevice::Cpu;
        let (train, validation) = sine_samples(60);
        let (model_config, _) = small_config();
        // zero learning rate: loss never improves after the first epoch
        let config = TrainingConfig {
            epochs: 50,
            patience: 2,
            learning_rate: 0.0,
            ..TrainingConfig::default()
        };
        let outcome =
            train_model::<TestBackend>(&train, &validation, &model_config, &config, &device).unwrap();
        assert_eq!(outcome.best_epoch, 1);
        assert_eq!(outcome.epochs_ran, 3);
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        let device = NdArrayDevice::Cpu;
        let (model_config, config) = small_config();
        let result = train_model::<TestBackend>(&[], &[], &model_config, &config, &device);
        assert!(result.is_err());
    }
}
