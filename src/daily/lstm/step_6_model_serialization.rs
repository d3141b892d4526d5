// External imports
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::{AutodiffBackend, Backend};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// Internal imports
use super::step_3_lstm_model_arch::{ForecastLstm, ForecastLstmConfig};
use super::step_4_train_model::{TrainingConfig, TrainingOutcome};
use crate::built_info;
use crate::constants::FEATURES;
use crate::error::{PipelineError, PipelineResult};
use crate::util::file_utils::write_json;
use crate::util::model_utils::ArtifactPaths;

/// What a model was trained with and how training went, written as `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub ticker: String,
    pub features: Vec<String>,
    pub window_size: usize,
    pub forecast_days: usize,
    pub lstm_units: usize,
    pub dropout: f64,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub val_loss: f64,
    pub best_epoch: usize,
    pub epochs_ran: usize,
    pub training_samples: usize,
    pub validation_samples: usize,
    pub last_trained: DateTime<Utc>,
    pub crate_version: String,
    pub rustc_version: String,
}

impl ModelMetadata {
    pub fn from_outcome<B: AutodiffBackend>(
        ticker: &str,
        model_config: &ForecastLstmConfig,
        training: &TrainingConfig,
        outcome: &TrainingOutcome<B>,
    ) -> Self {
        Self {
            ticker: ticker.to_string(),
            features: FEATURES.iter().map(|f| f.to_string()).collect(),
            window_size: model_config.window_size,
            forecast_days: model_config.output_size,
            lstm_units: model_config.hidden_size,
            dropout: model_config.dropout,
            learning_rate: training.learning_rate,
            batch_size: training.batch_size,
            val_loss: outcome.best_val_loss,
            best_epoch: outcome.best_epoch,
            epochs_ran: outcome.epochs_ran,
            training_samples: outcome.train_samples,
            validation_samples: outcome.val_samples,
            last_trained: Utc::now(),
            crate_version: built_info::PKG_VERSION.to_string(),
            rustc_version: built_info::RUSTC_VERSION.to_string(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        write_json(self, path)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn recorder() -> BinFileRecorder<FullPrecisionSettings> {
    BinFileRecorder::<FullPrecisionSettings>::new()
}

/// Save the weights as `model.bin` and the architecture as `model_config.json`
pub fn save_model<B: Backend>(
    model: &ForecastLstm<B>,
    config: &ForecastLstmConfig,
    paths: &ArtifactPaths,
) -> PipelineResult<()> {
    paths.ensure_dirs()?;
    write_json(config, paths.model_config())?;
    model
        .clone()
        .save_file(paths.model_record_stem(), &recorder())
        .map_err(|e| PipelineError::Model(format!("failed to save model record: {:?}", e)))?;
    info!("{}: model saved to {}", paths.ticker, paths.model_record().display());
    Ok(())
}

pub fn load_model_config<P: AsRef<Path>>(path: P) -> PipelineResult<ForecastLstmConfig> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Load a ticker's trained model; a missing model is a skip, not a failure
pub fn load_trained_model<B: Backend>(
    paths: &ArtifactPaths,
    device: &B::Device,
) -> PipelineResult<(ForecastLstm<B>, ForecastLstmConfig)> {
    if !paths.has_trained_model() {
        return Err(PipelineError::missing(
            &paths.ticker,
            "trained model",
            format!("no {} in {}", paths.model_record().display(), paths.base.display()),
        ));
    }

    let config = load_model_config(paths.model_config())?;
    let model = config
        .init::<B>(device)
        .load_file(paths.model_record_stem(), &recorder(), device)
        .map_err(|e| PipelineError::Model(format!("failed to load model record: {:?}", e)))?;
    Ok((model, config))
}
