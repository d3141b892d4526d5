// External imports
use burn::tensor::backend::{AutodiffBackend, Backend};
use chrono::{Duration, NaiveDate};
use log::{info, warn};

// Internal imports
use super::{run_per_ticker, JobReport};
use crate::constants::{
    LOOKBACK_YEARS, METADATA_FILE, SCALER_FILE, SMA_LONG_WINDOW, UPSERT_BATCH_SIZE,
};
use crate::daily::lstm::step_1_tensor_preparation::prepare_training_data;
use crate::daily::lstm::step_3_lstm_model_arch::{
    ForecastLstm, ForecastLstmConfig, LAYER_NAMES, MODEL_SCOPE,
};
use crate::daily::lstm::step_4_train_model::train_model;
use crate::daily::lstm::step_5_prediction::{forecast_next_days, ForecastPoint};
use crate::daily::lstm::step_6_model_serialization::{load_trained_model, save_model, ModelMetadata};
use crate::daily::sources::PriceSource;
use crate::error::{PipelineError, PipelineResult};
use crate::storage::publisher::{Artifact, Publisher};
use crate::storage::{upsert_in_batches, ObjectStore, PriceTable};
use crate::tfjs::{convert_model, TfjsArtifact};
use crate::util::config::PipelineSettings;
use crate::util::model_utils::{list_model_dirs, ArtifactPaths};
use crate::util::pre_processor::prepare_daily_records;
use crate::util::scaler::MinMaxScaler;

/// Fail fast when the artifact bucket is not reachable or does not exist
pub fn check_bucket<S: ObjectStore + ?Sized>(store: &S, bucket: &str) -> PipelineResult<()> {
    let buckets = store.list_buckets()?;
    if buckets.iter().any(|b| b == bucket) {
        return Ok(());
    }
    Err(PipelineError::Config {
        name: format!("bucket `{}`", bucket),
        remediation: format!(
            "Create the `{}` storage bucket (found: {}).",
            bucket,
            buckets.join(", ")
        ),
    })
}

/// First day of the download window ending at `today`
pub fn lookback_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(365 * LOOKBACK_YEARS)
}

/// Download one ticker, derive indicators and upsert the complete rows
pub fn fetch_ticker<P, T>(
    source: &P,
    table: &T,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> PipelineResult<usize>
where
    P: PriceSource + ?Sized,
    T: PriceTable + ?Sized,
{
    let bars = source.daily_bars(ticker, start, end)?;
    if bars.is_empty() {
        return Err(PipelineError::missing(
            ticker,
            "price data",
            format!("no bars between {} and {}", start, end),
        ));
    }

    let bar_count = bars.len();
    let records = prepare_daily_records(ticker, bars)?;
    if records.is_empty() {
        return Err(PipelineError::insufficient(ticker, "bars", bar_count, SMA_LONG_WINDOW));
    }
    info!(
        "{}: {} bars -> {} complete rows",
        ticker,
        bar_count,
        records.len()
    );
    Ok(upsert_in_batches(table, &records, UPSERT_BATCH_SIZE)?)
}

pub fn fetch_job<P, T>(settings: &PipelineSettings, source: &P, table: &T, today: NaiveDate) -> JobReport
where
    P: PriceSource + ?Sized,
    T: PriceTable + ?Sized,
{
    let start = lookback_start(today);
    run_per_ticker("fetch", &settings.tickers, |ticker| {
        fetch_ticker(source, table, ticker, start, today).map(|_| ())
    })
}

/// Convert a model to TF.js and write it to the ticker's `tfjs/` directory
pub fn convert_to_tfjs<B: Backend>(
    model: &ForecastLstm<B>,
    config: &ForecastLstmConfig,
    paths: &ArtifactPaths,
) -> PipelineResult<TfjsArtifact> {
    let weights = model.named_weights()?;
    let artifact = convert_model(&config.keras_topology(), &weights, MODEL_SCOPE, &LAYER_NAMES)?;
    artifact.write_to_dir(paths.tfjs_dir())?;
    info!(
        "{}: converted to TF.js ({} shards) in {}",
        paths.ticker,
        artifact.shards.len(),
        paths.tfjs_dir().display()
    );
    Ok(artifact)
}

fn tfjs_artifacts(artifact: &TfjsArtifact) -> PipelineResult<Vec<Artifact>> {
    Ok(artifact
        .files()?
        .into_iter()
        .map(|(name, bytes)| Artifact::new(name, bytes))
        .collect())
}

/// Everything a completed training run produced for one ticker
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub metadata: ModelMetadata,
    pub published: usize,
}

/// Train, persist, convert and publish the model of one ticker
pub fn train_ticker<B, T, S>(
    settings: &PipelineSettings,
    table: &T,
    store: &S,
    ticker: &str,
    device: &B::Device,
) -> PipelineResult<TrainSummary>
where
    B: AutodiffBackend,
    T: PriceTable + ?Sized,
    S: ObjectStore + ?Sized,
{
    let records = table.select(ticker)?;
    if records.is_empty() {
        return Err(PipelineError::missing(ticker, "price rows", "table has no rows"));
    }

    let prepared = prepare_training_data(
        ticker,
        &records,
        settings.window_size,
        settings.forecast_days,
        settings.training.validation_split,
    )?;
    let model_config = ForecastLstmConfig::new(settings.window_size, settings.forecast_days);
    let outcome = train_model::<B>(
        &prepared.train,
        &prepared.validation,
        &model_config,
        &settings.training,
        device,
    )?;
    info!(
        "{}: trained {} epochs, best val_loss {:.6} at epoch {}",
        ticker, outcome.epochs_ran, outcome.best_val_loss, outcome.best_epoch
    );

    let paths = ArtifactPaths::for_ticker(&settings.models_dir, ticker);
    save_model(&outcome.model, &model_config, &paths)?;
    prepared.scaler.save(paths.scaler())?;
    let metadata = ModelMetadata::from_outcome(ticker, &model_config, &settings.training, &outcome);
    metadata.save(paths.metadata())?;

    let tfjs = convert_to_tfjs(&outcome.model, &model_config, &paths)?;

    let mut artifacts = vec![
        Artifact::from_file(paths.metadata())?,
        Artifact::from_file(paths.scaler())?,
    ];
    artifacts.extend(tfjs_artifacts(&tfjs)?);
    let report = Publisher::new(store)
        .with_verification(settings.verify_uploads)
        .publish(ticker, &artifacts)?;

    Ok(TrainSummary {
        metadata,
        published: report.published(),
    })
}

pub fn train_job<B, T, S>(
    settings: &PipelineSettings,
    table: &T,
    store: &S,
    device: &B::Device,
) -> PipelineResult<JobReport>
where
    B: AutodiffBackend,
    T: PriceTable + ?Sized,
    S: ObjectStore + ?Sized,
{
    check_bucket(store, &settings.bucket)?;
    Ok(run_per_ticker("train", &settings.tickers, |ticker| {
        train_ticker::<B, T, S>(settings, table, store, ticker, device).map(|_| ())
    }))
}

/// Re-convert a locally trained model and publish the TF.js files
pub fn convert_ticker<B, S>(
    settings: &PipelineSettings,
    store: &S,
    ticker: &str,
    device: &B::Device,
) -> PipelineResult<usize>
where
    B: Backend,
    S: ObjectStore + ?Sized,
{
    let paths = ArtifactPaths::for_ticker(&settings.models_dir, ticker);
    let (model, config) = load_trained_model::<B>(&paths, device)?;
    let tfjs = convert_to_tfjs(&model, &config, &paths)?;
    let report = Publisher::new(store)
        .with_verification(settings.verify_uploads)
        .publish(ticker, &tfjs_artifacts(&tfjs)?)?;
    Ok(report.published())
}

pub fn convert_job<B, S>(settings: &PipelineSettings, store: &S, device: &B::Device) -> PipelineResult<JobReport>
where
    B: Backend,
    S: ObjectStore + ?Sized,
{
    check_bucket(store, &settings.bucket)?;
    Ok(run_per_ticker("convert", &settings.tickers, |ticker| {
        convert_ticker::<B, S>(settings, store, ticker, device).map(|_| ())
    }))
}

/// Validate and re-publish the scaler of every local model directory
pub fn publish_scalers_job<S>(settings: &PipelineSettings, store: &S) -> PipelineResult<JobReport>
where
    S: ObjectStore + ?Sized,
{
    check_bucket(store, &settings.bucket)?;
    let tickers = list_model_dirs(&settings.models_dir)?;
    if tickers.is_empty() {
        warn!("No model directories under {}", settings.models_dir.display());
    }

    Ok(run_per_ticker("publish-scalers", &tickers, |ticker| {
        let paths = ArtifactPaths::for_ticker(&settings.models_dir, ticker);
        if !paths.scaler().is_file() {
            return Err(PipelineError::missing(
                ticker,
                SCALER_FILE,
                paths.scaler().display().to_string(),
            ));
        }
        MinMaxScaler::load(paths.scaler())?;
        let mut artifacts = vec![Artifact::from_file(paths.scaler())?];
        if paths.metadata().is_file() {
            artifacts.push(Artifact::from_file(paths.metadata())?);
        } else {
            warn!("{}: no {} to publish alongside the scaler", ticker, METADATA_FILE);
        }
        Publisher::new(store)
            .with_verification(settings.verify_uploads)
            .publish(ticker, &artifacts)?;
        Ok(())
    }))
}

/// Forecast the next trading days for one ticker from its stored rows
pub fn forecast_ticker<B, T>(
    settings: &PipelineSettings,
    table: &T,
    ticker: &str,
    device: &B::Device,
) -> PipelineResult<Vec<ForecastPoint>>
where
    B: Backend,
    T: PriceTable + ?Sized,
{
    let paths = ArtifactPaths::for_ticker(&settings.models_dir, ticker);
    let (model, config) = load_trained_model::<B>(&paths, device)?;
    if !paths.scaler().is_file() {
        return Err(PipelineError::missing(
            ticker,
            SCALER_FILE,
            paths.scaler().display().to_string(),
        ));
    }
    let scaler = MinMaxScaler::load(paths.scaler())?;
    let records = table.select(ticker)?;
    forecast_next_days(&model, &scaler, &records, config.window_size, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::DirectoryStore;

    #[test]
    fn test_lookback_start() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_eq!(lookback_start(today), today - Duration::days(1825));
    }

    #[test]
    fn test_check_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path(), "models");
        assert!(matches!(
            check_bucket(&store, "models"),
            Err(PipelineError::Config { .. })
        ));
        store.create_bucket().unwrap();
        assert!(check_bucket(&store, "models").is_ok());
        let err = check_bucket(&store, "archive").unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
