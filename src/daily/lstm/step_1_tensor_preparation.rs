// External crates
use burn::tensor::{backend::Backend, Tensor, TensorData};
use log::{debug, info};
use ndarray::{s, Array2};

// Internal modules
use crate::constants::{CLOSE_INDEX, FEATURES, MIN_SEQUENCES, MIN_TRAINING_ROWS};
use crate::daily::records::DailyRecord;
use crate::error::{PipelineError, PipelineResult};
use crate::util::scaler::MinMaxScaler;

/// One supervised example: `window` consecutive feature rows and the next
/// `horizon` values of the target column
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSample {
    pub input: Array2<f64>,
    pub target: Vec<f64>,
}

/// Scaled, split training data for one ticker
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub scaler: MinMaxScaler,
    pub train: Vec<SequenceSample>,
    pub validation: Vec<SequenceSample>,
    /// Complete feature rows the scaler was fitted on
    pub rows: usize,
}

/// Stack complete records into a `[rows, FEATURES.len()]` matrix
///
/// Rows missing any feature are dropped; the remaining rows keep their order.
pub fn records_to_feature_matrix(records: &[DailyRecord]) -> PipelineResult<Array2<f64>> {
    let rows: Vec<[f64; FEATURES.len()]> = records.iter().filter_map(|r| r.feature_vector()).collect();
    let dropped = records.len() - rows.len();
    if dropped > 0 {
        debug!("Dropped {} rows with missing features", dropped);
    }
    let flat: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
    Ok(Array2::from_shape_vec((rows.len(), FEATURES.len()), flat)?)
}

/// Slide a window over `matrix` producing `max(0, T - window - horizon + 1)` samples
///
/// Sample `i` takes rows `[i, i + window)` as input and the `target_column`
/// values of rows `[i + window, i + window + horizon)` as target. Too few rows
/// yields an empty list, not an error.
pub fn build_sequences(
    matrix: &Array2<f64>,
    window: usize,
    horizon: usize,
    target_column: usize,
) -> PipelineResult<Vec<SequenceSample>> {
    if window == 0 || horizon == 0 {
        return Err(PipelineError::InvalidData(format!(
            "window ({}) and horizon ({}) must be positive",
            window, horizon
        )));
    }
    if target_column >= matrix.ncols() {
        return Err(PipelineError::InvalidData(format!(
            "target column {} out of range for {} columns",
            target_column,
            matrix.ncols()
        )));
    }

    let total = matrix.nrows();
    if total < window + horizon {
        return Ok(Vec::new());
    }

    let count = total - window - horizon + 1;
    let samples = (0..count)
        .map(|i| SequenceSample {
            input: matrix.slice(s![i..i + window, ..]).to_owned(),
            target: matrix
                .slice(s![i + window..i + window + horizon, target_column])
                .to_vec(),
        })
        .collect();
    Ok(samples)
}

/// Number of training samples for a chronological split
///
/// The ratio is taken to whole percent and the count is floored in integer
/// arithmetic, so a 0.2 split keeps exactly `total * 4 / 5` samples.
pub fn training_count(total: usize, validation_ratio: f64) -> usize {
    let train_percent = ((1.0 - validation_ratio.clamp(0.0, 1.0)) * 100.0).round() as usize;
    total * train_percent / 100
}

/// Split into a contiguous training prefix and a validation suffix, never shuffling
pub fn split_sequences(
    mut samples: Vec<SequenceSample>,
    validation_ratio: f64,
) -> (Vec<SequenceSample>, Vec<SequenceSample>) {
    let train = training_count(samples.len(), validation_ratio);
    let validation = samples.split_off(train);
    (samples, validation)
}

/// Turn complete records into scaled training and validation sequences
///
/// Returns an `Insufficient` error, which skips the ticker, when there are
/// fewer than the minimum rows or sequences for a stable fit.
pub fn prepare_training_data(
    ticker: &str,
    records: &[DailyRecord],
    window: usize,
    horizon: usize,
    validation_ratio: f64,
) -> PipelineResult<PreparedData> {
    // the minimum applies to the rows stored for the ticker, before incomplete
    // rows are dropped
    if records.len() < MIN_TRAINING_ROWS {
        return Err(PipelineError::insufficient(
            ticker,
            "rows",
            records.len(),
            MIN_TRAINING_ROWS,
        ));
    }

    let matrix = records_to_feature_matrix(records)?;
    let available = (matrix.nrows() + 1).saturating_sub(window + horizon);
    if available < MIN_SEQUENCES {
        return Err(PipelineError::insufficient(
            ticker,
            "sequences",
            available,
            MIN_SEQUENCES,
        ));
    }

    let scaler = MinMaxScaler::fit(&matrix)?.with_features(&FEATURES);
    let scaled = scaler.transform(&matrix)?;
    let samples = build_sequences(&scaled, window, horizon, CLOSE_INDEX)?;

    let (train, validation) = split_sequences(samples, validation_ratio);
    info!(
        "{}: {} rows -> {} training / {} validation sequences",
        ticker,
        matrix.nrows(),
        train.len(),
        validation.len()
    );

    Ok(PreparedData {
        scaler,
        train,
        validation,
        rows: matrix.nrows(),
    })
}

/// Batch samples into `[n, window, features]` inputs and `[n, horizon]` targets
pub fn samples_to_tensors<'a, B, I>(samples: I, device: &B::Device) -> PipelineResult<(Tensor<B, 3>, Tensor<B, 2>)>
where
    B: Backend,
    I: IntoIterator<Item = &'a SequenceSample>,
{
    let mut inputs: Vec<f32> = Vec::new();
    let mut targets: Vec<f32> = Vec::new();
    let mut shape: Option<(usize, usize, usize)> = None;
    let mut count = 0;

    for sample in samples {
        let dims = (sample.input.nrows(), sample.input.ncols(), sample.target.len());
        match shape {
            None => shape = Some(dims),
            Some(expected) if expected != dims => {
                return Err(PipelineError::InvalidData(format!(
                    "inconsistent sample shapes {:?} and {:?}",
                    expected, dims
                )));
            }
            Some(_) => {}
        }
        inputs.extend(sample.input.iter().map(|&v| v as f32));
        targets.extend(sample.target.iter().map(|&v| v as f32));
        count += 1;
    }

    let (window, features, horizon) = shape
        .ok_or_else(|| PipelineError::InvalidData("cannot build tensors from zero samples".into()))?;

    let x = Tensor::<B, 3>::from_data(TensorData::new(inputs, [count, window, features]), device);
    let y = Tensor::<B, 2>::from_data(TensorData::new(targets, [count, horizon]), device);
    Ok((x, y))
}

/// Scale the last `window` complete rows into a single `[1, window, features]` input
pub fn latest_window<B: Backend>(
    matrix: &Array2<f64>,
    scaler: &MinMaxScaler,
    window: usize,
    device: &B::Device,
) -> PipelineResult<Tensor<B, 3>> {
    if matrix.nrows() < window {
        return Err(PipelineError::InvalidData(format!(
            "need {} rows for an input window, have {}",
            window,
            matrix.nrows()
        )));
    }
    let tail = matrix.slice(s![matrix.nrows() - window.., ..]).to_owned();
    let scaled = scaler.transform(&tail)?;
    let values: Vec<f32> = scaled.iter().map(|&v| v as f32).collect();
    Ok(Tensor::<B, 3>::from_data(
        TensorData::new(values, [1, window, scaled.ncols()]),
        device,
    ))
}
