//! Per-column min-max scaling, persisted next to each model so predictions can
//! be mapped back to price units at inference time.

// External crates
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// Internal modules
use crate::constants::FEATURES;
use crate::error::{PipelineError, PipelineResult};
use crate::util::file_utils::write_json;

/// Fitted min-max scaler state
///
/// Field names follow the layout the browser client reads from `scaler.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    #[serde(rename = "data_min_")]
    pub data_min: Vec<f64>,
    #[serde(rename = "data_max_")]
    pub data_max: Vec<f64>,
    #[serde(rename = "data_range_")]
    pub data_range: Vec<f64>,
    pub feature_range: (f64, f64),
    #[serde(default)]
    pub features: Vec<String>,
}

impl MinMaxScaler {
    /// Fit per-column minimum and maximum over the rows of `matrix`, scaling into `[0, 1]`
    pub fn fit(matrix: &Array2<f64>) -> PipelineResult<Self> {
        Self::fit_with_range(matrix, (0.0, 1.0))
    }

    pub fn fit_with_range(matrix: &Array2<f64>, feature_range: (f64, f64)) -> PipelineResult<Self> {
        if matrix.nrows() == 0 {
            return Err(PipelineError::InvalidData(
                "cannot fit a scaler on an empty matrix".into(),
            ));
        }
        if !(feature_range.0 < feature_range.1) {
            return Err(PipelineError::InvalidData(format!(
                "invalid feature range {:?}",
                feature_range
            )));
        }

        let mut data_min = Vec::with_capacity(matrix.ncols());
        let mut data_max = Vec::with_capacity(matrix.ncols());
        for column in matrix.axis_iter(Axis(1)) {
            let (min, max) = column.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
            if !min.is_finite() || !max.is_finite() {
                return Err(PipelineError::InvalidData(
                    "scaler input contains non-finite values".into(),
                ));
            }
            data_min.push(min);
            data_max.push(max);
        }
        let data_range = data_min.iter().zip(&data_max).map(|(lo, hi)| hi - lo).collect();

        Ok(Self {
            data_min,
            data_max,
            data_range,
            feature_range,
            features: Vec::new(),
        })
    }

    /// Attach the column names the scaler was fitted on
    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn n_features(&self) -> usize {
        self.data_min.len()
    }

    /// Scale a single value of column `column`
    ///
    /// A zero-range column maps every value to the lower bound of the target range.
    pub fn scale_value(&self, column: usize, value: f64) -> f64 {
        let (lower, upper) = self.feature_range;
        let range = self.data_range[column];
        if range == 0.0 {
            return lower;
        }
        lower + (value - self.data_min[column]) / range * (upper - lower)
    }

    /// Map a scaled value of column `column` back to original units
    pub fn unscale_value(&self, column: usize, value: f64) -> f64 {
        let (lower, upper) = self.feature_range;
        let range = self.data_range[column];
        if range == 0.0 {
            return self.data_min[column];
        }
        self.data_min[column] + (value - lower) / (upper - lower) * range
    }

    fn check_width(&self, matrix: &Array2<f64>) -> PipelineResult<()> {
        if matrix.ncols() != self.n_features() {
            return Err(PipelineError::InvalidData(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                matrix.ncols()
            )));
        }
        Ok(())
    }

    pub fn transform(&self, matrix: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        self.check_width(matrix)?;
        let mut scaled = matrix.clone();
        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| self.scale_value(j, v));
        }
        Ok(scaled)
    }

    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        self.check_width(matrix)?;
        let mut original = matrix.clone();
        for (j, mut column) in original.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| self.unscale_value(j, v));
        }
        Ok(original)
    }

    /// Inverse-transform values of a single column, e.g. predicted closes
    pub fn inverse_transform_column(&self, column: usize, values: &[f64]) -> PipelineResult<Vec<f64>> {
        if column >= self.n_features() {
            return Err(PipelineError::InvalidData(format!(
                "column {} out of range for {} features",
                column,
                self.n_features()
            )));
        }
        Ok(values.iter().map(|&v| self.unscale_value(column, v)).collect())
    }

    pub fn to_json_bytes(&self) -> PipelineResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        write_json(self, path)?;
        Ok(())
    }

    /// Load a persisted scaler and check it was fitted on the current feature order
    pub fn load<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let scaler: MinMaxScaler = serde_json::from_str(&json)?;
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> PipelineResult<()> {
        let n = self.data_min.len();
        if self.data_max.len() != n || self.data_range.len() != n {
            return Err(PipelineError::InvalidArtifact(
                "scaler arrays have different lengths".into(),
            ));
        }
        if !self.features.is_empty() && self.features.iter().map(String::as_str).ne(FEATURES.iter().copied()) {
            return Err(PipelineError::InvalidArtifact(format!(
                "scaler feature order {:?} does not match {:?}",
                self.features, FEATURES
            )));
        }
        if self.features.is_empty() && n != FEATURES.len() {
            return Err(PipelineError::InvalidArtifact(format!(
                "scaler has {} columns, expected {}",
                n,
                FEATURES.len()
            )));
        }
        Ok(())
    }
}
