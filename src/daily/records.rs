// External imports
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Internal imports
use crate::constants::FEATURES;

/// One calendar day of OHLCV data for a single ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// One row of the `daily_prices` table: a price bar plus its derived indicators
///
/// Serialized field names match the table columns and the browser client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
    pub returns: Option<f64>,
    pub rsi14: Option<f64>,
    pub macd: Option<f64>,
    pub ma20: Option<f64>,
    pub sma_50: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub volume_ma5: Option<f64>,
}

impl DailyRecord {
    /// Look up a feature column by name
    pub fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "close" => self.close,
            "returns" => self.returns,
            "volume" => self.volume.map(|v| v as f64),
            "rsi14" => self.rsi14,
            "macd" => self.macd,
            "ma20" => self.ma20,
            "sma_50" => self.sma_50,
            "bb_upper" => self.bb_upper,
            "bb_lower" => self.bb_lower,
            "volume_ma5" => self.volume_ma5,
            _ => None,
        }
    }

    /// The feature vector in `FEATURES` order, or `None` if any value is missing
    pub fn feature_vector(&self) -> Option<[f64; FEATURES.len()]> {
        let mut row = [0.0; FEATURES.len()];
        for (slot, name) in row.iter_mut().zip(FEATURES.iter()) {
            *slot = self.feature(name).filter(|v| v.is_finite())?;
        }
        Some(row)
    }
}

/// Sort bars by date and collapse duplicate dates, keeping the last observation
pub fn normalize_bars(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    // stable sort keeps arrival order within a date
    bars.sort_by_key(|bar| bar.date);
    let mut result: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match result.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => result.push(bar),
        }
    }
    result
}
