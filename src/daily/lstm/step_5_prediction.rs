// External imports
use burn::tensor::backend::Backend;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::info;
use serde::Serialize;

// Internal imports
use super::step_1_tensor_preparation::{latest_window, records_to_feature_matrix};
use super::step_2_lstm_cell::tensor_values;
use super::step_3_lstm_model_arch::ForecastLstm;
use crate::constants::CLOSE_INDEX;
use crate::daily::records::DailyRecord;
use crate::error::{PipelineError, PipelineResult};
use crate::util::scaler::MinMaxScaler;

/// Predicted close for one future trading day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// The `count` weekdays following `last_date`
///
/// Exchange holidays are not known here, only weekends are skipped.
pub fn next_trading_days(last_date: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut date = last_date;
    while days.len() < count {
        date += Duration::days(1);
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(date);
        }
    }
    days
}

/// Forecast the next closes from the most recent complete records
///
/// The last `window` complete rows are scaled with the ticker's scaler, the
/// model predicts scaled closes and those are mapped back with the close
/// column of the scaler.
pub fn forecast_next_days<B: Backend>(
    model: &ForecastLstm<B>,
    scaler: &MinMaxScaler,
    records: &[DailyRecord],
    window: usize,
    device: &B::Device,
) -> PipelineResult<Vec<ForecastPoint>> {
    let complete: Vec<&DailyRecord> = records
        .iter()
        .filter(|r| r.feature_vector().is_some())
        .collect();
    let last = complete
        .last()
        .ok_or_else(|| PipelineError::InvalidData("no complete rows to forecast from".into()))?;
    let ticker = last.ticker.clone();
    let last_date = last.date;

    let matrix = records_to_feature_matrix(records)?;
    let input = latest_window::<B>(&matrix, scaler, window, device)?;
    let scaled: Vec<f64> = tensor_values(model.forward(input))?
        .into_iter()
        .map(f64::from)
        .collect();
    let closes = scaler.inverse_transform_column(CLOSE_INDEX, &scaled)?;

    let points: Vec<ForecastPoint> = next_trading_days(last_date, closes.len())
        .into_iter()
        .zip(closes)
        .map(|(date, close)| ForecastPoint { date, close })
        .collect();

    info!("{}: forecast from {} -> {:?}", ticker, last_date, points);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daily::lstm::step_3_lstm_model_arch::ForecastLstmConfig;
    use crate::util::test_utils::generate_daily_records;
    use burn_ndarray::{NdArray, NdArrayDevice};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_next_trading_days_skips_weekends() {
        // 2024-03-08 is a Friday
        assert_eq!(
            next_trading_days(ymd(2024, 3, 8), 3),
            vec![ymd(2024, 3, 11), ymd(2024, 3, 12), ymd(2024, 3, 13)]
        );
        // Wednesday crosses into the next week
        assert_eq!(
            next_trading_days(ymd(2024, 3, 6), 3),
            vec![ymd(2024, 3, 7), ymd(2024, 3, 8), ymd(2024, 3, 11)]
        );
        assert!(next_trading_days(ymd(2024, 3, 6), 0).is_empty());
    }

    #[test]
    fn test_forecast_stays_in_close_range() {
        let device = NdArrayDevice::Cpu;
        let records = generate_daily_records("NESN.SW", 120, 11);
        let matrix = records_to_feature_matrix(&records).unwrap();
        let scaler = MinMaxScaler::fit(&matrix).unwrap();
        let model = ForecastLstmConfig::default()
            .with_hidden_size(8)
            .init::<NdArray>(&device);

        let points = forecast_next_days(&model, &scaler, &records, 7, &device).unwrap();
        assert_eq!(points.len(), 3);
        let last_date = records.last().unwrap().date;
        assert!(points.iter().all(|p| p.date > last_date && p.close.is_finite()));
        assert!(points.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_forecast_needs_complete_rows() {
        let device = NdArrayDevice::Cpu;
        let model = ForecastLstmConfig::default().init::<NdArray>(&device);
        let scaler = MinMaxScaler::fit(&ndarray::Array2::zeros((1, 10))).unwrap();
        assert!(forecast_next_days(&model, &scaler, &[], 7, &device).is_err());
    }
}
