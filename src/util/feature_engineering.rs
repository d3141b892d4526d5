// External crates
use chrono::NaiveDate;
use polars::prelude::*;

// Internal modules
use crate::constants::{
    BOLLINGER_NUM_STD, BOLLINGER_WINDOW, FEATURES, MACD_FAST, MACD_SLOW, PRICE_COLUMNS,
    RSI_WINDOW, SMA_LONG_WINDOW, SMA_SHORT_WINDOW, VOLUME_MA_WINDOW,
};
use crate::daily::records::DailyRecord;

fn rolling_options(window: usize) -> RollingOptionsFixedWindow {
    RollingOptionsFixedWindow {
        window_size: window,
        min_periods: window,
        center: false,
        weights: None,
        fn_params: None,
    }
}

/// Reads a numeric column as `Option<f64>` values, casting integers if needed
pub fn column_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(column)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// NaN and infinities become missing values
pub fn finite_or_none(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Carries the last observed value forward over gaps. Leading gaps stay missing.
pub fn forward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    let mut last_valid = None;
    for value in values {
        if let Some(v) = finite_or_none(*value) {
            last_valid = Some(v);
        }
        result.push(last_valid);
    }
    result
}

fn to_series(values: &[Option<f64>]) -> Series {
    Series::new("values".into(), values.to_vec())
}

fn series_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    Ok(series
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(finite_or_none)
        .collect())
}

/// Percent change against the previous value
pub fn percent_change(values: &[Option<f64>]) -> PolarsResult<Vec<Option<f64>>> {
    let series = to_series(values);
    let shifted = series.shift(1);
    let diff = (&series - &shifted)?;
    let returns = (&diff / &shifted)?;
    series_values(&returns)
}

/// Calculates a Simple Moving Average using polars' rolling mean
pub fn simple_moving_average(values: &[Option<f64>], window: usize) -> PolarsResult<Vec<Option<f64>>> {
    if window == 0 {
        return Err(PolarsError::ComputeError("SMA window must be positive".into()));
    }
    if values.len() < window {
        return Ok(vec![None; values.len()]);
    }

    let mean = to_series(values).rolling_mean(rolling_options(window))?;
    series_values(&mean)
}

/// Non-adjusted exponentially weighted mean, seeded with the first observation
///
/// Output is missing until `min_periods` observations have been seen.
pub fn exponential_weighted_mean(
    values: &[Option<f64>],
    alpha: f64,
    min_periods: usize,
) -> PolarsResult<Vec<Option<f64>>> {
    let options = EWMOptions {
        alpha,
        adjust: false,
        min_periods,
        ignore_nulls: true,
        ..Default::default()
    };
    series_values(&ewm_mean(&to_series(values), options)?)
}

/// Exponential Moving Average with `alpha = 2 / (span + 1)`
pub fn exponential_moving_average(values: &[Option<f64>], span: usize) -> PolarsResult<Vec<Option<f64>>> {
    exponential_weighted_mean(values, 2.0 / (span as f64 + 1.0), span)
}

/// Calculates the Relative Strength Index with Wilder smoothing
pub fn relative_strength_index(close: &[Option<f64>], window: usize) -> PolarsResult<Vec<Option<f64>>> {
    let series = to_series(close);
    let delta = (&series - &series.shift(1))?;
    // the first bar has no change and counts as a flat observation
    let changes: Vec<f64> = delta.f64()?.into_iter().map(|d| d.unwrap_or(0.0)).collect();
    let gains: Vec<Option<f64>> = changes.iter().map(|d| Some(d.max(0.0))).collect();
    let losses: Vec<Option<f64>> = changes.iter().map(|d| Some((-d).max(0.0))).collect();

    let alpha = 1.0 / window as f64;
    let avg_gain = exponential_weighted_mean(&gains, alpha, window)?;
    let avg_loss = exponential_weighted_mean(&losses, alpha, window)?;

    Ok(avg_gain
        .into_iter()
        .zip(avg_loss)
        .map(|(gain, loss)| match (gain, loss) {
            (Some(_), Some(l)) if l == 0.0 => Some(100.0),
            (Some(g), Some(l)) => finite_or_none(Some(100.0 - 100.0 / (1.0 + g / l))),
            _ => None,
        })
        .collect())
}

/// MACD line: fast EMA minus slow EMA. The signal line is not emitted.
pub fn macd_line(close: &[Option<f64>], fast: usize, slow: usize) -> PolarsResult<Vec<Option<f64>>> {
    let fast_ema = to_series(&exponential_moving_average(close, fast)?);
    let slow_ema = to_series(&exponential_moving_average(close, slow)?);
    series_values(&(&fast_ema - &slow_ema)?)
}

/// Bollinger Bands around the simple moving average, using the population
/// standard deviation of the same window. Returns `(upper, lower)`.
pub fn bollinger_bands(
    close: &[Option<f64>],
    window: usize,
    num_std: f64,
) -> PolarsResult<(Vec<Option<f64>>, Vec<Option<f64>>)> {
    if window == 0 {
        return Err(PolarsError::ComputeError("Bollinger window must be positive".into()));
    }
    if close.len() < window {
        return Ok((vec![None; close.len()], vec![None; close.len()]));
    }

    let series = to_series(close);
    let mean = series.rolling_mean(rolling_options(window))?;
    let std = series.rolling_std(RollingOptionsFixedWindow {
        fn_params: Some(RollingFnParams::Var(RollingVarParams { ddof: 0 })),
        ..rolling_options(window)
    })?;
    let width = &std * num_std;

    let upper = (&mean + &width)?;
    let lower = (&mean - &width)?;
    Ok((series_values(&upper)?, series_values(&lower)?))
}

/// Adds the derived feature columns to a frame of raw daily bars
///
/// The raw price columns are forward-filled first so a single gap does not
/// cascade through every rolling window. Leading rows keep missing indicator
/// values until each window is satisfied; use [`drop_incomplete_rows`] to cut
/// that warmup.
pub fn compute_indicators(df: &DataFrame) -> PolarsResult<DataFrame> {
    let mut result = df.clone();

    for name in PRICE_COLUMNS {
        if df.column(name).is_err() {
            return Err(PolarsError::ColumnNotFound(
                format!("Required column {} not found", name).into(),
            ));
        }
        let filled = forward_fill(&column_values(df, name)?);
        result.with_column(Series::new(name.into(), filled))?;
    }

    let close = column_values(&result, "close")?;
    let volume = column_values(&result, "volume")?;

    let returns = percent_change(&close)?;
    let rsi14 = relative_strength_index(&close, RSI_WINDOW)?;
    let macd = macd_line(&close, MACD_FAST, MACD_SLOW)?;
    let ma20 = simple_moving_average(&close, SMA_SHORT_WINDOW)?;
    let sma_50 = simple_moving_average(&close, SMA_LONG_WINDOW)?;
    let (bb_upper, bb_lower) = bollinger_bands(&close, BOLLINGER_WINDOW, BOLLINGER_NUM_STD)?;
    let volume_ma5 = simple_moving_average(&volume, VOLUME_MA_WINDOW)?;

    let indicators = [
        ("returns", returns),
        ("rsi14", rsi14),
        ("macd", macd),
        ("ma20", ma20),
        ("sma_50", sma_50),
        ("bb_upper", bb_upper),
        ("bb_lower", bb_lower),
        ("volume_ma5", volume_ma5),
    ];
    for (name, values) in indicators {
        let cleaned: Vec<Option<f64>> = values.into_iter().map(finite_or_none).collect();
        result.with_column(Series::new(name.into(), cleaned))?;
    }

    Ok(result)
}

/// Drops every row where any model feature is missing
pub fn drop_incomplete_rows(df: &DataFrame) -> PolarsResult<DataFrame> {
    let mut keep = vec![true; df.height()];
    for name in FEATURES {
        let values = column_values(df, name)?;
        for (flag, value) in keep.iter_mut().zip(values) {
            if finite_or_none(value).is_none() {
                *flag = false;
            }
        }
    }
    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    df.filter(&mask)
}

/// Converts an indicator frame into table rows for one ticker
pub fn frame_to_records(ticker: &str, df: &DataFrame) -> PolarsResult<Vec<DailyRecord>> {
    let dates_column = df.column("date")?.cast(&DataType::String)?;
    let dates = dates_column.str()?;

    let mut parsed_dates = Vec::with_capacity(df.height());
    for value in dates.into_iter() {
        let raw = value.ok_or_else(|| PolarsError::ComputeError("Missing date value".into()))?;
        let day = raw.get(..10).unwrap_or(raw);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
            PolarsError::ComputeError(format!("Invalid date '{}': {}", raw, e).into())
        })?;
        parsed_dates.push(date);
    }

    let get = |name: &str| -> PolarsResult<Vec<Option<f64>>> {
        Ok(column_values(df, name)?
            .into_iter()
            .map(finite_or_none)
            .collect())
    };
    let open = get("open")?;
    let high = get("high")?;
    let low = get("low")?;
    let close = get("close")?;
    let volume = get("volume")?;
    let returns = get("returns")?;
    let rsi14 = get("rsi14")?;
    let macd = get("macd")?;
    let ma20 = get("ma20")?;
    let sma_50 = get("sma_50")?;
    let bb_upper = get("bb_upper")?;
    let bb_lower = get("bb_lower")?;
    let volume_ma5 = get("volume_ma5")?;

    let records = parsed_dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| DailyRecord {
            ticker: ticker.to_string(),
            date,
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            volume: volume[i].map(|v| v.round() as i64),
            returns: returns[i],
            rsi14: rsi14[i],
            macd: macd[i],
            ma20: ma20[i],
            sma_50: sma_50[i],
            bb_upper: bb_upper[i],
            bb_lower: bb_lower[i],
            volume_ma5: volume_ma5[i],
        })
        .collect();

    Ok(records)
}
