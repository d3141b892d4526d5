// External crates
use chrono::NaiveDate;
use polars::prelude::*;

// Local modules
use crate::constants::PRICE_COLUMNS;
use crate::daily::records::{normalize_bars, DailyRecord, PriceBar};
use crate::util::feature_engineering::{
    column_values, compute_indicators, drop_incomplete_rows, frame_to_records,
};

/// Builds a frame with `date` plus the raw price columns from ordered bars
pub fn bars_to_dataframe(bars: &[PriceBar]) -> PolarsResult<DataFrame> {
    let dates: Vec<String> = bars
        .iter()
        .map(|bar| bar.date.format("%Y-%m-%d").to_string())
        .collect();
    let field = |f: fn(&PriceBar) -> Option<f64>| -> Vec<Option<f64>> { bars.iter().map(f).collect() };

    DataFrame::new(vec![
        Series::new("date".into(), dates).into(),
        Series::new("open".into(), field(|b| b.open)).into(),
        Series::new("high".into(), field(|b| b.high)).into(),
        Series::new("low".into(), field(|b| b.low)).into(),
        Series::new("close".into(), field(|b| b.close)).into(),
        Series::new("volume".into(), field(|b| b.volume)).into(),
    ])
}

/// Reads price bars back out of a frame with `date` and the raw price columns
pub fn dataframe_to_bars(df: &DataFrame) -> PolarsResult<Vec<PriceBar>> {
    for &col in ["date"].iter().chain(PRICE_COLUMNS.iter()) {
        if df.column(col).is_err() {
            return Err(PolarsError::ColumnNotFound(
                format!("Required column {} not found", col).into(),
            ));
        }
    }

    let dates_column = df.column("date")?.cast(&DataType::String)?;
    let dates = dates_column.str()?;
    let open = column_values(df, "open")?;
    let high = column_values(df, "high")?;
    let low = column_values(df, "low")?;
    let close = column_values(df, "close")?;
    let volume = column_values(df, "volume")?;

    let mut bars = Vec::with_capacity(df.height());
    for (i, value) in dates.into_iter().enumerate() {
        // Rows without a date cannot be keyed and are dropped
        let Some(raw) = value else { continue };
        let day = raw.get(..10).unwrap_or(raw);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
            PolarsError::ComputeError(format!("Invalid date '{}': {}", raw, e).into())
        })?;
        bars.push(PriceBar {
            date,
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            volume: volume[i],
        });
    }

    Ok(normalize_bars(bars))
}

/// Turns raw bars for one ticker into complete table rows
///
/// Bars are ordered and de-duplicated by date, indicators are computed and the
/// warmup rows without a complete feature vector are dropped.
pub fn prepare_daily_records(ticker: &str, bars: Vec<PriceBar>) -> PolarsResult<Vec<DailyRecord>> {
    let bars = normalize_bars(bars);
    let df = bars_to_dataframe(&bars)?;
    let with_indicators = compute_indicators(&df)?;
    let complete = drop_incomplete_rows(&with_indicators)?;
    frame_to_records(ticker, &complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::generate_price_bars;

    #[test]
    fn test_bars_round_trip_through_dataframe() {
        let bars = generate_price_bars(30, 1);
        let df = bars_to_dataframe(&bars).unwrap();
        assert_eq!(df.height(), 30);
        let back = dataframe_to_bars(&df).unwrap();
        assert_eq!(back, bars);
    }

    #[test]
    fn test_prepare_daily_records_drops_warmup_and_duplicates() {
        let mut bars = generate_price_bars(150, 9);
        // a re-delivered day must not create a second row
        bars.push(bars[120].clone());
        let records = prepare_daily_records("SIE.DE", bars).unwrap();
        assert_eq!(records.len(), 150 - 49);
        assert!(records.windows(2).all(|w| w[0].date < w[1].date));
        assert!(records.iter().all(|r| r.feature_vector().is_some()));
    }
}
