// External imports
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Internal imports
use crate::daily::records::{DailyRecord, PriceBar};
use crate::util::pre_processor::prepare_daily_records;

/// Generate a deterministic random walk of daily bars on trading days
pub fn generate_price_bars(num_rows: usize, seed: u64) -> Vec<PriceBar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut date = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();

    // Start with a base price around 100
    let mut current_price: f64 = 100.0 + rng.random::<f64>() * 50.0;
    let mut bars = Vec::with_capacity(num_rows);

    for _ in 0..num_rows {
        // Random price movement between -1% and +1%
        let movement = (rng.random::<f64>() * 2.0 - 1.0) * 0.01;
        current_price *= 1.0 + movement;

        // Generate open, high, low with realistic relationships to close
        let open = current_price * (1.0 + (rng.random::<f64>() * 0.01 - 0.005));
        let high = current_price.max(open) * (1.0 + rng.random::<f64>() * 0.005);
        let low = current_price.min(open) * (1.0 - rng.random::<f64>() * 0.005);
        let volume = (rng.random::<u32>() % 100_000 + 10_000) as f64;

        bars.push(PriceBar {
            date,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(current_price),
            volume: Some(volume),
        });

        date += Duration::days(1);
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
        }
    }

    bars
}

/// Complete table rows for a synthetic ticker; `num_bars - 49` rows survive warmup
pub fn generate_daily_records(ticker: &str, num_bars: usize, seed: u64) -> Vec<DailyRecord> {
    prepare_daily_records(ticker, generate_price_bars(num_bars, seed))
        .expect("synthetic bars always produce indicators")
}
