// External imports
use chrono::NaiveDate;
use log::debug;
use std::path::PathBuf;

// Internal imports
use crate::daily::records::PriceBar;
use crate::error::{PipelineError, PipelineResult};
use crate::util::file_utils::load_price_bars;

/// Anything that can deliver daily bars for a ticker over a date range
pub trait PriceSource {
    /// Ordered, de-duplicated bars with `start <= date <= end`
    ///
    /// An empty result means the source had nothing for this ticker.
    fn daily_bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> PipelineResult<Vec<PriceBar>>;
}

/// Reads `{dir}/{ticker}.csv` files of daily bars
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", ticker))
    }
}

impl PriceSource for CsvDirectorySource {
    fn daily_bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> PipelineResult<Vec<PriceBar>> {
        let path = self.path_for(ticker);
        if !path.is_file() {
            return Err(PipelineError::missing(
                ticker,
                "price file",
                path.display().to_string(),
            ));
        }

        let bars: Vec<PriceBar> = load_price_bars(&path)?
            .into_iter()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .collect();
        debug!("{}: read {} bars from {}", ticker, bars.len(), path.display());
        Ok(bars)
    }
}
