//! Daily bars from the Yahoo Finance chart API.

// External imports
use chrono::{DateTime, Duration, NaiveDate};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration as StdDuration;

// Internal imports
use crate::daily::records::{normalize_bars, PriceBar};
use crate::daily::sources::PriceSource;
use crate::error::{PipelineError, PipelineResult};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

/// Parse a chart API body into bars dated in the exchange's local calendar
pub fn parse_chart(ticker: &str, body: &str) -> PipelineResult<Vec<PriceBar>> {
    let response: ChartResponse = serde_json::from_str(body)?;
    if let Some(error) = response.chart.error {
        return Err(PipelineError::Download {
            ticker: ticker.to_string(),
            message: format!("{} - {}", error.code, error.description),
        });
    }

    let Some(data) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |column: &Vec<Option<f64>>, i: usize| column.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(data.timestamp.len());
    for (i, &ts) in data.timestamp.iter().enumerate() {
        let local = DateTime::from_timestamp(ts + data.meta.gmtoffset, 0).ok_or_else(|| {
            PipelineError::Download {
                ticker: ticker.to_string(),
                message: format!("invalid timestamp {}", ts),
            }
        })?;
        bars.push(PriceBar {
            date: local.date_naive(),
            open: at(&quote.open, i),
            high: at(&quote.high, i),
            low: at(&quote.low, i),
            close: at(&quote.close, i),
            volume: at(&quote.volume, i),
        });
    }

    Ok(normalize_bars(bars))
}

/// Blocking Yahoo chart client
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new() -> PipelineResult<Self> {
        Self::with_base_url(CHART_URL)
    }

    pub fn with_base_url(base_url: &str) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| PipelineError::Download {
                ticker: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn unix_seconds(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

impl PriceSource for YahooClient {
    fn daily_bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> PipelineResult<Vec<PriceBar>> {
        let url = format!("{}/{}", self.base_url, ticker);
        let period1 = unix_seconds(start).to_string();
        let period2 = unix_seconds(end + Duration::days(1)).to_string();
        debug!("GET {} [{} .. {}]", url, start, end);

        let download_error = |message: String| PipelineError::Download {
            ticker: ticker.to_string(),
            message,
        };
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
                ("events", "history"),
            ])
            .send()
            .map_err(|e| download_error(e.to_string()))?;

        let status = response.status();
        let body = response.text().map_err(|e| download_error(e.to_string()))?;
        // the API reports unknown symbols as 404 with a JSON error body
        if !status.is_success() && status.as_u16() != 404 {
            return Err(download_error(format!("HTTP {}", status)));
        }

        let bars: Vec<PriceBar> = match parse_chart(ticker, &body) {
            Err(PipelineError::Download { .. }) if status.as_u16() == 404 => Vec::new(),
            other => other?,
        };
        let bars = bars
            .into_iter()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .collect::<Vec<_>>();
        info!("{}: downloaded {} daily bars", ticker, bars.len());
        Ok(bars)
    }
}
