//! Batch jobs that run one ticker at a time and report an aggregate outcome.

pub mod jobs;

// External imports
use log::{error, info, warn};

// Internal imports
use crate::error::PipelineResult;

/// Outcome of a job across all of its tickers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    pub job: String,
    pub succeeded: Vec<String>,
    /// Tickers without usable input, with the reason
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

impl JobReport {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            ..Default::default()
        }
    }

    /// Classify one ticker's result: skips are logged as warnings and do not fail the job
    pub fn record(&mut self, ticker: &str, result: PipelineResult<()>) {
        match result {
            Ok(()) => {
                info!("[{}] {} done", self.job, ticker);
                self.succeeded.push(ticker.to_string());
            }
            Err(e) if e.is_skip() => {
                warn!("[{}] skipping {}: {}", self.job, ticker, e);
                self.skipped.push((ticker.to_string(), e.to_string()));
            }
            Err(e) => {
                error!("[{}] {} failed: {}", self.job, ticker, e);
                self.failed.push((ticker.to_string(), e.to_string()));
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Process exit code: 1 if any ticker failed
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Fold another job's report into this one, e.g. for `run`
    pub fn absorb(&mut self, other: JobReport) {
        self.succeeded.extend(other.succeeded);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn log_summary(&self) {
        info!(
            "[{}] {} succeeded, {} skipped, {} failed",
            self.job,
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        );
        if !self.succeeded.is_empty() {
            info!("[{}] succeeded: {}", self.job, self.succeeded.join(", "));
        }
        for (ticker, reason) in &self.skipped {
            warn!("[{}] skipped {}: {}", self.job, ticker, reason);
        }
        for (ticker, reason) in &self.failed {
            error!("[{}] failed {}: {}", self.job, ticker, reason);
        }
    }
}

/// Run `step` for each ticker in order, catching failures at the ticker boundary
pub fn run_per_ticker<F>(job: &str, tickers: &[String], mut step: F) -> JobReport
where
    F: FnMut(&str) -> PipelineResult<()>,
{
    let mut report = JobReport::new(job);
    for (i, ticker) in tickers.iter().enumerate() {
        info!("[{}] ({}/{}) {}", job, i + 1, tickers.len(), ticker);
        report.record(ticker, step(ticker));
    }
    report.log_summary();
    report
}
