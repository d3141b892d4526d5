//! Command-line entry point: one subcommand per batch job, invoked by an
//! external scheduler. Exits 1 when any ticker failed or configuration is missing.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use burn::backend::{Autodiff, NdArray};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};

use stoxx_forecast_pipeline::built_info;
use stoxx_forecast_pipeline::constants::PRICES_TABLE;
use stoxx_forecast_pipeline::daily::sources::{CsvDirectorySource, PriceSource};
use stoxx_forecast_pipeline::daily::yahoo::YahooClient;
use stoxx_forecast_pipeline::error::PipelineResult;
use stoxx_forecast_pipeline::pipeline::jobs::{
    convert_job, fetch_job, forecast_ticker, publish_scalers_job, train_job,
};
use stoxx_forecast_pipeline::pipeline::JobReport;
use stoxx_forecast_pipeline::storage::local::{DirectoryStore, LocalTable};
use stoxx_forecast_pipeline::storage::supabase::SupabaseClient;
use stoxx_forecast_pipeline::storage::{ObjectStore, PriceTable};
use stoxx_forecast_pipeline::util::config::{PipelineSettings, StorageCredentials};

type InferenceBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferenceBackend>;

#[derive(Debug, Parser)]
#[command(name = "stoxx-forecast", version, about = "Train and publish per-ticker LSTM price forecasters")]
struct Cli {
    /// Local directory holding one artifact directory per ticker
    #[arg(long, global = true, default_value = "models")]
    models_dir: PathBuf,

    /// Comma-separated tickers, defaults to the built-in STOXX list
    #[arg(long, global = true, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Use a directory-backed store and table instead of Supabase
    #[arg(long, global = true, value_name = "DIR")]
    local_store: Option<PathBuf>,

    /// Skip listing the namespace after publishing
    #[arg(long, global = true)]
    no_verify: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// Read `{ticker}.csv` files from this directory instead of downloading
    #[arg(long)]
    csv_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TrainArgs {
    /// Override the maximum number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Override early stopping patience
    #[arg(long)]
    patience: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download prices, compute indicators and upsert them into the price table
    Fetch(FetchArgs),
    /// Train, convert and publish a model per ticker
    Train(TrainArgs),
    /// Re-convert locally trained models to TF.js and publish them
    Convert,
    /// Publish every local scaler (and metadata) to the bucket
    PublishScalers,
    /// Print the next trading days' closes for each ticker as JSON
    Forecast,
    /// Fetch followed by train
    Run {
        #[command(flatten)]
        fetch: FetchArgs,
        #[command(flatten)]
        train: TrainArgs,
    },
}

/// Storage collaborators chosen at startup
struct Backends {
    store: Box<dyn ObjectStore>,
    table: Box<dyn PriceTable>,
}

fn open_backends(cli: &Cli, settings: &PipelineSettings) -> PipelineResult<Backends> {
    if let Some(dir) = &cli.local_store {
        info!("Using local store at {}", dir.display());
        return Ok(Backends {
            store: Box::new(DirectoryStore::new(dir, &settings.bucket)),
            table: Box::new(LocalTable::new(dir.join(PRICES_TABLE))),
        });
    }

    let credentials = StorageCredentials::from_env()?;
    info!("Using Supabase project {}", credentials.url);
    let client = SupabaseClient::new(&credentials)?;
    Ok(Backends {
        store: Box::new(client.storage(&settings.bucket)),
        table: Box::new(client.table(&settings.table)),
    })
}

fn price_source(args: &FetchArgs) -> PipelineResult<Box<dyn PriceSource>> {
    Ok(match &args.csv_dir {
        Some(dir) => Box::new(CsvDirectorySource::new(dir)),
        None => Box::new(YahooClient::new()?),
    })
}

fn apply_training_overrides(mut settings: PipelineSettings, args: &TrainArgs) -> PipelineSettings {
    if let Some(epochs) = args.epochs {
        settings.training.epochs = epochs;
    }
    if let Some(patience) = args.patience {
        settings.training.patience = patience;
    }
    settings
}

fn run_fetch(settings: &PipelineSettings, backends: &Backends, args: &FetchArgs) -> PipelineResult<JobReport> {
    let source = price_source(args)?;
    let today = Local::now().date_naive();
    Ok(fetch_job(settings, source.as_ref(), backends.table.as_ref(), today))
}

fn run_train(settings: &PipelineSettings, backends: &Backends) -> PipelineResult<JobReport> {
    let device = Default::default();
    train_job::<TrainBackend, _, _>(settings, backends.table.as_ref(), backends.store.as_ref(), &device)
}

fn run_forecast(settings: &PipelineSettings, backends: &Backends) -> anyhow::Result<JobReport> {
    let device = Default::default();
    let mut report = JobReport::new("forecast");
    let mut forecasts = serde_json::Map::new();
    for ticker in &settings.tickers {
        let result = forecast_ticker::<InferenceBackend, _>(settings, backends.table.as_ref(), ticker, &device);
        match result {
            Ok(points) => {
                forecasts.insert(ticker.clone(), serde_json::to_value(&points)?);
                report.record(ticker, Ok(()));
            }
            Err(e) => report.record(ticker, Err(e)),
        }
    }
    println!("{}", serde_json::to_string_pretty(&forecasts)?);
    report.log_summary();
    Ok(report)
}

fn dispatch(cli: &Cli) -> anyhow::Result<JobReport> {
    let mut settings = PipelineSettings::default()
        .with_models_dir(&cli.models_dir)
        .with_tickers(cli.tickers.clone());
    settings.verify_uploads = !cli.no_verify;

    let backends = open_backends(cli, &settings)?;
    let report = match &cli.command {
        Command::Fetch(args) => run_fetch(&settings, &backends, args)?,
        Command::Train(args) => {
            let settings = apply_training_overrides(settings, args);
            run_train(&settings, &backends)?
        }
        Command::Convert => {
            let device = Default::default();
            convert_job::<InferenceBackend, _>(&settings, backends.store.as_ref(), &device)?
        }
        Command::PublishScalers => publish_scalers_job(&settings, backends.store.as_ref())?,
        Command::Forecast => run_forecast(&settings, &backends)?,
        Command::Run { fetch, train } => {
            let mut report = JobReport::new("run");
            report.absorb(run_fetch(&settings, &backends, fetch)?);
            let settings = apply_training_overrides(settings, train);
            report.absorb(run_train(&settings, &backends)?);
            report.log_summary();
            report
        }
    };
    Ok(report)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    info!(
        "{} {} (rustc {})",
        built_info::PKG_NAME,
        built_info::PKG_VERSION,
        built_info::RUSTC_VERSION
    );

    match dispatch(&cli).context("pipeline aborted") {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
