// Tickers trained by default (yfinance symbols of the largest STOXX Europe 600 members)
pub const TICKERS: [&str; 10] = [
    "ASML.AS",
    "SAP.DE",
    "NESN.SW",
    "MC.PA",
    "NOVO-B.CO",
    "NOVN.SW",
    "ROG.SW",
    "TTE.PA",
    "SIE.DE",
    "OR.PA",
];

// Feature order is part of the persisted scaler and of the browser inference
// contract. Never reorder.
pub const FEATURES: [&str; 10] = [
    "close",
    "returns",
    "volume",
    "rsi14",
    "macd",
    "ma20",
    "sma_50",
    "bb_upper",
    "bb_lower",
    "volume_ma5",
];

/// Column index of the close price inside `FEATURES`
pub const CLOSE_INDEX: usize = 0;

// Raw price columns
pub const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

// Indicator windows
pub const RSI_WINDOW: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const SMA_SHORT_WINDOW: usize = 20;
pub const SMA_LONG_WINDOW: usize = 50;
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_NUM_STD: f64 = 2.0;
pub const VOLUME_MA_WINDOW: usize = 5;

// Model parameters
pub const WINDOW_SIZE: usize = 7; // last trading week as input
pub const FORECAST_DAYS: usize = 3; // multi-output horizon
pub const LSTM_UNITS: usize = 64;
pub const DROPOUT: f64 = 0.2;

// Training parameters
pub const BATCH_SIZE: usize = 32;
pub const EPOCHS: usize = 100;
pub const PATIENCE: usize = 10;
pub const LEARNING_RATE: f64 = 0.001;
pub const VALIDATION_SPLIT_RATIO: f64 = 0.2; // 20% of sequences for validation
pub const SHUFFLE_SEED: u64 = 42;

// Minimum data required for a stable fit
pub const MIN_TRAINING_ROWS: usize = 100;
pub const MIN_SEQUENCES: usize = 50;

// Data acquisition
pub const LOOKBACK_YEARS: i64 = 5;
pub const UPSERT_BATCH_SIZE: usize = 1000;
pub const SELECT_PAGE_SIZE: usize = 1000;

// Remote storage
pub const MODELS_BUCKET: &str = "models";
pub const PRICES_TABLE: &str = "daily_prices";

// Local artifact layout
pub const MODELS_DIR: &str = "models";
pub const MODEL_RECORD_NAME: &str = "model"; // recorder appends ".bin"
pub const MODEL_RECORD_FILE: &str = "model.bin";
pub const MODEL_CONFIG_FILE: &str = "model_config.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const TFJS_DIR: &str = "tfjs";
pub const TFJS_MODEL_FILE: &str = "model.json";

// TF.js weight sharding
pub const TFJS_SHARD_SIZE_BYTES: usize = 4 * 1024 * 1024;
