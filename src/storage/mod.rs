//! Remote system of record: an object store for model artifacts and a table
//! of daily prices. Both sit behind small traits so jobs can run against the
//! hosted backend or a local directory.

pub mod local;
pub mod publisher;
pub mod supabase;

// External imports
use log::info;

// Internal imports
use crate::daily::records::DailyRecord;
use crate::error::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Blob storage scoped to one bucket
pub trait ObjectStore {
    /// Create an object; with `upsert` an existing object may be overwritten
    fn upload(&self, path: &str, bytes: &[u8], content_type: &str, upsert: bool) -> StorageResult<()>;

    /// Overwrite an existing object
    fn update(&self, path: &str, bytes: &[u8], content_type: &str) -> StorageResult<()>;

    /// Names of the objects directly under `prefix`
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    fn list_buckets(&self) -> StorageResult<Vec<String>>;
}

/// The `daily_prices` table, keyed by `(ticker, date)`
pub trait PriceTable {
    /// Insert or merge one batch of rows
    fn upsert(&self, records: &[DailyRecord]) -> StorageResult<()>;

    /// All rows of a ticker ordered by date
    fn select(&self, ticker: &str) -> StorageResult<Vec<DailyRecord>>;
}

/// Content type sent with an artifact, inferred from its extension
pub fn content_type_for(filename: &str) -> &'static str {
    if filename.to_ascii_lowercase().ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

/// Object path of `filename` inside a ticker's namespace
pub fn object_path(namespace: &str, filename: &str) -> String {
    format!(
        "{}/{}",
        namespace.trim_end_matches('/'),
        filename.trim_start_matches('/')
    )
}

/// Upsert rows in fixed-size batches, returning the number written
pub fn upsert_in_batches<T: PriceTable + ?Sized>(
    table: &T,
    records: &[DailyRecord],
    batch_size: usize,
) -> StorageResult<usize> {
    let mut written = 0;
    for (i, batch) in records.chunks(batch_size.max(1)).enumerate() {
        table.upsert(batch)?;
        written += batch.len();
        info!("Upserted batch {} ({} rows)", i + 1, batch.len());
    }
    Ok(written)
}
