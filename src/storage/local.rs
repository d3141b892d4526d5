//! Directory-backed stand-ins for the hosted store and table, used for
//! offline runs.

// External imports
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// Internal imports
use super::{ObjectStore, PriceTable, StorageResult};
use crate::daily::records::DailyRecord;
use crate::error::StorageError;
use crate::util::file_utils::write_json;

/// Objects stored as files under `{root}/{bucket}/{path}`
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    bucket: String,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>, bucket: &str) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.to_string(),
        }
    }

    /// Create the bucket directory, like creating the bucket on a hosted store
    pub fn create_bucket(&self) -> StorageResult<()> {
        fs::create_dir_all(self.root.join(&self.bucket))?;
        Ok(())
    }

    pub fn object_file(&self, path: &str) -> PathBuf {
        self.root.join(&self.bucket).join(path)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> StorageResult<()> {
        let file = self.object_file(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(file, bytes)?;
        Ok(())
    }
}

impl ObjectStore for DirectoryStore {
    fn upload(&self, path: &str, bytes: &[u8], _content_type: &str, upsert: bool) -> StorageResult<()> {
        if !upsert && self.object_file(path).exists() {
            return Err(StorageError::Conflict {
                path: path.to_string(),
            });
        }
        self.write(path, bytes)
    }

    fn update(&self, path: &str, bytes: &[u8], _content_type: &str) -> StorageResult<()> {
        if !self.object_file(path).is_file() {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        self.write(path, bytes)
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = self.object_file(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn list_buckets(&self) -> StorageResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut buckets = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                buckets.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        buckets.sort();
        Ok(buckets)
    }
}

/// Price rows stored as one JSON file per ticker under `dir`
#[derive(Debug, Clone)]
pub struct LocalTable {
    dir: PathBuf,
}

impl LocalTable {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ticker_file(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.json", ticker))
    }

    fn read_ticker(path: &Path) -> StorageResult<BTreeMap<NaiveDate, DailyRecord>> {
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let rows: Vec<DailyRecord> = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(rows.into_iter().map(|r| (r.date, r)).collect())
    }
}

impl PriceTable for LocalTable {
    fn upsert(&self, records: &[DailyRecord]) -> StorageResult<()> {
        let mut by_ticker: BTreeMap<&str, Vec<&DailyRecord>> = BTreeMap::new();
        for record in records {
            by_ticker.entry(record.ticker.as_str()).or_default().push(record);
        }

        for (ticker, rows) in by_ticker {
            let path = self.ticker_file(ticker);
            let mut existing = Self::read_ticker(&path)?;
            for row in rows {
                existing.insert(row.date, row.clone());
            }
            let merged: Vec<&DailyRecord> = existing.values().collect();
            write_json(&merged, &path)?;
        }
        Ok(())
    }

    fn select(&self, ticker: &str) -> StorageResult<Vec<DailyRecord>> {
        Ok(Self::read_ticker(&self.ticker_file(ticker))?
            .into_values()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::generate_daily_records;
    use tempfile::tempdir;

    #[test]
    fn test_directory_store_conflict_and_update() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path(), "models");

        store.upload("SAP.DE/a.json", b"1", "application/json", false).unwrap();
        let err = store
            .upload("SAP.DE/a.json", b"2", "application/json", false)
            .unwrap_err();
        assert!(err.is_conflict());

        store.update("SAP.DE/a.json", b"3", "application/json").unwrap();
        assert_eq!(fs::read(store.object_file("SAP.DE/a.json")).unwrap(), b"3");
        store.upload("SAP.DE/a.json", b"4", "application/json", true).unwrap();
        assert_eq!(fs::read(store.object_file("SAP.DE/a.json")).unwrap(), b"4");

        assert!(matches!(
            store.update("SAP.DE/missing.bin", b"x", "application/octet-stream"),
            Err(StorageError::NotFound { .. })
        ));
        assert_eq!(store.list("SAP.DE").unwrap(), vec!["a.json".to_string()]);
        assert!(store.list("MC.PA").unwrap().is_empty());
        assert_eq!(store.list_buckets().unwrap(), vec!["models".to_string()]);
    }

    #[test]
    fn test_list_buckets_does_not_create_the_bucket() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("store"), "models");
        assert!(store.list_buckets().unwrap().is_empty());
        assert!(!dir.path().join("store").exists());

        store.create_bucket().unwrap();
        assert_eq!(store.list_buckets().unwrap(), vec!["models".to_string()]);
    }

    #[test]
    fn test_local_table_upsert_merges_by_date() {
        let dir = tempdir().unwrap();
        let table = LocalTable::new(dir.path());
        let records = generate_daily_records("SIE.DE", 60, 4);
        assert_eq!(records.len(), 11);

        table.upsert(&records[..8]).unwrap();
        let mut changed = records[7].clone();
        changed.close = Some(1.0);
        let mut second = vec![changed];
        second.extend_from_slice(&records[8..]);
        table.upsert(&second).unwrap();

        let rows = table.select("SIE.DE").unwrap();
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[7].close, Some(1.0));
        assert!(rows.windows(2).all(|w| w[0].date < w[1].date));
        assert!(table.select("OR.PA").unwrap().is_empty());
    }
}
