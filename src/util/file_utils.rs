// External crates
use log::debug;
use polars::prelude::*;
use std::fs;
use std::path::Path;

// Internal modules
use crate::daily::records::PriceBar;
use crate::util::pre_processor::dataframe_to_bars;

/// Maps common spellings of OHLCV headers to the pipeline's column names
fn standard_column_name(column_name: &str) -> Option<&'static str> {
    let standard_name = match column_name.to_lowercase().trim() {
        "open" | "o" | "op" | "openprice" | "open_price" => "open",
        "high" | "h" | "highprice" | "high_price" | "max" => "high",
        "low" | "l" | "lowprice" | "low_price" | "min" => "low",
        "close" | "c" | "cl" | "closeprice" | "close_price" => "close",
        "volume" | "vol" | "v" | "volumes" => "volume",
        "timestamp" | "time" | "date" | "t" | "datetime" | "dt" | "day" => "date",
        _ => return None,
    };
    Some(standard_name)
}

/// Renames recognised columns in place, case-insensitively
///
/// The first column that maps to a standard name wins; later aliases of the
/// same field are left untouched.
pub fn standardize_columns(df: &mut DataFrame) -> PolarsResult<()> {
    let column_names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut taken: Vec<&'static str> = Vec::new();
    let mut rename_columns = Vec::new();
    for column_name in &column_names {
        if let Some(standard_name) = standard_column_name(column_name) {
            if taken.contains(&standard_name) {
                continue;
            }
            taken.push(standard_name);
            if column_name != standard_name {
                rename_columns.push((column_name.clone(), standard_name));
            }
        }
    }

    // A column already named e.g. "close" later in the frame would collide
    for (old_name, new_name) in &rename_columns {
        if column_names.iter().any(|c| c == new_name) {
            df.drop_in_place(new_name)?;
        }
        df.rename(old_name, (*new_name).into())?;
    }

    if !rename_columns.is_empty() {
        debug!("Renamed columns: {:?}", rename_columns);
    }
    Ok(())
}

/// Read a CSV file of daily bars into a DataFrame with standardized column names
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
///
/// # Returns
///
/// Returns a DataFrame with `date`, `open`, `high`, `low`, `close` and `volume`
pub fn read_price_csv<P: AsRef<Path>>(file_path: P) -> PolarsResult<DataFrame> {
    let path = file_path.as_ref();
    if !path.exists() {
        return Err(PolarsError::ComputeError(
            format!("File not found: {}", path.display()).into(),
        ));
    }

    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    standardize_columns(&mut df)?;
    Ok(df)
}

/// Load ordered, de-duplicated price bars from a CSV file
pub fn load_price_bars<P: AsRef<Path>>(file_path: P) -> PolarsResult<Vec<PriceBar>> {
    let df = read_price_csv(file_path)?;
    dataframe_to_bars(&df)
}

/// Serialize a value as pretty JSON and write it, creating parent directories
pub fn write_json<T: serde::Serialize, P: AsRef<Path>>(value: &T, path: P) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_price_csv_with_capitalized_headers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ASML.AS.csv");
        fs::write(
            &path,
            "Date,Open,High,Low,Close,Adj Close,Volume\n\
             2024-01-03,10.0,11.0,9.5,10.5,10.4,1000\n\
             2024-01-02,9.0,10.0,8.5,9.5,9.4,900\n\
             2024-01-03,10.0,11.0,9.5,10.7,10.6,1100\n",
        )
        .unwrap();

        let df = read_price_csv(&path).unwrap();
        for column in ["date", "open", "high", "low", "close", "volume"] {
            assert!(df.column(column).is_ok(), "missing column {}", column);
        }

        let bars = load_price_bars(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, Some(9.5));
        // duplicate date keeps the later row
        assert_eq!(bars[1].close, Some(10.7));
        assert_eq!(bars[1].volume, Some(1100.0));
    }

    #[test]
    fn test_read_price_csv_missing_file() {
        assert!(read_price_csv("does/not/exist.csv").is_err());
    }

    #[test]
    fn test_write_json_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");
        write_json(&serde_json::json!({"a": 1}), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"a\": 1"));
    }
}
