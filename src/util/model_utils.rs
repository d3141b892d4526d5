// External crates
use std::fs;
use std::path::{Path, PathBuf};

// Internal modules
use crate::constants::{
    METADATA_FILE, MODEL_CONFIG_FILE, MODEL_RECORD_FILE, MODEL_RECORD_NAME, SCALER_FILE,
    TFJS_DIR, TFJS_MODEL_FILE,
};

/// Local file layout of one ticker's artifacts under `{models_dir}/{ticker}/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub ticker: String,
    pub base: PathBuf,
}

impl ArtifactPaths {
    pub fn for_ticker<P: AsRef<Path>>(models_dir: P, ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            base: models_dir.as_ref().join(ticker),
        }
    }

    /// Path handed to burn's file recorder, which appends the `.bin` extension itself
    pub fn model_record_stem(&self) -> PathBuf {
        self.base.join(MODEL_RECORD_NAME)
    }

    pub fn model_record(&self) -> PathBuf {
        self.base.join(MODEL_RECORD_FILE)
    }

    pub fn model_config(&self) -> PathBuf {
        self.base.join(MODEL_CONFIG_FILE)
    }

    pub fn scaler(&self) -> PathBuf {
        self.base.join(SCALER_FILE)
    }

    pub fn metadata(&self) -> PathBuf {
        self.base.join(METADATA_FILE)
    }

    pub fn tfjs_dir(&self) -> PathBuf {
        self.base.join(TFJS_DIR)
    }

    pub fn tfjs_model(&self) -> PathBuf {
        self.tfjs_dir().join(TFJS_MODEL_FILE)
    }

    /// A trained model needs both its weights and its architecture on disk
    pub fn has_trained_model(&self) -> bool {
        self.model_record().is_file() && self.model_config().is_file()
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base)
    }
}

/// Tickers that have a model directory under `models_dir`, sorted by name
pub fn list_model_dirs<P: AsRef<Path>>(models_dir: P) -> std::io::Result<Vec<String>> {
    let models_dir = models_dir.as_ref();
    if !models_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut tickers = Vec::new();
    for entry in fs::read_dir(models_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            tickers.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    tickers.sort();
    Ok(tickers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_artifact_layout() {
        let paths = ArtifactPaths::for_ticker("models", "SAP.DE");
        assert_eq!(paths.model_record(), PathBuf::from("models/SAP.DE/model.bin"));
        assert_eq!(paths.model_record_stem().with_extension("bin"), paths.model_record());
        assert_eq!(paths.model_config(), PathBuf::from("models/SAP.DE/model_config.json"));
        assert_eq!(paths.scaler(), PathBuf::from("models/SAP.DE/scaler.json"));
        assert_eq!(paths.metadata(), PathBuf::from("models/SAP.DE/metadata.json"));
        assert_eq!(paths.tfjs_model(), PathBuf::from("models/SAP.DE/tfjs/model.json"));
    }

    #[test]
    fn test_list_model_dirs_ignores_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("SAP.DE")).unwrap();
        fs::create_dir_all(dir.path().join("ASML.AS")).unwrap();
        fs::write(dir.path().join("README"), "x").unwrap();
        assert_eq!(
            list_model_dirs(dir.path()).unwrap(),
            vec!["ASML.AS".to_string(), "SAP.DE".to_string()]
        );
        assert!(list_model_dirs(dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_has_trained_model_requires_both_files() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::for_ticker(dir.path(), "MC.PA");
        paths.ensure_dirs().unwrap();
        assert!(!paths.has_trained_model());
        fs::write(paths.model_record(), b"w").unwrap();
        assert!(!paths.has_trained_model());
        fs::write(paths.model_config(), b"{}").unwrap();
        assert!(paths.has_trained_model());
    }
}
