// External crates
use log::debug;
use std::env;
use std::path::PathBuf;

// Internal modules
use crate::constants::{
    FORECAST_DAYS, MODELS_BUCKET, MODELS_DIR, PRICES_TABLE, TICKERS, WINDOW_SIZE,
};
use crate::daily::lstm::step_4_train_model::TrainingConfig;
use crate::error::{PipelineError, PipelineResult};

pub const SUPABASE_URL_VAR: &str = "SUPABASE_URL";
pub const SUPABASE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

const REMEDIATION: &str = "Set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY in the environment \
     or in a .env file in the working directory, or pass --local-store DIR to run offline.";

/// Credentials for the remote object store and price table
#[derive(Clone)]
pub struct StorageCredentials {
    pub url: String,
    pub service_key: String,
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl StorageCredentials {
    /// Read credentials from the process environment, honouring a `.env` file
    pub fn from_env() -> PipelineResult<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build credentials from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> PipelineResult<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PipelineError::Config {
                    name: name.to_string(),
                    remediation: REMEDIATION.to_string(),
                })
        };

        let url = required(SUPABASE_URL_VAR)?;
        let service_key = required(SUPABASE_KEY_VAR)?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            service_key,
        })
    }
}

/// Everything a job needs besides its collaborators, resolved once at startup
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub models_dir: PathBuf,
    pub tickers: Vec<String>,
    pub bucket: String,
    pub table: String,
    pub window_size: usize,
    pub forecast_days: usize,
    pub training: TrainingConfig,
    /// List the namespace after publishing and re-write anything missing
    pub verify_uploads: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from(MODELS_DIR),
            tickers: TICKERS.iter().map(|t| t.to_string()).collect(),
            bucket: MODELS_BUCKET.to_string(),
            table: PRICES_TABLE.to_string(),
            window_size: WINDOW_SIZE,
            forecast_days: FORECAST_DAYS,
            training: TrainingConfig::default(),
            verify_uploads: true,
        }
    }
}

impl PipelineSettings {
    pub fn with_models_dir(mut self, models_dir: impl Into<PathBuf>) -> Self {
        self.models_dir = models_dir.into();
        self
    }

    /// Replace the default ticker list; an empty list keeps the defaults
    pub fn with_tickers(mut self, tickers: Vec<String>) -> Self {
        let tickers: Vec<String> = tickers
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if !tickers.is_empty() {
            self.tickers = tickers;
        }
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_credentials_from_lookup() {
        let creds = StorageCredentials::from_lookup(lookup(&[
            (SUPABASE_URL_VAR, "https://abc.supabase.co/"),
            (SUPABASE_KEY_VAR, "secret"),
        ]))
        .unwrap();
        assert_eq!(creds.url, "https://abc.supabase.co");
        assert_eq!(creds.service_key, "secret");
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn test_missing_key_is_config_error_with_remediation() {
        let err = StorageCredentials::from_lookup(lookup(&[(SUPABASE_URL_VAR, "https://abc.supabase.co")]))
            .unwrap_err();
        match &err {
            PipelineError::Config { name, .. } => assert_eq!(name, SUPABASE_KEY_VAR),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.to_string().contains(".env"));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let err = StorageCredentials::from_lookup(lookup(&[
            (SUPABASE_URL_VAR, "  "),
            (SUPABASE_KEY_VAR, "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    #[test]
    fn test_settings_defaults_and_overrides() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.tickers.len(), TICKERS.len());
        assert_eq!(settings.bucket, "models");
        assert_eq!(settings.window_size, 7);
        assert_eq!(settings.forecast_days, 3);

        let settings = settings
            .with_tickers(vec!["SAP.DE".into(), " ".into()])
            .with_models_dir("/tmp/m");
        assert_eq!(settings.tickers, vec!["SAP.DE".to_string()]);
        assert_eq!(settings.models_dir, PathBuf::from("/tmp/m"));

        let unchanged = PipelineSettings::default().with_tickers(Vec::new());
        assert_eq!(unchanged.tickers.len(), TICKERS.len());
    }
}
