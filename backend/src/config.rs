//! Process configuration, read once at startup.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;

pub const ENV_BACKEND: &str = "FINEDU_BACKEND";
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_DATA_DIR: &str = "FINEDU_DATA_DIR";
pub const ENV_APP_ORIGIN: &str = "FINEDU_APP_ORIGIN";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "FINEDU_HTTP_TIMEOUT_SECS";

const DEFAULT_APP_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid backend mode '{0}': expected local, supabase, remote or auto")]
    InvalidBackendMode(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("could not determine a data directory; set FINEDU_DATA_DIR")]
    NoDataDirectory,
}

/// Routing policy between the remote and the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendMode {
    /// Never touch the remote store.
    Local,
    /// Always try the remote store first.
    Remote,
    /// Try the remote store when online and configured.
    #[default]
    Auto,
}

impl BackendMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(BackendMode::Local),
            "remote" | "supabase" => Ok(BackendMode::Remote),
            "auto" | "" => Ok(BackendMode::Auto),
            other => Err(ConfigError::InvalidBackendMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Local => "local",
            BackendMode::Remote => "remote",
            BackendMode::Auto => "auto",
        }
    }
}

/// Immutable application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_mode: BackendMode,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub data_dir: PathBuf,
    /// Origin used to build invitation links.
    pub app_origin: String,
    pub http_timeout: Duration,
}

impl AppConfig {
    /// Create config from environment variables.
    ///
    /// - `FINEDU_BACKEND`: `local`, `supabase`/`remote` or `auto` (default)
    /// - `SUPABASE_URL`, `SUPABASE_ANON_KEY`: remote credentials, both required
    /// - `FINEDU_DATA_DIR`: local store directory (default: platform data dir)
    /// - `FINEDU_APP_ORIGIN`: origin for invitation links
    /// - `FINEDU_HTTP_TIMEOUT_SECS`: remote request timeout (default: 15)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend_mode = match get(ENV_BACKEND) {
            Some(value) => BackendMode::parse(&value)?,
            None => BackendMode::default(),
        };

        let data_dir = match get(ENV_DATA_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .map(|d| d.join("finedu"))
                .ok_or(ConfigError::NoDataDirectory)?,
        };

        let http_timeout = match get(ENV_HTTP_TIMEOUT_SECS) {
            Some(value) => {
                let secs = value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_HTTP_TIMEOUT_SECS,
                    value: value.clone(),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let config = Self {
            backend_mode,
            supabase_url: get(ENV_SUPABASE_URL).map(|u| u.trim_end_matches('/').to_string()),
            supabase_anon_key: get(ENV_SUPABASE_ANON_KEY),
            data_dir,
            app_origin: get(ENV_APP_ORIGIN).unwrap_or_else(|| DEFAULT_APP_ORIGIN.to_string()),
            http_timeout,
        };

        if config.backend_mode == BackendMode::Remote && !config.has_remote_credentials() {
            warn!("Backend mode is remote but Supabase credentials are missing; running local-only");
        }

        Ok(config)
    }

    /// Configuration for tests: a given directory, mode and optional fake credentials.
    pub fn for_testing(data_dir: impl Into<PathBuf>, backend_mode: BackendMode, with_remote: bool) -> Self {
        Self {
            backend_mode,
            supabase_url: with_remote.then(|| "http://localhost:54321".to_string()),
            supabase_anon_key: with_remote.then(|| "test-anon-key".to_string()),
            data_dir: data_dir.into(),
            app_origin: DEFAULT_APP_ORIGIN.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// Both the endpoint and the key are present.
    pub fn has_remote_credentials(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }
}
