//! Configuration management
//!
//! Everything is read from the environment (a `.env` file is honoured) into
//! typed structs. Defaults live in the constants below.

use crate::error::{ExtractError, Result};
use crate::storage::StorageConfig;
use crate::window::parse_offset;
use chrono::{FixedOffset, Offset, Utc};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://api.alchemer.com";

/// Default API version.
pub const DEFAULT_API_VERSION: &str = "v5";

/// Default fixed offset the API reports timestamps in (US Eastern, standard time).
pub const DEFAULT_TIMEZONE: &str = "-05:00";

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default safety lag subtracted from "now" (one hour).
pub const DEFAULT_LAG_SECS: i64 = 3600;

/// Default local working directory.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default checkpoint file name inside the data directory.
pub const DEFAULT_STATE_FILE_NAME: &str = "state.json";

/// Default key prefix inside the bucket.
pub const DEFAULT_SCHEMA_NAME: &str = "surveygizmo";

/// Source of configuration values, keyed by variable name
pub trait Vars {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment
pub struct ProcessEnv;

impl Vars for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl<S: std::hash::BuildHasher> Vars for std::collections::HashMap<String, String, S> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned().filter(|v| !v.trim().is_empty())
    }
}

fn required(vars: &impl Vars, key: &str) -> Result<String> {
    vars.var(key)
        .ok_or_else(|| ExtractError::config(format!("{} is not set", key)))
}

fn parsed<T: std::str::FromStr>(vars: &impl Vars, key: &str) -> Result<Option<T>> {
    match vars.var(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ExtractError::config(format!("{} has an invalid value '{}'", key, raw))),
    }
}

pub(crate) fn flag(vars: &impl Vars, key: &str, default: bool) -> Result<bool> {
    match vars.var(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ExtractError::config(format!("{} must be a boolean, got '{}'", key, v))),
    }
}

/// Remote API connection settings
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub version: String,
    pub token: String,
    pub token_secret: String,
    pub timezone: FixedOffset,
    pub timeout_secs: u64,
    pub page_size: Option<u32>,
    pub degraded_retry: bool,
}

impl ApiConfig {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            version: DEFAULT_API_VERSION.to_string(),
            token: token.into(),
            token_secret: token_secret.into(),
            timezone: FixedOffset::west_opt(5 * 3600).unwrap_or_else(|| Utc.fix()),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_size: None,
            degraded_retry: true,
        }
    }

    pub fn from_vars(vars: &impl Vars) -> Result<Self> {
        let timezone = parse_offset(
            &vars
                .var("ALCHEMER_TIMEZONE")
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        )?;

        Ok(Self {
            base_url: vars
                .var("ALCHEMER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            version: vars
                .var("ALCHEMER_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            token: required(vars, "ALCHEMER_API_TOKEN")?,
            token_secret: required(vars, "ALCHEMER_API_TOKEN_SECRET")?,
            timezone,
            timeout_secs: parsed(vars, "ALCHEMER_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS),
            page_size: parsed(vars, "ALCHEMER_PAGE_SIZE")?,
            degraded_retry: flag(vars, "ALCHEMER_DEGRADED_RETRY", true)?,
        })
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("token", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .field("timezone", &self.timezone)
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .field("degraded_retry", &self.degraded_retry)
            .finish()
    }
}

/// Run bookkeeping settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Disqualified responses are pulled from July 1 of this year
    pub academic_year: i32,
    pub lag_secs: i64,
    pub data_dir: PathBuf,
    pub state_file: PathBuf,
    pub schema_name: String,
}

impl SyncConfig {
    fn data_dir(vars: &impl Vars) -> PathBuf {
        PathBuf::from(
            vars.var("SYNC_DATA_DIR")
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        )
    }

    /// `SYNC_STATE_FILE`, else `state.json` in the data directory
    pub fn default_state_file(vars: &impl Vars) -> PathBuf {
        vars.var("SYNC_STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::data_dir(vars).join(DEFAULT_STATE_FILE_NAME))
    }

    pub fn from_vars(vars: &impl Vars) -> Result<Self> {
        let academic_year = parsed(vars, "CURRENT_ACADEMIC_YEAR")?
            .ok_or_else(|| ExtractError::config("CURRENT_ACADEMIC_YEAR is not set"))?;
        Ok(Self {
            academic_year,
            lag_secs: parsed(vars, "SYNC_LAG_SECS")?.unwrap_or(DEFAULT_LAG_SECS),
            data_dir: Self::data_dir(vars),
            state_file: Self::default_state_file(vars),
            schema_name: vars
                .var("SYNC_SCHEMA_NAME")
                .unwrap_or_else(|| DEFAULT_SCHEMA_NAME.to_string()),
        })
    }
}

/// Full configuration of one extraction run
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub alert_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from the environment and a `.env` file, if any.
    /// `overrides` (CLI flags) are applied before validation.
    pub fn from_env_with(overrides: impl FnOnce(&mut Self)) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::read(&ProcessEnv)?;
        overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn from_vars(vars: &impl Vars) -> Result<Self> {
        let config = Self::read(vars)?;
        config.validate()?;
        Ok(config)
    }

    fn read(vars: &impl Vars) -> Result<Self> {
        let sync = SyncConfig::from_vars(vars)?;
        Ok(Self {
            api: ApiConfig::from_vars(vars)?,
            storage: StorageConfig::from_vars(vars, &sync.data_dir)?,
            sync,
            alert_webhook_url: vars.var("ALERT_WEBHOOK_URL"),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.token.is_empty() || self.api.token_secret.is_empty() {
            return Err(ExtractError::config("API token and secret must not be empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(ExtractError::config("ALCHEMER_TIMEOUT_SECS must be greater than 0"));
        }
        if self.api.page_size == Some(0) {
            return Err(ExtractError::config(
                "ALCHEMER_PAGE_SIZE must be greater than 0; 0 only probes totals",
            ));
        }
        if self.sync.lag_secs < 0 {
            return Err(ExtractError::config("SYNC_LAG_SECS must not be negative"));
        }
        if !(1900..=9999).contains(&self.sync.academic_year) {
            return Err(ExtractError::config(format!(
                "CURRENT_ACADEMIC_YEAR {} is out of range",
                self.sync.academic_year
            )));
        }
        if self.sync.schema_name.trim_matches('/').is_empty() {
            return Err(ExtractError::config("SYNC_SCHEMA_NAME must not be empty"));
        }
        self.storage.validate()
    }
}
