//! Process configuration read from `CLIBLE_*` environment variables.
//!
//! Only entry points call `CoreConfig::from_env`; everything else in the
//! core receives explicit values.

use crate::db::OpenOptions;
use crate::logging::{default_log_level, normalize_level};
use crate::service::verse_service::VerseServiceOptions;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DB_FILE: &str = "clible.db";
const DEFAULT_LOG_SUBDIR: &str = "logs";
const DEFAULT_API_BASE_URL: &str = "https://api.bible-api.com";
const DEFAULT_TRANSLATIONS: &str = "KJV,ESV,NIV";
const DEFAULT_REQUEST_TIMEOUT_SECS: &str = "10";
const DEFAULT_REQUEST_DELAY_SECS: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub api_base_url: String,
    /// Supported translation codes, in configured order.
    pub translations: Vec<String>,
    pub request_timeout: Duration,
    /// Minimum spacing between remote calls.
    pub request_delay: Duration,
    pub log_level: String,
    pub log_dir: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let value = |key: &str| env_value(&env_map, key);

        let data_dir = PathBuf::from(value("CLIBLE_DATA_DIR").unwrap_or(DEFAULT_DATA_DIR));
        let db_path = value("CLIBLE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DEFAULT_DB_FILE));
        let log_dir = value("CLIBLE_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DEFAULT_LOG_SUBDIR));

        let api_base_url = value("CLIBLE_API_BASE_URL")
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let translations: Vec<String> = value("CLIBLE_TRANSLATIONS")
            .unwrap_or(DEFAULT_TRANSLATIONS)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if translations.is_empty() {
            return Err(ConfigError::InvalidValue(
                "CLIBLE_TRANSLATIONS".to_string(),
                "must list at least one translation code".to_string(),
            ));
        }

        let request_timeout = parse_seconds(
            "CLIBLE_REQUEST_TIMEOUT",
            value("CLIBLE_REQUEST_TIMEOUT").unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )?;
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CLIBLE_REQUEST_TIMEOUT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let request_delay = parse_seconds(
            "CLIBLE_REQUEST_DELAY",
            value("CLIBLE_REQUEST_DELAY").unwrap_or(DEFAULT_REQUEST_DELAY_SECS),
        )?;

        let log_level = normalize_level(value("CLIBLE_LOG_LEVEL").unwrap_or(default_log_level()))
            .map_err(|err| {
                ConfigError::InvalidValue("CLIBLE_LOG_LEVEL".to_string(), err.to_string())
            })?
            .to_string();

        Ok(CoreConfig {
            data_dir,
            db_path,
            api_base_url,
            translations,
            request_timeout,
            request_delay,
            log_level,
            log_dir,
        })
    }

    /// Store options for `db::open_db`.
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::default()
    }

    pub fn verse_service_options(&self) -> VerseServiceOptions {
        VerseServiceOptions {
            request_delay: self.request_delay,
        }
    }

    /// Whether `code` is one of the configured translations, ignoring case.
    pub fn supports_translation(&self, code: &str) -> bool {
        let code = code.trim();
        self.translations
            .iter()
            .any(|known| known.eq_ignore_ascii_case(code))
    }
}

/// Trimmed value of `key`; blank values count as unset.
fn env_value<'a>(env_map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env_map
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
        ConfigError::InvalidValue(
            key.to_string(),
            format!("must be a whole number of seconds, got {raw}"),
        )
    })
}
