use crate::database::{TableRef, DEFAULT_LOCK_TABLE};
use crate::quoting::QuotingStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `lock.enabled`.
pub const ENABLED_ENV: &str = "MIGRALOCK_LOCK_ENABLED";

const DEFAULT_WAIT_TIME_SECS: u64 = 300;
const DEFAULT_RECHECK_TIME_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    #[serde(default)]
    pub lock: LockSection,
    #[serde(default)]
    pub table: TableSection,
    #[serde(default)]
    pub database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LockSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,
    #[serde(default = "default_recheck_time_secs")]
    pub recheck_time_secs: u64,
    #[serde(default)]
    pub locked_by: Option<String>,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            wait_time_secs: default_wait_time_secs(),
            recheck_time_secs: default_recheck_time_secs(),
            locked_by: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TableSection {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_table_name")]
    pub name: String,
    #[serde(default)]
    pub quoting: QuotingStrategy,
}

impl Default for TableSection {
    fn default() -> Self {
        Self {
            catalog: None,
            schema: None,
            name: default_table_name(),
            quoting: QuotingStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_wait_time_secs() -> u64 {
    DEFAULT_WAIT_TIME_SECS
}

fn default_recheck_time_secs() -> u64 {
    DEFAULT_RECHECK_TIME_SECS
}

fn default_table_name() -> String {
    DEFAULT_LOCK_TABLE.to_owned()
}

impl LockConfig {
    pub fn parse_str(input: &str) -> Result<Self, ConfigError> {
        let config: LockConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Load `path` if given (defaults otherwise) and apply environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_enabled_override(std::env::var(ENABLED_ENV).ok().as_deref())?;
        Ok(config)
    }

    pub fn apply_enabled_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        let Some(value) = value else {
            return Ok(());
        };
        self.lock.enabled = parse_bool(value).ok_or_else(|| {
            ConfigError::Invalid(format!("{ENABLED_ENV} must be a boolean, got '{value}'"))
        })?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.table.name.trim().is_empty() {
            return Err(ConfigError::Invalid("table.name must not be empty".to_owned()));
        }
        if self.lock.recheck_time_secs == 0 {
            return Err(ConfigError::Invalid(
                "lock.recheck_time_secs must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef {
            catalog: self.table.catalog.clone(),
            schema: self.table.schema.clone(),
            name: self.table.name.clone(),
        }
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.lock.wait_time_secs)
    }

    pub fn recheck_time(&self) -> Duration {
        Duration::from_secs(self.lock.recheck_time_secs)
    }

    /// Owner recorded in the lock row.
    pub fn locked_by(&self) -> String {
        self.lock.locked_by.clone().unwrap_or_else(default_owner)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `user@host (pid N)` for the current process.
pub fn default_owner() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_owned());
    let host = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_owned())
        })
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_owned());
    format!("{user}@{host} (pid {})", std::process::id())
}
