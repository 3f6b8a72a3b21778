//! Runtime configuration loaded from `blueprint.toml`.
//!
//! # Responsibility
//! - Parse the TOML config file into typed sections.
//! - Apply `BLUEPRINT_{SECTION}_{FIELD}` environment overrides.
//! - Validate values before any connection or logger is opened.
//!
//! # Invariants
//! - Loading order is defaults -> file -> environment -> validation.
//! - A missing section falls back to its `Default`.

use crate::logging::normalize_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_BUSY_TIMEOUT_MS: u64 = 1;
const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;

/// Errors raised while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file does not exist.
    FileNotFound(PathBuf),
    /// Config file exists but cannot be read.
    Io { path: PathBuf, source: std::io::Error },
    /// TOML is malformed or has unexpected field types.
    Parse(String),
    /// A field holds a value outside its accepted range.
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileNotFound(path) => write!(f, "config file not found: {}", path.display()),
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(reason) => write!(f, "failed to parse config: {reason}"),
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid config value for `{field}`: {reason}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// How a save treats associations committed by other sessions after this
/// session took its snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Re-read the persisted set at save time and apply staged edits on top.
    #[default]
    Merge,
    /// Fail with a conflict whenever the template changed since the snapshot.
    Reject,
}

impl ConflictPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "merge" => Some(Self::Merge),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub associations: AssociationsConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path.
    pub path: PathBuf,
    /// Upper bound for waiting on another writer, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("blueprint.sqlite3"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files. File logging is off when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

/// `[associations]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationsConfig {
    pub conflict_policy: ConflictPolicy,
}

impl CoreConfig {
    /// Loads config from file, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source: err,
                }
            }
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Builds config from defaults plus environment overrides only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document without applying overrides.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies `BLUEPRINT_*` overrides using `lookup` as the variable source.
    ///
    /// Taking a lookup function keeps tests independent of process env.
    pub fn apply_env_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("BLUEPRINT_DATABASE_PATH") {
            self.database.path = PathBuf::from(value);
        }
        if let Some(value) = lookup("BLUEPRINT_DATABASE_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms =
                value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "database.busy_timeout_ms",
                    reason: format!("`{value}` is not an integer"),
                })?;
        }
        if let Some(value) = lookup("BLUEPRINT_LOGGING_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("BLUEPRINT_LOGGING_DIR") {
            self.logging.dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("BLUEPRINT_ASSOCIATIONS_CONFLICT_POLICY") {
            self.associations.conflict_policy =
                ConflictPolicy::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                    field: "associations.conflict_policy",
                    reason: format!("`{value}` is not one of merge|reject"),
                })?;
        }
        Ok(())
    }

    /// Checks value ranges across all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "database.path",
                reason: "must not be empty".to_string(),
            });
        }
        if !(MIN_BUSY_TIMEOUT_MS..=MAX_BUSY_TIMEOUT_MS).contains(&self.database.busy_timeout_ms) {
            return Err(ConfigError::InvalidValue {
                field: "database.busy_timeout_ms",
                reason: format!(
                    "{} is outside {MIN_BUSY_TIMEOUT_MS}..={MAX_BUSY_TIMEOUT_MS}",
                    self.database.busy_timeout_ms
                ),
            });
        }
        normalize_level(&self.logging.level).map_err(|reason| ConfigError::InvalidValue {
            field: "logging.level",
            reason,
        })?;
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    field: "logging.dir",
                    reason: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }
        Ok(())
    }
}
