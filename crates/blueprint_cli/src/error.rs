//! CLI error type, exit codes and the JSON error envelope.

use blueprint_core::db::DbError;
use blueprint_core::{AssociationError, ConfigError, CourseId};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Logging(String),
    Db(DbError),
    Association(AssociationError),
    Output(serde_json::Error),
}

/// Machine-readable error printed on stdout.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: &'static str,
    pub message: String,
    pub course_ids: Vec<CourseId>,
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Logging(_) => "logging",
            Self::Db(err) if err.is_busy() => "storage_unavailable",
            Self::Db(_) => "storage",
            Self::Association(err) => err.code(),
            Self::Output(_) => "output",
        }
    }

    /// | Code | Meaning |
    /// |------|---------|
    /// | 1 | request rejected or storage failure |
    /// | 2 | configuration or logging setup |
    /// | 3 | storage busy; retry unchanged |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Logging(_) => 2,
            Self::Db(err) if err.is_busy() => 3,
            Self::Association(err) if err.is_transient() => 3,
            _ => 1,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let course_ids = match self {
            Self::Association(err) => err.course_ids(),
            _ => Vec::new(),
        };
        ErrorEnvelope {
            error: self.code(),
            message: self.to_string(),
            course_ids,
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(reason) => write!(f, "failed to initialize logging: {reason}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Association(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "failed to write output: {err}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(_) => None,
            Self::Db(err) => Some(err),
            Self::Association(err) => Some(err),
            Self::Output(err) => Some(err),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<AssociationError> for CliError {
    fn from(value: AssociationError) -> Self {
        Self::Association(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Output(value)
    }
}
