//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for courses, the
//!   candidate catalog and the association store.
//! - Keep SQL details out of the manager/service layer.
//!
//! # Invariants
//! - Repositories are only constructed over fully migrated connections.
//! - Multi-row writes run inside one IMMEDIATE transaction.
//! - Repository APIs return semantic errors (`TemplateNotFound`, `Conflict`)
//!   in addition to DB transport errors.

pub mod association_repo;
pub mod catalog_repo;
pub mod course_repo;

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::course::{CourseId, CourseValidationError};
use crate::model::template::TemplateId;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Why a commit was refused because of concurrent writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// The template revision moved since the caller's snapshot.
    StaleRevision { expected: u64, actual: u64 },
    /// These courses are already associated to another template.
    AssociatedElsewhere(Vec<CourseId>),
}

impl Display for ConflictKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleRevision { expected, actual } => write!(
                f,
                "template revision is {actual}, expected {expected}"
            ),
            Self::AssociatedElsewhere(ids) => write!(
                f,
                "courses already associated to another template: {}",
                join_ids(ids)
            ),
        }
    }
}

/// Error for course, catalog and association persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(CourseValidationError),
    Db(DbError),
    CourseNotFound(CourseId),
    CourseInactive(CourseId),
    /// Course is an associate and therefore cannot become a master.
    CourseIsAssociate(CourseId),
    TemplateNotFound(TemplateId),
    /// Requested set contains masters or unknown courses.
    InvalidAssociation(Vec<CourseId>),
    Conflict(ConflictKind),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    /// Returns whether the failure came from lock contention.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::CourseNotFound(id) => write!(f, "course not found: {id}"),
            Self::CourseInactive(id) => write!(f, "course is not active: {id}"),
            Self::CourseIsAssociate(id) => {
                write!(f, "course is associated to a blueprint: {id}")
            }
            Self::TemplateNotFound(id) => write!(f, "master template not found: {id}"),
            Self::InvalidAssociation(ids) => {
                write!(f, "courses cannot be associated: {}", join_ids(ids))
            }
            Self::Conflict(kind) => write!(f, "association conflict: {kind}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CourseValidationError> for RepoError {
    fn from(value: CourseValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

/// Verifies schema version and the tables/columns a repository reads.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    required: &[(&'static str, &[&'static str])],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        let present = table_columns(conn, table)?;
        if let Some(&column) = columns
            .iter()
            .find(|column| !present.iter().any(|name| name.as_str() == **column))
        {
            return Err(RepoError::MissingRequiredColumn { table, column });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get(1)?);
    }
    Ok(columns)
}
