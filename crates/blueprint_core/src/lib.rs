//! Core domain logic for blueprint course associations.
//! This crate is the single source of truth for association invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod staging;

pub use config::{
    AssociationsConfig, ConfigError, ConflictPolicy, CoreConfig, DatabaseConfig, LoggingConfig,
};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::course::{AccountId, Course, CourseId, CourseStatus, CourseValidationError};
pub use model::template::{Association, MasterTemplate, StagedChange, TemplateId};
pub use repo::association_repo::{AssociationStore, ReplaceOutcome, SqliteAssociationStore};
pub use repo::catalog_repo::{CatalogIndex, SqliteCatalogIndex};
pub use repo::course_repo::{CourseRepository, SqliteCourseRepository};
pub use repo::{ConflictKind, RepoError, RepoResult};
pub use service::association_service::{
    AssociationError, AssociationManager, AssociationResult, EditSession, SaveRequest,
    SaveResult, SqliteAssociationManager,
};
pub use staging::{StagingBuffer, ToggleOutcome};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
