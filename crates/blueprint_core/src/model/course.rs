//! Course domain model.
//!
//! # Responsibility
//! - Define the course record read by the catalog and association views.
//! - Validate user-facing fields before persistence.
//!
//! # Invariants
//! - `course_id` is stable and never reused.
//! - `name` and `course_code` are non-blank.
//! - `sis_source_id`, when present, is non-blank.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable course identifier.
pub type CourseId = Uuid;

/// Account scope identifier. Candidates are limited to the master's account.
pub type AccountId = Uuid;

/// Course availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    /// Published and usable; eligible for association.
    Active,
    /// Concluded or unpublished; never offered as a candidate.
    Inactive,
}

impl CourseStatus {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub(crate) fn from_db(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Validation failures for [`Course`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseValidationError {
    BlankName,
    BlankCourseCode,
    BlankSisSourceId,
}

impl Display for CourseValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "course name must not be blank"),
            Self::BlankCourseCode => write!(f, "course code must not be blank"),
            Self::BlankSisSourceId => write!(f, "sis source id must not be blank when set"),
        }
    }
}

impl Error for CourseValidationError {}

/// Course record as seen by the blueprint core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: CourseId,
    pub account_id: AccountId,
    pub name: String,
    pub course_code: String,
    /// External student-information-system key.
    pub sis_source_id: Option<String>,
    pub status: CourseStatus,
    /// Epoch ms. Assigned by storage; zero before the first write.
    #[serde(default)]
    pub created_at: i64,
}

impl Course {
    /// Creates an active course with a generated id.
    pub fn new(
        account_id: AccountId,
        name: impl Into<String>,
        course_code: impl Into<String>,
    ) -> Self {
        Self {
            course_id: Uuid::new_v4(),
            account_id,
            name: name.into(),
            course_code: course_code.into(),
            sis_source_id: None,
            status: CourseStatus::Active,
            created_at: 0,
        }
    }

    /// Sets the SIS key, builder style.
    pub fn with_sis_source_id(mut self, sis_source_id: impl Into<String>) -> Self {
        self.sis_source_id = Some(sis_source_id.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == CourseStatus::Active
    }

    /// Checks field-level invariants.
    pub fn validate(&self) -> Result<(), CourseValidationError> {
        if self.name.trim().is_empty() {
            return Err(CourseValidationError::BlankName);
        }
        if self.course_code.trim().is_empty() {
            return Err(CourseValidationError::BlankCourseCode);
        }
        if matches!(self.sis_source_id.as_deref(), Some(value) if value.trim().is_empty()) {
            return Err(CourseValidationError::BlankSisSourceId);
        }
        Ok(())
    }

    /// Case-insensitive substring match on name, code and SIS id.
    pub fn matches_search(&self, needle_lowercase: &str) -> bool {
        self.name.to_lowercase().contains(needle_lowercase)
            || self.course_code.to_lowercase().contains(needle_lowercase)
            || self
                .sis_source_id
                .as_deref()
                .is_some_and(|sis| sis.to_lowercase().contains(needle_lowercase))
    }
}
