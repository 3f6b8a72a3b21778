//! Master template and association records.
//!
//! # Invariants
//! - At most one template per master course.
//! - A course is associated to at most one template at a time.
//! - `revision` only grows; every committed association change bumps it.

use crate::model::course::CourseId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable master template identifier.
pub type TemplateId = Uuid;

/// Blueprint designation for one master course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterTemplate {
    pub template_id: TemplateId,
    pub master_course_id: CourseId,
    /// Disabled templates keep their associations but reject edits.
    pub is_enabled: bool,
    /// Optimistic-concurrency stamp for the association set.
    pub revision: u64,
    /// Epoch ms.
    pub created_at: i64,
}

/// One persisted template -> associate course link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub template_id: TemplateId,
    pub course_id: CourseId,
    /// Epoch ms.
    pub created_at: i64,
}

/// Unsaved edit recorded for one candidate course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedChange {
    PendingAdd,
    PendingRemove,
}
