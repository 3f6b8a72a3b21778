//! Blueprint association use-case service.
//!
//! # Responsibility
//! - Expose candidate and association reads for display.
//! - Own editing sessions (snapshot + staging buffer) and the save transaction.
//! - Validate desired association sets before anything is written.
//!
//! # Invariants
//! - Every failed save leaves the store unchanged and keeps staged edits.
//! - A successful save clears the session's staged edits and advances its
//!   snapshot to the committed set.
//! - Additions must be catalog candidates when the save runs; the master
//!   course itself is never part of a desired set.

use crate::config::ConflictPolicy;
use crate::model::course::{Course, CourseId};
use crate::model::template::{MasterTemplate, TemplateId};
use crate::repo::association_repo::{AssociationStore, SqliteAssociationStore};
use crate::repo::catalog_repo::{CatalogIndex, SqliteCatalogIndex};
use crate::repo::{join_ids, ConflictKind, RepoError};
use crate::staging::{StagingBuffer, ToggleOutcome};
use log::{info, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors surfaced by association use-cases.
#[derive(Debug)]
pub enum AssociationError {
    /// Desired set includes the master or stale/ineligible courses.
    InvalidAssociation { course_ids: Vec<CourseId> },
    /// Another session committed first; staged edits are kept for retry.
    Conflict(ConflictKind),
    /// The store could not complete in time; retrying unchanged is safe.
    StorageUnavailable(RepoError),
    TemplateNotFound(TemplateId),
    TemplateDisabled(TemplateId),
    CourseNotFound(CourseId),
    CourseInactive(CourseId),
    CourseIsAssociate(CourseId),
    /// Any other persistence failure.
    Repo(RepoError),
}

impl AssociationError {
    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAssociation { .. } => "invalid_association",
            Self::Conflict(_) => "conflict",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::TemplateNotFound(_) => "template_not_found",
            Self::TemplateDisabled(_) => "template_disabled",
            Self::CourseNotFound(_) => "course_not_found",
            Self::CourseInactive(_) => "course_inactive",
            Self::CourseIsAssociate(_) => "course_is_associate",
            Self::Repo(_) => "storage",
        }
    }

    /// Course ids a user-visible message should list.
    pub fn course_ids(&self) -> Vec<CourseId> {
        match self {
            Self::InvalidAssociation { course_ids } => course_ids.clone(),
            Self::Conflict(ConflictKind::AssociatedElsewhere(ids)) => ids.clone(),
            Self::CourseNotFound(id) | Self::CourseInactive(id) | Self::CourseIsAssociate(id) => {
                vec![*id]
            }
            _ => Vec::new(),
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl Display for AssociationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAssociation { course_ids } => write!(
                f,
                "courses cannot be associated: {}",
                join_ids(course_ids)
            ),
            Self::Conflict(kind) => write!(f, "associations changed concurrently: {kind}"),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
            Self::TemplateNotFound(id) => write!(f, "master template not found: {id}"),
            Self::TemplateDisabled(id) => write!(f, "master template is disabled: {id}"),
            Self::CourseNotFound(id) => write!(f, "course not found: {id}"),
            Self::CourseInactive(id) => write!(f, "course is not active: {id}"),
            Self::CourseIsAssociate(id) => {
                write!(f, "course is associated to a blueprint: {id}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AssociationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) | Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AssociationError {
    fn from(value: RepoError) -> Self {
        if value.is_busy() {
            return Self::StorageUnavailable(value);
        }
        match value {
            RepoError::InvalidAssociation(course_ids) => Self::InvalidAssociation { course_ids },
            RepoError::Conflict(kind) => Self::Conflict(kind),
            RepoError::TemplateNotFound(id) => Self::TemplateNotFound(id),
            RepoError::CourseNotFound(id) => Self::CourseNotFound(id),
            RepoError::CourseInactive(id) => Self::CourseInactive(id),
            RepoError::CourseIsAssociate(id) => Self::CourseIsAssociate(id),
            other => Self::Repo(other),
        }
    }
}

pub type AssociationResult<T> = Result<T, AssociationError>;

/// Body of the `save` operation: explicit additions and removals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub add: Vec<CourseId>,
    #[serde(default)]
    pub remove: Vec<CourseId>,
}

/// Result of a committed save, for UI feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub added: Vec<CourseId>,
    pub removed: Vec<CourseId>,
    /// Template revision after the save.
    pub revision: u64,
}

/// One user's in-progress edit of a template's association set.
///
/// Dropping a session discards its staged edits without touching storage.
#[derive(Debug, Clone)]
pub struct EditSession {
    template_id: TemplateId,
    snapshot: Vec<CourseId>,
    snapshot_revision: u64,
    buffer: StagingBuffer,
}

impl EditSession {
    fn new(template_id: TemplateId, snapshot: Vec<CourseId>, snapshot_revision: u64) -> Self {
        Self {
            buffer: StagingBuffer::new(snapshot.iter().copied()),
            template_id,
            snapshot,
            snapshot_revision,
        }
    }

    pub fn template_id(&self) -> TemplateId {
        self.template_id
    }

    /// Associated course ids as of the last load, refresh or save.
    pub fn snapshot(&self) -> &[CourseId] {
        &self.snapshot
    }

    pub fn snapshot_revision(&self) -> u64 {
        self.snapshot_revision
    }

    pub fn toggle_add(&mut self, course_id: CourseId) -> ToggleOutcome {
        self.buffer.toggle_add(course_id)
    }

    pub fn toggle_remove(&mut self, course_id: CourseId) -> ToggleOutcome {
        self.buffer.toggle_remove(course_id)
    }

    pub fn pending_additions(&self) -> Vec<CourseId> {
        self.buffer.pending_additions()
    }

    pub fn pending_removals(&self) -> BTreeSet<CourseId> {
        self.buffer.pending_removals()
    }

    pub fn has_staged_changes(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn staging(&self) -> &StagingBuffer {
        &self.buffer
    }

    fn apply_request(&mut self, request: &SaveRequest) {
        for course_id in &request.add {
            self.buffer.stage_add(*course_id);
        }
        for course_id in &request.remove {
            self.buffer.stage_remove(*course_id);
        }
    }

    fn reset_snapshot(&mut self, snapshot: Vec<CourseId>, revision: u64) {
        self.buffer.rebase(snapshot.iter().copied());
        self.snapshot = snapshot;
        self.snapshot_revision = revision;
    }
}

/// Association set manager over a catalog index and an association store.
pub struct AssociationManager<C: CatalogIndex, S: AssociationStore> {
    catalog: C,
    store: S,
    policy: ConflictPolicy,
}

/// Manager wired to SQLite repositories sharing one connection.
pub type SqliteAssociationManager<'conn> =
    AssociationManager<SqliteCatalogIndex<'conn>, SqliteAssociationStore<'conn>>;

impl<'conn> AssociationManager<SqliteCatalogIndex<'conn>, SqliteAssociationStore<'conn>> {
    /// Builds a manager whose catalog and store read the same connection.
    pub fn try_from_connection(
        conn: &'conn Connection,
        policy: ConflictPolicy,
    ) -> AssociationResult<Self> {
        Ok(Self::with_policy(
            SqliteCatalogIndex::try_new(conn)?,
            SqliteAssociationStore::try_new(conn)?,
            policy,
        ))
    }
}

impl<C: CatalogIndex, S: AssociationStore> AssociationManager<C, S> {
    /// Creates a manager with the default `merge` conflict policy.
    pub fn new(catalog: C, store: S) -> Self {
        Self::with_policy(catalog, store, ConflictPolicy::default())
    }

    pub fn with_policy(catalog: C, store: S, policy: ConflictPolicy) -> Self {
        Self {
            catalog,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Courses that may be added to `template_id`.
    pub fn candidates(&self, template_id: TemplateId) -> AssociationResult<Vec<Course>> {
        Ok(self.catalog.list_candidates(template_id)?)
    }

    /// Candidates filtered by a free-text query.
    pub fn search_candidates(
        &self,
        template_id: TemplateId,
        query: &str,
    ) -> AssociationResult<Vec<Course>> {
        Ok(self.catalog.search_candidates(template_id, query)?)
    }

    /// Courses currently associated to `template_id`, in creation order.
    pub fn associations(&self, template_id: TemplateId) -> AssociationResult<Vec<Course>> {
        Ok(self.store.associated_courses(template_id)?)
    }

    /// Designates `course_id` as a master course; idempotent.
    pub fn set_as_master_course(&self, course_id: CourseId) -> AssociationResult<MasterTemplate> {
        Ok(self.store.create_template(course_id)?)
    }

    pub fn template(&self, template_id: TemplateId) -> AssociationResult<MasterTemplate> {
        self.store
            .get_template(template_id)?
            .ok_or(AssociationError::TemplateNotFound(template_id))
    }

    pub fn template_for_course(
        &self,
        course_id: CourseId,
    ) -> AssociationResult<Option<MasterTemplate>> {
        Ok(self.store.template_for_course(course_id)?)
    }

    pub fn set_template_enabled(
        &self,
        template_id: TemplateId,
        enabled: bool,
    ) -> AssociationResult<()> {
        self.store.set_template_enabled(template_id, enabled)?;
        info!(
            "event=template_enable module=service status=ok template_id={} enabled={}",
            template_id, enabled
        );
        Ok(())
    }

    /// Starts an editing session over the current association set.
    pub fn begin_session(&self, template_id: TemplateId) -> AssociationResult<EditSession> {
        let (snapshot, revision) = self.load_snapshot(template_id)?;
        Ok(EditSession::new(template_id, snapshot, revision))
    }

    /// Re-fetches the persisted set and rebases staged edits onto it.
    pub fn refresh_session(&self, session: &mut EditSession) -> AssociationResult<()> {
        let (snapshot, revision) = self.load_snapshot(session.template_id)?;
        session.reset_snapshot(snapshot, revision);
        Ok(())
    }

    /// Commits the session's staged edits.
    ///
    /// # Errors
    /// - `InvalidAssociation` when the master or non-candidates would be added.
    /// - `Conflict` when another session changed the template first.
    /// - `StorageUnavailable` when the write lock was not acquired in time.
    pub fn save(&self, session: &mut EditSession) -> AssociationResult<SaveResult> {
        let started_at = Instant::now();
        let template_id = session.template_id;

        let result = self.commit(session);
        match &result {
            Ok(saved) => info!(
                "event=associations_save module=service status=ok template_id={} added={} removed={} revision={} duration_ms={}",
                template_id,
                saved.added.len(),
                saved.removed.len(),
                saved.revision,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=associations_save module=service status=error template_id={} error_code={} duration_ms={}",
                template_id,
                err.code(),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    /// Applies explicit `add`/`remove` lists to a fresh session and saves it.
    ///
    /// Not idempotent: a retry after success reports empty change lists.
    pub fn save_changes(
        &self,
        template_id: TemplateId,
        request: &SaveRequest,
    ) -> AssociationResult<SaveResult> {
        let mut session = self.begin_session(template_id)?;
        session.apply_request(request);
        self.save(&mut session)
    }

    fn commit(&self, session: &mut EditSession) -> AssociationResult<SaveResult> {
        let template = self.template(session.template_id)?;
        if !template.is_enabled {
            return Err(AssociationError::TemplateDisabled(template.template_id));
        }

        // Revision is read before the set so a commit landing in between
        // shows up as a stale revision instead of a lost update.
        let (current, expected_revision) = match self.policy {
            ConflictPolicy::Merge => (
                self.store.current_associations(template.template_id)?,
                template.revision,
            ),
            ConflictPolicy::Reject => (session.snapshot.clone(), session.snapshot_revision),
        };

        let removals = session.buffer.pending_removals();
        let mut desired: Vec<CourseId> = current
            .iter()
            .copied()
            .filter(|id| !removals.contains(id))
            .collect();
        for course_id in session.buffer.pending_additions() {
            if !desired.contains(&course_id) {
                desired.push(course_id);
            }
        }

        self.validate_desired(&template, &current, &desired)?;

        let outcome = self.store.replace_associations(
            template.template_id,
            &desired,
            Some(expected_revision),
        )?;
        if outcome.is_noop() {
            info!(
                "event=associations_save module=service status=noop template_id={}",
                template.template_id
            );
        }

        session.buffer.clear();
        session.reset_snapshot(desired, outcome.revision);

        Ok(SaveResult {
            added: outcome.added,
            removed: outcome.removed,
            revision: outcome.revision,
        })
    }

    fn validate_desired(
        &self,
        template: &MasterTemplate,
        current: &[CourseId],
        desired: &[CourseId],
    ) -> AssociationResult<()> {
        let current: HashSet<CourseId> = current.iter().copied().collect();
        let additions: Vec<CourseId> = desired
            .iter()
            .copied()
            .filter(|id| !current.contains(id))
            .collect();
        if additions.is_empty() && !desired.contains(&template.master_course_id) {
            return Ok(());
        }

        let eligible: HashSet<CourseId> = self
            .catalog
            .list_candidates(template.template_id)?
            .into_iter()
            .map(|course| course.course_id)
            .collect();

        let mut invalid = Vec::new();
        let mut elsewhere = Vec::new();
        for &course_id in desired {
            if course_id == template.master_course_id {
                invalid.push(course_id);
                continue;
            }
            if current.contains(&course_id) || eligible.contains(&course_id) {
                continue;
            }
            match self.store.association_owner(course_id)? {
                // Added here by another session; the revision check reports it.
                Some(owner) if owner == template.template_id => {}
                Some(_) => elsewhere.push(course_id),
                None => invalid.push(course_id),
            }
        }

        if !invalid.is_empty() {
            return Err(AssociationError::InvalidAssociation {
                course_ids: invalid,
            });
        }
        if !elsewhere.is_empty() {
            return Err(AssociationError::Conflict(
                ConflictKind::AssociatedElsewhere(elsewhere),
            ));
        }
        Ok(())
    }

    fn load_snapshot(&self, template_id: TemplateId) -> AssociationResult<(Vec<CourseId>, u64)> {
        let revision = self.store.revision(template_id)?;
        let snapshot = self.store.current_associations(template_id)?;
        Ok((snapshot, revision))
    }
}
