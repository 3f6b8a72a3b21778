//! Master template registry and association store.
//!
//! # Responsibility
//! - Designate master courses and load template metadata.
//! - Persist the associate course set of each template.
//! - Replace a whole association set atomically with optimistic concurrency.
//!
//! # Invariants
//! - `replace_associations` runs in one IMMEDIATE transaction; any error
//!   rolls back every write.
//! - After a successful replace the stored set equals the requested set.
//! - A course appears under at most one template (`course_uuid` is unique).
//! - Newly added courses are re-checked inside the transaction: they must be
//!   active and share the master course account.
//! - `revision` is bumped exactly once per replace that changes rows.
//! - Associations are listed in insertion order (`id ASC`).

use crate::model::course::{Course, CourseId, CourseStatus};
use crate::model::template::{Association, MasterTemplate, TemplateId};
use crate::repo::course_repo::{load_course, parse_course_row, COURSES_TABLE, COURSE_COLUMNS_SQL};
use crate::repo::{ensure_connection_ready, parse_uuid, ConflictKind, RepoError, RepoResult};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashSet;
use uuid::Uuid;

pub(crate) const TEMPLATES_TABLE: (&str, &[&str]) = (
    "master_templates",
    &[
        "template_uuid",
        "master_course_uuid",
        "is_enabled",
        "revision",
        "created_at",
    ],
);

pub(crate) const ASSOCIATIONS_TABLE: (&str, &[&str]) = (
    "template_associations",
    &["id", "template_uuid", "course_uuid", "created_at"],
);

const TEMPLATE_SELECT_SQL: &str = "SELECT
    template_uuid,
    master_course_uuid,
    is_enabled,
    revision,
    created_at
FROM master_templates";

/// Rows changed by one `replace_associations` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Newly associated courses, in requested order.
    pub added: Vec<CourseId>,
    /// Courses no longer associated, in their former display order.
    pub removed: Vec<CourseId>,
    /// Template revision after the call.
    pub revision: u64,
}

impl ReplaceOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Repository interface for templates and their association sets.
pub trait AssociationStore {
    /// Designates `master_course_id` as a blueprint.
    ///
    /// Returns the existing template when the course already is a master.
    fn create_template(&self, master_course_id: CourseId) -> RepoResult<MasterTemplate>;
    /// Loads one template by id.
    fn get_template(&self, template_id: TemplateId) -> RepoResult<Option<MasterTemplate>>;
    /// Loads the template whose master is `course_id`.
    fn template_for_course(&self, course_id: CourseId) -> RepoResult<Option<MasterTemplate>>;
    /// Returns the template `course_id` is associated to, if any.
    fn association_owner(&self, course_id: CourseId) -> RepoResult<Option<TemplateId>>;
    /// Enables or disables edits on a template.
    fn set_template_enabled(&self, template_id: TemplateId, enabled: bool) -> RepoResult<()>;
    /// Lists association rows in creation order.
    fn list_associations(&self, template_id: TemplateId) -> RepoResult<Vec<Association>>;
    /// Lists associated course ids in creation order.
    fn current_associations(&self, template_id: TemplateId) -> RepoResult<Vec<CourseId>> {
        Ok(self
            .list_associations(template_id)?
            .into_iter()
            .map(|association| association.course_id)
            .collect())
    }
    /// Lists associated courses joined to course rows, in creation order.
    fn associated_courses(&self, template_id: TemplateId) -> RepoResult<Vec<Course>>;
    /// Returns the current optimistic-concurrency stamp.
    fn revision(&self, template_id: TemplateId) -> RepoResult<u64>;
    /// Replaces the whole association set of `template_id` with `desired`.
    ///
    /// When `expected_revision` is set, the call fails with
    /// `Conflict(StaleRevision)` if the stored revision differs.
    fn replace_associations(
        &self,
        template_id: TemplateId,
        desired: &[CourseId],
        expected_revision: Option<u64>,
    ) -> RepoResult<ReplaceOutcome>;
}

/// SQLite-backed association store.
pub struct SqliteAssociationStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAssociationStore<'conn> {
    /// Creates store from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[COURSES_TABLE, TEMPLATES_TABLE, ASSOCIATIONS_TABLE])?;
        Ok(Self { conn })
    }
}

impl AssociationStore for SqliteAssociationStore<'_> {
    fn create_template(&self, master_course_id: CourseId) -> RepoResult<MasterTemplate> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let course =
            load_course(&tx, master_course_id)?.ok_or(RepoError::CourseNotFound(master_course_id))?;
        if let Some(existing) = load_template_by_course(&tx, master_course_id)? {
            return Ok(existing);
        }
        if course.status != CourseStatus::Active {
            return Err(RepoError::CourseInactive(master_course_id));
        }
        if association_owner(&tx, master_course_id)?.is_some() {
            return Err(RepoError::CourseIsAssociate(master_course_id));
        }

        let template_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO master_templates (template_uuid, master_course_uuid)
             VALUES (?1, ?2);",
            params![template_id.to_string(), master_course_id.to_string()],
        )?;
        let template = load_template(&tx, template_id)?.ok_or_else(|| {
            RepoError::InvalidData("created template not found in read-back".to_string())
        })?;
        tx.commit()?;

        info!(
            "event=template_create module=repo status=ok template_id={} master_course_id={}",
            template_id, master_course_id
        );
        Ok(template)
    }

    fn get_template(&self, template_id: TemplateId) -> RepoResult<Option<MasterTemplate>> {
        load_template(self.conn, template_id)
    }

    fn template_for_course(&self, course_id: CourseId) -> RepoResult<Option<MasterTemplate>> {
        load_template_by_course(self.conn, course_id)
    }

    fn association_owner(&self, course_id: CourseId) -> RepoResult<Option<TemplateId>> {
        association_owner(self.conn, course_id)
    }

    fn set_template_enabled(&self, template_id: TemplateId, enabled: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE master_templates
             SET is_enabled = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE template_uuid = ?1;",
            params![template_id.to_string(), i64::from(enabled)],
        )?;
        if changed == 0 {
            return Err(RepoError::TemplateNotFound(template_id));
        }
        Ok(())
    }

    fn list_associations(&self, template_id: TemplateId) -> RepoResult<Vec<Association>> {
        ensure_template_exists(self.conn, template_id)?;
        list_association_rows(self.conn, template_id)
    }

    fn associated_courses(&self, template_id: TemplateId) -> RepoResult<Vec<Course>> {
        ensure_template_exists(self.conn, template_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COURSE_COLUMNS_SQL}
             FROM template_associations a
             INNER JOIN courses c ON c.course_uuid = a.course_uuid
             WHERE a.template_uuid = ?1
             ORDER BY a.id ASC;"
        ))?;
        let mut rows = stmt.query([template_id.to_string()])?;
        let mut courses = Vec::new();
        while let Some(row) = rows.next()? {
            courses.push(parse_course_row(row)?);
        }
        Ok(courses)
    }

    fn revision(&self, template_id: TemplateId) -> RepoResult<u64> {
        load_template(self.conn, template_id)?
            .map(|template| template.revision)
            .ok_or(RepoError::TemplateNotFound(template_id))
    }

    fn replace_associations(
        &self,
        template_id: TemplateId,
        desired: &[CourseId],
        expected_revision: Option<u64>,
    ) -> RepoResult<ReplaceOutcome> {
        let desired = dedup_preserving_order(desired);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let template =
            load_template(&tx, template_id)?.ok_or(RepoError::TemplateNotFound(template_id))?;
        if let Some(expected) = expected_revision {
            if expected != template.revision {
                warn!(
                    "event=associations_replace module=repo status=conflict template_id={} reason=stale_revision expected={} actual={}",
                    template_id, expected, template.revision
                );
                return Err(RepoError::Conflict(ConflictKind::StaleRevision {
                    expected,
                    actual: template.revision,
                }));
            }
        }

        let master = load_course(&tx, template.master_course_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "master course {} of template {} not found",
                template.master_course_id, template_id
            ))
        })?;
        let current: Vec<CourseId> = list_association_rows(&tx, template_id)?
            .into_iter()
            .map(|association| association.course_id)
            .collect();
        let current_set: HashSet<CourseId> = current.iter().copied().collect();
        let desired_set: HashSet<CourseId> = desired.iter().copied().collect();

        let mut ineligible = Vec::new();
        let mut elsewhere = Vec::new();
        for &course_id in &desired {
            let Some(course) = load_course(&tx, course_id)? else {
                ineligible.push(course_id);
                continue;
            };
            if is_master_course(&tx, course_id)? {
                ineligible.push(course_id);
                continue;
            }
            // Existing associates stay even if they were deactivated since.
            let offered =
                course.status == CourseStatus::Active && course.account_id == master.account_id;
            if !offered && !current_set.contains(&course_id) {
                ineligible.push(course_id);
                continue;
            }
            if matches!(association_owner(&tx, course_id)?, Some(owner) if owner != template_id) {
                elsewhere.push(course_id);
            }
        }
        if !ineligible.is_empty() {
            warn!(
                "event=associations_replace module=repo status=error template_id={} reason=ineligible count={}",
                template_id,
                ineligible.len()
            );
            return Err(RepoError::InvalidAssociation(ineligible));
        }
        if !elsewhere.is_empty() {
            warn!(
                "event=associations_replace module=repo status=conflict template_id={} reason=associated_elsewhere count={}",
                template_id,
                elsewhere.len()
            );
            return Err(RepoError::Conflict(ConflictKind::AssociatedElsewhere(
                elsewhere,
            )));
        }

        let removed: Vec<CourseId> = current
            .iter()
            .copied()
            .filter(|id| !desired_set.contains(id))
            .collect();
        let added: Vec<CourseId> = desired
            .iter()
            .copied()
            .filter(|id| !current_set.contains(id))
            .collect();

        for course_id in &removed {
            tx.execute(
                "DELETE FROM template_associations
                 WHERE template_uuid = ?1
                   AND course_uuid = ?2;",
                params![template_id.to_string(), course_id.to_string()],
            )?;
        }
        for course_id in &added {
            tx.execute(
                "INSERT INTO template_associations (template_uuid, course_uuid)
                 VALUES (?1, ?2);",
                params![template_id.to_string(), course_id.to_string()],
            )?;
        }

        let mut revision = template.revision;
        if !added.is_empty() || !removed.is_empty() {
            revision += 1;
            tx.execute(
                "UPDATE master_templates
                 SET revision = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE template_uuid = ?1;",
                params![template_id.to_string(), revision_to_db(revision)?],
            )?;
        }

        tx.commit()?;
        info!(
            "event=associations_replace module=repo status=ok template_id={} added={} removed={} revision={}",
            template_id,
            added.len(),
            removed.len(),
            revision
        );

        Ok(ReplaceOutcome {
            added,
            removed,
            revision,
        })
    }
}

fn dedup_preserving_order(ids: &[CourseId]) -> Vec<CourseId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn ensure_template_exists(conn: &Connection, template_id: TemplateId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM master_templates WHERE template_uuid = ?1);",
        [template_id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(RepoError::TemplateNotFound(template_id));
    }
    Ok(())
}

fn load_template(conn: &Connection, template_id: TemplateId) -> RepoResult<Option<MasterTemplate>> {
    let mut stmt = conn.prepare(&format!("{TEMPLATE_SELECT_SQL} WHERE template_uuid = ?1;"))?;
    stmt.query_row([template_id.to_string()], |row| Ok(parse_template_row(row)))
        .optional()?
        .transpose()
}

fn load_template_by_course(
    conn: &Connection,
    course_id: CourseId,
) -> RepoResult<Option<MasterTemplate>> {
    let mut stmt =
        conn.prepare(&format!("{TEMPLATE_SELECT_SQL} WHERE master_course_uuid = ?1;"))?;
    stmt.query_row([course_id.to_string()], |row| Ok(parse_template_row(row)))
        .optional()?
        .transpose()
}

fn is_master_course(conn: &Connection, course_id: CourseId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM master_templates WHERE master_course_uuid = ?1);",
        [course_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn association_owner(conn: &Connection, course_id: CourseId) -> RepoResult<Option<TemplateId>> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT template_uuid
             FROM template_associations
             WHERE course_uuid = ?1;",
            [course_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    owner
        .map(|value| parse_uuid(&value, "template_associations.template_uuid"))
        .transpose()
}

fn list_association_rows(
    conn: &Connection,
    template_id: TemplateId,
) -> RepoResult<Vec<Association>> {
    let mut stmt = conn.prepare(
        "SELECT template_uuid, course_uuid, created_at
         FROM template_associations
         WHERE template_uuid = ?1
         ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query([template_id.to_string()])?;
    let mut associations = Vec::new();
    while let Some(row) = rows.next()? {
        let template_text: String = row.get("template_uuid")?;
        let course_text: String = row.get("course_uuid")?;
        associations.push(Association {
            template_id: parse_uuid(&template_text, "template_associations.template_uuid")?,
            course_id: parse_uuid(&course_text, "template_associations.course_uuid")?,
            created_at: row.get("created_at")?,
        });
    }
    Ok(associations)
}

fn parse_template_row(row: &Row<'_>) -> RepoResult<MasterTemplate> {
    let template_text: String = row.get("template_uuid")?;
    let master_text: String = row.get("master_course_uuid")?;

    let is_enabled = match row.get::<_, i64>("is_enabled")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_enabled value `{other}` in master_templates.is_enabled"
            )));
        }
    };

    let revision_raw: i64 = row.get("revision")?;
    let revision = u64::try_from(revision_raw).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid revision `{revision_raw}` in master_templates.revision"
        ))
    })?;

    Ok(MasterTemplate {
        template_id: parse_uuid(&template_text, "master_templates.template_uuid")?,
        master_course_id: parse_uuid(&master_text, "master_templates.master_course_uuid")?,
        is_enabled,
        revision,
        created_at: row.get("created_at")?,
    })
}

fn revision_to_db(revision: u64) -> RepoResult<i64> {
    i64::try_from(revision)
        .map_err(|_| RepoError::InvalidData(format!("revision {revision} overflows i64")))
}
