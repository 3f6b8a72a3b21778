//! Candidate course catalog for blueprint association.
//!
//! # Responsibility
//! - List courses that may be associated to one master template.
//!
//! # Invariants
//! - Candidates are active, share the master course account, are not the
//!   master itself, are not a master of any template, and are not associated
//!   to any template (this one included).
//! - Order is deterministic: `name ASC, course_code ASC, course_uuid ASC`
//!   with binary collation.
//! - All operations are pure reads.

use crate::model::course::Course;
use crate::model::template::TemplateId;
use crate::repo::association_repo::{ASSOCIATIONS_TABLE, TEMPLATES_TABLE};
use crate::repo::course_repo::{parse_course_row, COURSES_TABLE, COURSE_COLUMNS_SQL};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::Connection;

/// Read-only index of courses eligible for association.
pub trait CatalogIndex {
    /// Lists all eligible candidates for `template_id`.
    fn list_candidates(&self, template_id: TemplateId) -> RepoResult<Vec<Course>>;

    /// Lists eligible candidates whose name, code or SIS id contains `query`.
    ///
    /// Matching is case-insensitive; a blank query lists every candidate.
    fn search_candidates(&self, template_id: TemplateId, query: &str) -> RepoResult<Vec<Course>> {
        let candidates = self.list_candidates(template_id)?;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(candidates);
        }
        Ok(candidates
            .into_iter()
            .filter(|course| course.matches_search(&needle))
            .collect())
    }
}

/// SQLite-backed catalog index.
pub struct SqliteCatalogIndex<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogIndex<'conn> {
    /// Creates index from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[COURSES_TABLE, TEMPLATES_TABLE, ASSOCIATIONS_TABLE])?;
        Ok(Self { conn })
    }
}

impl CatalogIndex for SqliteCatalogIndex<'_> {
    fn list_candidates(&self, template_id: TemplateId) -> RepoResult<Vec<Course>> {
        let template_text = template_id.to_string();
        let template_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM master_templates WHERE template_uuid = ?1);",
            [template_text.as_str()],
            |row| row.get(0),
        )?;
        if template_exists == 0 {
            return Err(RepoError::TemplateNotFound(template_id));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COURSE_COLUMNS_SQL}
             FROM courses c
             INNER JOIN master_templates t ON t.template_uuid = ?1
             INNER JOIN courses m ON m.course_uuid = t.master_course_uuid
             WHERE c.account_uuid = m.account_uuid
               AND c.status = 'active'
               AND c.course_uuid <> m.course_uuid
               AND NOT EXISTS (
                 SELECT 1 FROM master_templates other
                 WHERE other.master_course_uuid = c.course_uuid
               )
               AND NOT EXISTS (
                 SELECT 1 FROM template_associations a
                 WHERE a.course_uuid = c.course_uuid
               )
             ORDER BY c.name ASC, c.course_code ASC, c.course_uuid ASC;"
        ))?;

        let mut rows = stmt.query([template_text.as_str()])?;
        let mut candidates = Vec::new();
        while let Some(row) = rows.next()? {
            candidates.push(parse_course_row(row)?);
        }
        Ok(candidates)
    }
}
