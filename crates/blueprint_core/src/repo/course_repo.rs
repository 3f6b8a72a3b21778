//! Course repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist and load the course rows read by the catalog and association views.
//! - Own the shared course row parser.
//!
//! # Invariants
//! - Write paths call `Course::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::model::course::{Course, CourseId, CourseStatus};
use crate::repo::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Column list shared by every course projection. Queries alias courses as `c`.
pub(crate) const COURSE_COLUMNS_SQL: &str = "c.course_uuid AS course_uuid,
    c.account_uuid AS account_uuid,
    c.name AS name,
    c.course_code AS course_code,
    c.sis_source_id AS sis_source_id,
    c.status AS status,
    c.created_at AS created_at";

pub(crate) const COURSES_TABLE: (&str, &[&str]) = (
    "courses",
    &[
        "course_uuid",
        "account_uuid",
        "name",
        "course_code",
        "sis_source_id",
        "status",
        "created_at",
    ],
);

/// Repository interface for course rows.
pub trait CourseRepository {
    /// Inserts one course and returns its id.
    fn create_course(&self, course: &Course) -> RepoResult<CourseId>;
    /// Loads one course by id.
    fn get_course(&self, course_id: CourseId) -> RepoResult<Option<Course>>;
    /// Marks a course active or inactive.
    fn set_course_status(&self, course_id: CourseId, status: CourseStatus) -> RepoResult<()>;
}

/// SQLite-backed course repository.
pub struct SqliteCourseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCourseRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[COURSES_TABLE])?;
        Ok(Self { conn })
    }
}

impl CourseRepository for SqliteCourseRepository<'_> {
    fn create_course(&self, course: &Course) -> RepoResult<CourseId> {
        course.validate()?;

        self.conn.execute(
            "INSERT INTO courses (
                course_uuid,
                account_uuid,
                name,
                course_code,
                sis_source_id,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                course.course_id.to_string(),
                course.account_id.to_string(),
                course.name.as_str(),
                course.course_code.as_str(),
                course.sis_source_id.as_deref(),
                course.status.as_db(),
            ],
        )?;

        Ok(course.course_id)
    }

    fn get_course(&self, course_id: CourseId) -> RepoResult<Option<Course>> {
        load_course(self.conn, course_id)
    }

    fn set_course_status(&self, course_id: CourseId, status: CourseStatus) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE courses
             SET status = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE course_uuid = ?1;",
            params![course_id.to_string(), status.as_db()],
        )?;

        if changed == 0 {
            return Err(RepoError::CourseNotFound(course_id));
        }

        Ok(())
    }
}

pub(crate) fn load_course(conn: &Connection, course_id: CourseId) -> RepoResult<Option<Course>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COURSE_COLUMNS_SQL}
         FROM courses c
         WHERE c.course_uuid = ?1;"
    ))?;
    let course = stmt
        .query_row([course_id.to_string()], |row| Ok(parse_course_row(row)))
        .optional()?;
    course.transpose()
}

pub(crate) fn parse_course_row(row: &Row<'_>) -> RepoResult<Course> {
    let course_id_text: String = row.get("course_uuid")?;
    let account_id_text: String = row.get("account_uuid")?;

    let status_text: String = row.get("status")?;
    let status = CourseStatus::from_db(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid course status `{status_text}` in courses.status"
        ))
    })?;

    let course = Course {
        course_id: parse_uuid(&course_id_text, "courses.course_uuid")?,
        account_id: parse_uuid(&account_id_text, "courses.account_uuid")?,
        name: row.get("name")?,
        course_code: row.get("course_code")?,
        sis_source_id: row.get("sis_source_id")?,
        status,
        created_at: row.get("created_at")?,
    };
    course.validate()?;
    Ok(course)
}
