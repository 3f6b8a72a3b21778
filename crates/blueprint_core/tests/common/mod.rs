#![allow(dead_code)]

use blueprint_core::{
    AccountId, AssociationManager, AssociationStore, ConflictPolicy, Course, CourseId,
    CourseRepository, MasterTemplate, SqliteAssociationManager, SqliteAssociationStore,
    SqliteCourseRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

/// Five offered courses in the master's account, in creation order.
pub const COURSE_ROWS: [(&str, &str, &str); 5] = [
    ("AlphaDog", "CCC1", "SIS_A1"),
    ("AlphaMale", "CCC2", "SIS_A2"),
    ("Alphabet", "CCC3", "SIS_A3"),
    ("BetaCarotine", "DDD4", "SIS_B4"),
    ("BetaGetOuttaHere", "DDD5", "SIS_B5"),
];

pub struct Fixture {
    pub account_id: AccountId,
    pub master: Course,
    pub template: MasterTemplate,
    pub courses: Vec<Course>,
}

impl Fixture {
    pub fn course_id(&self, index: usize) -> CourseId {
        self.courses[index].course_id
    }
}

pub fn seed(conn: &Connection) -> Fixture {
    let account_id = Uuid::new_v4();
    let master = create_course(conn, account_id, "Master Course", "MASTER");
    let store = SqliteAssociationStore::try_new(conn).unwrap();
    let template = store.create_template(master.course_id).unwrap();

    let courses = COURSE_ROWS
        .iter()
        .map(|(name, code, sis)| {
            let course = Course::new(account_id, *name, *code).with_sis_source_id(*sis);
            SqliteCourseRepository::try_new(conn)
                .unwrap()
                .create_course(&course)
                .unwrap();
            course
        })
        .collect();

    Fixture {
        account_id,
        master,
        template,
        courses,
    }
}

pub fn create_course(conn: &Connection, account_id: AccountId, name: &str, code: &str) -> Course {
    let course = Course::new(account_id, name, code);
    SqliteCourseRepository::try_new(conn)
        .unwrap()
        .create_course(&course)
        .unwrap();
    course
}

/// Creates another master course in the same account and returns its template.
pub fn second_template(conn: &Connection, fixture: &Fixture) -> MasterTemplate {
    let master = create_course(conn, fixture.account_id, "Second Master", "MASTER2");
    SqliteAssociationStore::try_new(conn)
        .unwrap()
        .create_template(master.course_id)
        .unwrap()
}

pub fn manager(conn: &Connection) -> SqliteAssociationManager<'_> {
    AssociationManager::try_from_connection(conn, ConflictPolicy::Merge).unwrap()
}

pub fn ids(courses: &[Course]) -> Vec<CourseId> {
    courses.iter().map(|course| course.course_id).collect()
}

pub fn names(courses: &[Course]) -> Vec<&str> {
    courses.iter().map(|course| course.name.as_str()).collect()
}
