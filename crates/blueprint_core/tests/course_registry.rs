use blueprint_core::db::open_db_in_memory;
use blueprint_core::{
    Course, CourseRepository, CourseStatus, CourseValidationError, RepoError,
    SqliteCourseRepository,
};
use uuid::Uuid;

#[test]
fn create_then_get_round_trips_course_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCourseRepository::try_new(&conn).unwrap();
    let course = Course::new(Uuid::new_v4(), "AlphaDog", "CCC1").with_sis_source_id("SIS_A1");

    let id = repo.create_course(&course).unwrap();
    let loaded = repo.get_course(id).unwrap().unwrap();

    assert_eq!(loaded.course_id, course.course_id);
    assert_eq!(loaded.account_id, course.account_id);
    assert_eq!(loaded.name, "AlphaDog");
    assert_eq!(loaded.course_code, "CCC1");
    assert_eq!(loaded.sis_source_id.as_deref(), Some("SIS_A1"));
    assert!(loaded.is_active());
    assert!(loaded.created_at > 0);
}

#[test]
fn blank_name_is_rejected_before_insert() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCourseRepository::try_new(&conn).unwrap();
    let course = Course::new(Uuid::new_v4(), "   ", "CCC1");

    let err = repo.create_course(&course).unwrap_err();

    assert!(matches!(
        err,
        RepoError::Validation(CourseValidationError::BlankName)
    ));
    assert!(repo.get_course(course.course_id).unwrap().is_none());
}

#[test]
fn duplicate_sis_source_id_is_a_storage_error() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCourseRepository::try_new(&conn).unwrap();
    let account = Uuid::new_v4();
    repo.create_course(&Course::new(account, "AlphaDog", "CCC1").with_sis_source_id("SIS_A1"))
        .unwrap();

    let err = repo
        .create_course(&Course::new(account, "AlphaMale", "CCC2").with_sis_source_id("SIS_A1"))
        .unwrap_err();

    assert!(matches!(err, RepoError::Db(_)));
    assert!(!err.is_busy());
}

#[test]
fn set_course_status_updates_row_or_reports_missing_course() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCourseRepository::try_new(&conn).unwrap();
    let course = Course::new(Uuid::new_v4(), "Alphabet", "CCC3");
    repo.create_course(&course).unwrap();

    repo.set_course_status(course.course_id, CourseStatus::Inactive)
        .unwrap();
    let loaded = repo.get_course(course.course_id).unwrap().unwrap();
    assert_eq!(loaded.status, CourseStatus::Inactive);

    let missing = Uuid::new_v4();
    assert!(matches!(
        repo.set_course_status(missing, CourseStatus::Active),
        Err(RepoError::CourseNotFound(id)) if id == missing
    ));
}
