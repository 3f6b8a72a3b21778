mod common;

use blueprint_core::db::open_db_in_memory;
use blueprint_core::{
    AssociationError, AssociationStore, ConflictKind, CourseRepository, CourseStatus,
    SaveRequest, SaveResult, SqliteAssociationStore, SqliteCourseRepository, ToggleOutcome,
};
use common::{ids, manager, names, second_template, seed};
use uuid::Uuid;

#[test]
fn adding_one_candidate_moves_it_to_associations() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;

    let candidates = manager.candidates(template_id).unwrap();
    let alpha_male = candidates[1].course_id;
    assert_eq!(candidates[1].name, "AlphaMale");

    let mut session = manager.begin_session(template_id).unwrap();
    assert_eq!(session.toggle_add(alpha_male), ToggleOutcome::StagedAdd);
    let saved = manager.save(&mut session).unwrap();

    assert_eq!(saved.added, vec![alpha_male]);
    assert!(saved.removed.is_empty());
    assert_eq!(saved.revision, 1);
    assert_eq!(names(&manager.associations(template_id).unwrap()), vec!["AlphaMale"]);
    assert_eq!(
        names(&manager.candidates(template_id).unwrap()),
        vec!["AlphaDog", "Alphabet", "BetaCarotine", "BetaGetOuttaHere"]
    );
    assert!(!session.has_staged_changes());
    assert_eq!(session.snapshot(), &[alpha_male]);
    assert_eq!(session.snapshot_revision(), 1);
}

#[test]
fn staging_first_two_candidates_saves_them_in_staged_order() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;

    let candidates = manager.candidates(template_id).unwrap();
    assert_eq!(candidates.len(), 5);
    let mut session = manager.begin_session(template_id).unwrap();
    session.toggle_add(candidates[1].course_id);
    session.toggle_add(candidates[0].course_id);
    manager.save(&mut session).unwrap();

    assert_eq!(
        names(&manager.associations(template_id).unwrap()),
        vec!["AlphaMale", "AlphaDog"]
    );
    assert_eq!(manager.candidates(template_id).unwrap().len(), 3);
}

#[test]
fn removing_first_of_two_associations_keeps_second() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;
    manager
        .save_changes(
            template_id,
            &SaveRequest {
                add: vec![fixture.course_id(0), fixture.course_id(1)],
                remove: Vec::new(),
            },
        )
        .unwrap();

    let mut session = manager.begin_session(template_id).unwrap();
    session.toggle_remove(fixture.course_id(0));
    manager.save(&mut session).unwrap();

    assert_eq!(
        ids(&manager.associations(template_id).unwrap()),
        vec![fixture.course_id(1)]
    );
    assert!(ids(&manager.candidates(template_id).unwrap()).contains(&fixture.course_id(0)));
}

#[test]
fn cancelling_first_of_two_staged_additions_saves_only_second() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;

    let mut session = manager.begin_session(template_id).unwrap();
    session.toggle_add(fixture.course_id(0));
    session.toggle_add(fixture.course_id(1));
    assert_eq!(session.toggle_add(fixture.course_id(0)), ToggleOutcome::Cancelled);
    assert_eq!(session.pending_additions(), vec![fixture.course_id(1)]);

    let saved = manager.save(&mut session).unwrap();

    assert_eq!(saved.added, vec![fixture.course_id(1)]);
    assert_eq!(
        ids(&manager.associations(template_id).unwrap()),
        vec![fixture.course_id(1)]
    );
}

#[test]
fn removing_one_association_returns_it_to_candidates() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;
    let initial: Vec<_> = (0..4).map(|index| fixture.course_id(index)).collect();
    SqliteAssociationStore::try_new(&conn)
        .unwrap()
        .replace_associations(template_id, &initial, None)
        .unwrap();

    let alpha_male = fixture.course_id(1);
    let mut session = manager.begin_session(template_id).unwrap();
    assert_eq!(session.toggle_remove(alpha_male), ToggleOutcome::StagedRemove);
    let saved = manager.save(&mut session).unwrap();

    assert_eq!(saved.removed, vec![alpha_male]);
    assert_eq!(
        names(&manager.associations(template_id).unwrap()),
        vec!["AlphaDog", "Alphabet", "BetaCarotine"]
    );
    assert_eq!(
        names(&manager.candidates(template_id).unwrap()),
        vec!["AlphaMale", "BetaGetOuttaHere"]
    );
}

#[test]
fn dropping_session_without_save_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;

    let mut session = manager.begin_session(template_id).unwrap();
    session.toggle_add(fixture.course_id(0));
    session.toggle_add(fixture.course_id(3));
    assert_eq!(session.pending_additions().len(), 2);
    drop(session);

    assert!(manager.associations(template_id).unwrap().is_empty());
    assert_eq!(manager.candidates(template_id).unwrap().len(), 5);
    assert_eq!(manager.template(template_id).unwrap().revision, 0);
}

#[test]
fn toggling_twice_then_saving_is_a_noop() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;
    let course = fixture.course_id(2);

    let mut session = manager.begin_session(template_id).unwrap();
    assert_eq!(session.toggle_add(course), ToggleOutcome::StagedAdd);
    assert_eq!(session.toggle_add(course), ToggleOutcome::Cancelled);
    let saved = manager.save(&mut session).unwrap();

    assert_eq!(saved, SaveResult::default());
    assert!(manager.associations(template_id).unwrap().is_empty());
}

#[test]
fn staged_removal_of_pending_addition_erases_it() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;
    let course = fixture.course_id(4);

    let mut session = manager.begin_session(template_id).unwrap();
    session.toggle_add(course);
    assert_eq!(session.toggle_remove(course), ToggleOutcome::Cancelled);

    assert!(session.pending_additions().is_empty());
    assert!(session.pending_removals().is_empty());
}

#[test]
fn master_course_is_rejected_and_staging_is_kept() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;

    let mut session = manager.begin_session(template_id).unwrap();
    session.toggle_add(fixture.course_id(0));
    session.toggle_add(fixture.master.course_id);
    let err = manager.save(&mut session).unwrap_err();

    match &err {
        AssociationError::InvalidAssociation { course_ids } => {
            assert_eq!(course_ids, &vec![fixture.master.course_id]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.code(), "invalid_association");
    assert_eq!(err.course_ids(), vec![fixture.master.course_id]);
    assert!(!err.is_transient());
    assert_eq!(
        session.pending_additions(),
        vec![fixture.course_id(0), fixture.master.course_id]
    );
    assert!(manager.associations(template_id).unwrap().is_empty());
}

#[test]
fn staged_course_that_became_inactive_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;
    let course = fixture.course_id(3);

    let mut session = manager.begin_session(template_id).unwrap();
    session.toggle_add(course);
    SqliteCourseRepository::try_new(&conn)
        .unwrap()
        .set_course_status(course, CourseStatus::Inactive)
        .unwrap();
    let err = manager.save(&mut session).unwrap_err();

    assert!(matches!(
        err,
        AssociationError::InvalidAssociation { ref course_ids } if course_ids == &vec![course]
    ));
    assert!(session.has_staged_changes());
    assert!(manager.associations(template_id).unwrap().is_empty());
}

#[test]
fn unknown_course_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;
    let unknown = Uuid::new_v4();

    let request = SaveRequest {
        add: vec![fixture.course_id(0), unknown],
        remove: Vec::new(),
    };
    let err = manager.save_changes(template_id, &request).unwrap_err();

    assert_eq!(err.course_ids(), vec![unknown]);
    assert!(manager.associations(template_id).unwrap().is_empty());
}

#[test]
fn disabled_template_rejects_saves_but_still_lists() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;

    manager.set_template_enabled(template_id, false).unwrap();
    let request = SaveRequest {
        add: vec![fixture.course_id(0)],
        remove: Vec::new(),
    };
    let err = manager.save_changes(template_id, &request).unwrap_err();

    assert!(matches!(err, AssociationError::TemplateDisabled(id) if id == template_id));
    assert_eq!(err.code(), "template_disabled");
    assert_eq!(manager.candidates(template_id).unwrap().len(), 5);

    manager.set_template_enabled(template_id, true).unwrap();
    assert_eq!(
        manager.save_changes(template_id, &request).unwrap().added,
        vec![fixture.course_id(0)]
    );
}

#[test]
fn save_changes_applies_additions_and_removals_together() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;

    let first = SaveRequest {
        add: vec![fixture.course_id(0), fixture.course_id(1)],
        remove: Vec::new(),
    };
    manager.save_changes(template_id, &first).unwrap();

    let second = SaveRequest {
        add: vec![fixture.course_id(2), fixture.course_id(0)],
        remove: vec![fixture.course_id(1), fixture.course_id(4)],
    };
    let saved = manager.save_changes(template_id, &second).unwrap();

    assert_eq!(saved.added, vec![fixture.course_id(2)]);
    assert_eq!(saved.removed, vec![fixture.course_id(1)]);
    assert_eq!(saved.revision, 2);
    assert_eq!(
        ids(&manager.associations(template_id).unwrap()),
        vec![fixture.course_id(0), fixture.course_id(2)]
    );

    let retried = manager.save_changes(template_id, &second).unwrap();
    assert!(retried.added.is_empty());
    assert!(retried.removed.is_empty());
    assert_eq!(retried.revision, 2);
}

#[test]
fn removal_is_applied_after_addition_in_one_request() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);
    let template_id = fixture.template.template_id;
    let course = fixture.course_id(3);

    manager
        .save_changes(
            template_id,
            &SaveRequest {
                add: vec![course],
                remove: Vec::new(),
            },
        )
        .unwrap();
    let saved = manager
        .save_changes(
            template_id,
            &SaveRequest {
                add: vec![course],
                remove: vec![course],
            },
        )
        .unwrap();

    assert!(saved.removed.contains(&course));
    assert!(manager.associations(template_id).unwrap().is_empty());
}

#[test]
fn course_of_other_template_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let second = second_template(&conn, &fixture);
    let manager = manager(&conn);
    let course = fixture.course_id(1);

    manager
        .save_changes(
            second.template_id,
            &SaveRequest {
                add: vec![course],
                remove: Vec::new(),
            },
        )
        .unwrap();
    let err = manager
        .save_changes(
            fixture.template.template_id,
            &SaveRequest {
                add: vec![course],
                remove: Vec::new(),
            },
        )
        .unwrap_err();

    assert!(matches!(
        err,
        AssociationError::Conflict(ConflictKind::AssociatedElsewhere(_))
    ));
    assert_eq!(err.code(), "conflict");
    assert_eq!(err.course_ids(), vec![course]);
}

#[test]
fn set_as_master_course_is_idempotent_and_guards_associates() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);

    let again = manager.set_as_master_course(fixture.master.course_id).unwrap();
    assert_eq!(again.template_id, fixture.template.template_id);
    assert_eq!(
        manager
            .template_for_course(fixture.master.course_id)
            .unwrap()
            .map(|template| template.template_id),
        Some(fixture.template.template_id)
    );

    let course = fixture.course_id(0);
    manager
        .save_changes(
            fixture.template.template_id,
            &SaveRequest {
                add: vec![course],
                remove: Vec::new(),
            },
        )
        .unwrap();
    let err = manager.set_as_master_course(course).unwrap_err();
    assert_eq!(err.code(), "course_is_associate");
    assert_eq!(err.course_ids(), vec![course]);

    let promoted = manager.set_as_master_course(fixture.course_id(4)).unwrap();
    assert!(!ids(&manager.candidates(fixture.template.template_id).unwrap())
        .contains(&promoted.master_course_id));
}

#[test]
fn unknown_template_is_reported() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let manager = manager(&conn);
    let missing = Uuid::new_v4();

    let err = manager.begin_session(missing).unwrap_err();
    assert!(matches!(err, AssociationError::TemplateNotFound(id) if id == missing));
    assert_eq!(err.code(), "template_not_found");
    assert!(matches!(
        manager.candidates(missing),
        Err(AssociationError::TemplateNotFound(_))
    ));
}

#[test]
fn search_candidates_matches_visible_fields() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed(&conn);
    let manager = manager(&conn);

    let found = manager
        .search_candidates(fixture.template.template_id, "alpha")
        .unwrap();
    assert_eq!(names(&found), vec!["AlphaDog", "AlphaMale", "Alphabet"]);
}

#[test]
fn save_request_and_result_use_plain_json() {
    let course = Uuid::new_v4();

    let request: SaveRequest =
        serde_json::from_str(&format!(r#"{{"add":["{course}"]}}"#)).unwrap();
    assert_eq!(request.add, vec![course]);
    assert!(request.remove.is_empty());

    let result = SaveResult {
        added: vec![course],
        removed: Vec::new(),
        revision: 3,
    };
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["added"][0], course.to_string());
    assert_eq!(json["revision"], 3);
}
