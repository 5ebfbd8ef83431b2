use markbook_core::db::open_db_in_memory;
use markbook_core::{
    Assignment, ExternalAssessmentRepository, ExternalSource, GradebookRepository, Gradebook,
    GradingError, GradingRepository, GradingService, Principal, RosterAuthorizer, RosterRepository,
    RosterRole, ScoreValue, SqliteExternalAssessmentRepository, SqliteGradebookRepository,
    SqliteGradingRepository, SqliteRosterRepository,
};
use rusqlite::Connection;

type Service<'conn> =
    GradingService<SqliteGradingRepository<'conn>, RosterAuthorizer<SqliteRosterRepository<'conn>>>;

fn grading_service(conn: &Connection) -> Service<'_> {
    GradingService::new(
        SqliteGradingRepository::try_new(conn).unwrap(),
        RosterAuthorizer::new(SqliteRosterRepository::try_new(conn).unwrap()),
    )
}

/// Seeds gradebook `g1` with assignment `hw1` (100 points), one grader
/// and two enrolled students.
fn seed_gradebook(conn: &Connection) {
    let gradebooks = SqliteGradebookRepository::try_new(conn).unwrap();
    gradebooks
        .create_gradebook(&Gradebook::new("g1", "Intro Course"))
        .unwrap();

    let grading = SqliteGradingRepository::try_new(conn).unwrap();
    grading
        .create_assignment(&Assignment::new_internal("g1", "hw1", 100.0))
        .unwrap();

    let roster = SqliteRosterRepository::try_new(conn).unwrap();
    roster
        .set_membership("g1", "prof", RosterRole::Instructor)
        .unwrap();
    roster
        .set_membership("g1", "student42", RosterRole::Student)
        .unwrap();
    roster
        .set_membership("g1", "s1", RosterRole::Student)
        .unwrap();
}

#[test]
fn set_then_get_roundtrip_increments_version() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);
    let prof = Principal::new("prof");

    assert!(service
        .get_score(&prof, "g1", "hw1", "student42")
        .unwrap()
        .is_none());

    let v1 = service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(85.0),
            "human-grader",
            0,
        )
        .unwrap();
    assert_eq!(v1, 1);

    let score = service
        .get_score(&prof, "g1", "hw1", "student42")
        .unwrap()
        .unwrap();
    assert_eq!(score.value, ScoreValue::Graded(85.0));
    assert_eq!(score.version, 1);
    assert_eq!(score.source, "human-grader");

    let v2 = service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(90.0),
            "human-grader",
            v1,
        )
        .unwrap();
    assert_eq!(v2, 2);
}

#[test]
fn stale_write_is_rejected_and_leaves_the_score_unchanged() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);
    let prof = Principal::new("prof");

    // Two callers read version 0; the first write wins.
    let v1 = service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(85.0),
            "human-grader",
            0,
        )
        .unwrap();
    assert_eq!(v1, 1);

    let err = service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(70.0),
            "message-center",
            0,
        )
        .unwrap_err();
    match err {
        GradingError::StaleWrite {
            expected_version,
            actual_version,
            ..
        } => {
            assert_eq!(expected_version, 0);
            assert_eq!(actual_version, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Rejection is idempotent: stored value and version are untouched.
    let score = service
        .get_score(&prof, "g1", "hw1", "student42")
        .unwrap()
        .unwrap();
    assert_eq!(score.value, ScoreValue::Graded(85.0));
    assert_eq!(score.version, 1);
    assert_eq!(score.source, "human-grader");
}

#[test]
fn ungraded_writes_are_legal_and_distinct_from_zero() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);
    let prof = Principal::new("prof");

    let v1 = service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "s1",
            ScoreValue::Graded(0.0),
            "human-grader",
            0,
        )
        .unwrap();
    let score = service.get_score(&prof, "g1", "hw1", "s1").unwrap().unwrap();
    assert_eq!(score.value, ScoreValue::Graded(0.0));
    assert!(score.value.is_graded());

    // Clearing back to ungraded keeps the record and bumps the version.
    let v2 = service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "s1",
            ScoreValue::Ungraded,
            "human-grader",
            v1,
        )
        .unwrap();
    assert_eq!(v2, 2);
    let cleared = service.get_score(&prof, "g1", "hw1", "s1").unwrap().unwrap();
    assert_eq!(cleared.value, ScoreValue::Ungraded);
    assert_eq!(cleared.version, 2);
}

#[test]
fn illegal_points_are_rejected_before_persistence() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);
    let prof = Principal::new("prof");

    for value in [f64::NAN, f64::INFINITY, -1.0, 100.5] {
        let err = service
            .set_score(
                &prof,
                "g1",
                "hw1",
                "student42",
                ScoreValue::Graded(value),
                "human-grader",
                0,
            )
            .unwrap_err();
        assert!(
            matches!(err, GradingError::IllegalPoints(_)),
            "value {value} should be illegal"
        );
    }

    // Nothing was written, so the record still does not exist.
    assert!(service
        .get_score(&prof, "g1", "hw1", "student42")
        .unwrap()
        .is_none());
}

#[test]
fn missing_gradebook_and_assignment_are_reported_with_context() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);
    let prof = Principal::new("prof");

    let err = service
        .get_score(&prof, "nope", "hw1", "student42")
        .unwrap_err();
    assert!(matches!(
        err,
        GradingError::GradebookNotFound { ref gradebook_uid } if gradebook_uid == "nope"
    ));

    let err = service
        .get_score(&prof, "g1", "hw9", "student42")
        .unwrap_err();
    assert!(matches!(
        err,
        GradingError::AssignmentNotFound { ref title, .. } if title == "hw9"
    ));
}

#[test]
fn unauthorized_principals_cannot_read_or_write_scores() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);
    let student = Principal::new("s1");

    let err = service
        .get_score(&student, "g1", "hw1", "student42")
        .unwrap_err();
    assert!(matches!(err, GradingError::NotAuthorized(_)));

    let err = service
        .set_score(
            &student,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(100.0),
            "self-service",
            0,
        )
        .unwrap_err();
    assert!(matches!(err, GradingError::NotAuthorized(_)));

    // Fail-closed, never a silent no-op: nothing was written.
    let prof = Principal::new("prof");
    assert!(service
        .get_score(&prof, "g1", "hw1", "student42")
        .unwrap()
        .is_none());
}

#[test]
fn externally_maintained_assignments_reject_grading_writes() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);

    let external = SqliteExternalAssessmentRepository::try_new(&conn).unwrap();
    external
        .create_assignment(&Assignment::new_external(
            "g1",
            "Quiz",
            10.0,
            ExternalSource {
                external_id: "ext-1".to_string(),
                external_url: None,
                service_label: Some("quiz-engine".to_string()),
            },
        ))
        .unwrap();

    let service = grading_service(&conn);
    let err = service
        .set_score(
            &Principal::new("prof"),
            "g1",
            "Quiz",
            "student42",
            ScoreValue::Graded(9.0),
            "human-grader",
            0,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        GradingError::ExternallyMaintained { ref title, .. } if title == "Quiz"
    ));
}

#[test]
fn audit_journal_records_every_write_in_order() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);
    let prof = Principal::new("prof");

    let v1 = service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(85.0),
            "human-grader",
            0,
        )
        .unwrap();
    service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(91.5),
            "message-center",
            v1,
        )
        .unwrap();

    let trail = service.audit_trail("g1", "hw1", "student42").unwrap();
    assert_eq!(trail.len(), 2);

    assert_eq!(trail[0].old_version, 0);
    assert_eq!(trail[0].new_version, 1);
    assert_eq!(trail[0].old_points, None);
    assert_eq!(trail[0].new_points, Some(85.0));
    assert_eq!(trail[0].source, "human-grader");

    assert_eq!(trail[1].old_version, 1);
    assert_eq!(trail[1].new_version, 2);
    assert_eq!(trail[1].old_points, Some(85.0));
    assert_eq!(trail[1].new_points, Some(91.5));
    assert_eq!(trail[1].source, "message-center");
    assert!(trail[0].entry_id < trail[1].entry_id);
}

#[test]
fn rejected_writes_never_reach_the_audit_journal() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);
    let prof = Principal::new("prof");

    service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(85.0),
            "human-grader",
            0,
        )
        .unwrap();
    let _ = service
        .set_score(
            &prof,
            "g1",
            "hw1",
            "student42",
            ScoreValue::Graded(70.0),
            "human-grader",
            0,
        )
        .unwrap_err();

    let trail = service.audit_trail("g1", "hw1", "student42").unwrap();
    assert_eq!(trail.len(), 1);
}

#[test]
fn add_assignment_enforces_title_uniqueness() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);

    assert!(service.is_assignment_defined("g1", "hw1").unwrap());
    assert!(!service.is_assignment_defined("g1", "hw2").unwrap());

    service.add_assignment("g1", "hw2", 50.0, None).unwrap();
    let err = service.add_assignment("g1", "hw2", 25.0, None).unwrap_err();
    assert!(matches!(
        err,
        GradingError::ConflictingAssignmentName { ref title, .. } if title == "hw2"
    ));
}

#[test]
fn add_assignment_rejects_illegal_point_values() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);

    for points in [0.0, -10.0, f64::NAN] {
        let err = service
            .add_assignment("g1", "broken", points, None)
            .unwrap_err();
        assert!(
            matches!(err, GradingError::IllegalPoints(_)),
            "points {points} should be illegal"
        );
    }
    assert!(!service.is_assignment_defined("g1", "broken").unwrap());
}

#[test]
fn list_assignments_is_sorted_and_skips_tombstones() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = grading_service(&conn);

    service.add_assignment("g1", "essay", 20.0, Some(1_900_000_000_000)).unwrap();

    let external = SqliteExternalAssessmentRepository::try_new(&conn).unwrap();
    let quiz = Assignment::new_external(
        "g1",
        "Quiz",
        10.0,
        ExternalSource {
            external_id: "ext-1".to_string(),
            external_url: None,
            service_label: None,
        },
    );
    external.create_assignment(&quiz).unwrap();
    external.soft_delete_assignment(quiz.uuid).unwrap();

    let titles: Vec<String> = service
        .list_assignments("g1")
        .unwrap()
        .into_iter()
        .map(|assignment| assignment.title)
        .collect();
    assert_eq!(titles, vec!["essay".to_string(), "hw1".to_string()]);
}
