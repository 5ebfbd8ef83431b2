use markbook_core::db::open_db_in_memory;
use markbook_core::{
    ExternalAssessmentError, ExternalAssessmentService, Gradebook, GradebookRepository,
    GradingError, GradingRepository, GradingService, Principal, PushOutcome, RegisterExternalRequest,
    RosterAuthorizer, RosterRepository, RosterRole, ScoreValue, SqliteExternalAssessmentRepository,
    SqliteGradebookRepository, SqliteGradingRepository, SqliteRosterRepository,
    UpdateExternalRequest,
};
use rusqlite::Connection;
use std::collections::BTreeMap;

fn external_service(conn: &Connection) -> ExternalAssessmentService<SqliteExternalAssessmentRepository<'_>> {
    ExternalAssessmentService::new(SqliteExternalAssessmentRepository::try_new(conn).unwrap())
}

fn seed_gradebook(conn: &Connection) {
    let gradebooks = SqliteGradebookRepository::try_new(conn).unwrap();
    gradebooks
        .create_gradebook(&Gradebook::new("g1", "Intro Course"))
        .unwrap();

    let roster = SqliteRosterRepository::try_new(conn).unwrap();
    roster
        .set_membership("g1", "prof", RosterRole::Instructor)
        .unwrap();
    for student in ["s1", "s2"] {
        roster
            .set_membership("g1", student, RosterRole::Student)
            .unwrap();
    }
}

fn quiz_request() -> RegisterExternalRequest {
    RegisterExternalRequest {
        external_id: "ext-1".to_string(),
        title: "Quiz".to_string(),
        points: 10.0,
        due_at: None,
        external_url: Some("https://quiz.example/1".to_string()),
        service_label: Some("quiz-engine".to_string()),
    }
}

#[test]
fn register_and_probe_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);

    assert!(!service.is_defined("g1", "ext-1").unwrap());
    let assignment = service.register("g1", quiz_request()).unwrap();
    assert!(assignment.is_external());
    assert_eq!(assignment.external_id(), Some("ext-1"));
    assert!(service.is_defined("g1", "ext-1").unwrap());
}

#[test]
fn duplicate_external_id_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);

    service.register("g1", quiz_request()).unwrap();

    let mut second = quiz_request();
    second.title = "Quiz2".to_string();
    second.points = 5.0;
    let err = service.register("g1", second).unwrap_err();
    assert!(matches!(
        err,
        ExternalAssessmentError::ConflictingExternalId { ref external_id, .. }
            if external_id == "ext-1"
    ));
}

#[test]
fn title_collisions_with_internal_assignments_are_conflicts() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);

    let grading = SqliteGradingRepository::try_new(&conn).unwrap();
    grading
        .create_assignment(&markbook_core::Assignment::new_internal("g1", "Quiz", 30.0))
        .unwrap();

    let service = external_service(&conn);
    let err = service.register("g1", quiz_request()).unwrap_err();
    assert!(matches!(
        err,
        ExternalAssessmentError::ConflictingAssignmentName { ref title, .. } if title == "Quiz"
    ));
}

#[test]
fn register_validates_points_and_gradebook() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);

    let mut broken = quiz_request();
    broken.points = 0.0;
    let err = service.register("g1", broken).unwrap_err();
    assert!(matches!(err, ExternalAssessmentError::IllegalPoints(_)));

    let err = service.register("ghost", quiz_request()).unwrap_err();
    assert!(matches!(
        err,
        ExternalAssessmentError::GradebookNotFound { ref gradebook_uid } if gradebook_uid == "ghost"
    ));
}

#[test]
fn update_rewrites_fields_and_excludes_self_from_collision_checks() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);

    service.register("g1", quiz_request()).unwrap();
    let mut second = quiz_request();
    second.external_id = "ext-2".to_string();
    second.title = "Exam".to_string();
    service.register("g1", second).unwrap();

    // Keeping its own title is not a collision.
    service
        .update(
            "g1",
            "ext-1",
            UpdateExternalRequest {
                title: "Quiz".to_string(),
                points: 20.0,
                due_at: Some(1_900_000_000_000),
                external_url: Some("https://quiz.example/v2".to_string()),
            },
        )
        .unwrap();

    let grading = SqliteGradingRepository::try_new(&conn).unwrap();
    let updated = grading.find_assignment("g1", "Quiz", false).unwrap().unwrap();
    assert_eq!(updated.points, 20.0);
    assert_eq!(updated.due_at, Some(1_900_000_000_000));
    assert_eq!(
        updated.external.as_ref().and_then(|s| s.external_url.as_deref()),
        Some("https://quiz.example/v2")
    );

    // Taking another live assignment's title is.
    let err = service
        .update(
            "g1",
            "ext-1",
            UpdateExternalRequest {
                title: "Exam".to_string(),
                points: 20.0,
                due_at: None,
                external_url: None,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ExternalAssessmentError::ConflictingAssignmentName { ref title, .. } if title == "Exam"
    ));
}

#[test]
fn update_unknown_external_id_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);

    let err = service
        .update(
            "g1",
            "ext-9",
            UpdateExternalRequest {
                title: "Quiz".to_string(),
                points: 10.0,
                due_at: None,
                external_url: None,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ExternalAssessmentError::AssessmentNotFound { ref external_id, .. }
            if external_id == "ext-9"
    ));
}

#[test]
fn remove_soft_deletes_but_keeps_the_audit_journal_reachable() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);

    service.register("g1", quiz_request()).unwrap();
    service
        .update_score("g1", "ext-1", "s1", ScoreValue::Graded(9.0))
        .unwrap();

    service.remove("g1", "ext-1").unwrap();
    assert!(!service.is_defined("g1", "ext-1").unwrap());

    let err = service.remove("g1", "ext-1").unwrap_err();
    assert!(matches!(
        err,
        ExternalAssessmentError::AssessmentNotFound { .. }
    ));

    let grading = GradingService::new(
        SqliteGradingRepository::try_new(&conn).unwrap(),
        RosterAuthorizer::new(SqliteRosterRepository::try_new(&conn).unwrap()),
    );

    // Normal queries no longer see the assignment.
    let err = grading
        .get_score(&Principal::new("prof"), "g1", "Quiz", "s1")
        .unwrap_err();
    assert!(matches!(err, GradingError::AssignmentNotFound { .. }));

    // The audit journal still resolves through the tombstone.
    let trail = grading.audit_trail("g1", "Quiz", "s1").unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].new_points, Some(9.0));
    assert_eq!(trail[0].source, "ext-1");
}

#[test]
fn update_score_uses_the_external_id_as_source_label() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);
    service.register("g1", quiz_request()).unwrap();

    let v1 = service
        .update_score("g1", "ext-1", "s1", ScoreValue::Graded(7.5))
        .unwrap();
    assert_eq!(v1, 1);

    // Repeated pushes re-read the current version themselves.
    let v2 = service
        .update_score("g1", "ext-1", "s1", ScoreValue::Graded(8.0))
        .unwrap();
    assert_eq!(v2, 2);

    let grading = GradingService::new(
        SqliteGradingRepository::try_new(&conn).unwrap(),
        RosterAuthorizer::new(SqliteRosterRepository::try_new(&conn).unwrap()),
    );
    let score = grading
        .get_score(&Principal::new("prof"), "g1", "Quiz", "s1")
        .unwrap()
        .unwrap();
    assert_eq!(score.value, ScoreValue::Graded(8.0));
    assert_eq!(score.source, "ext-1");
}

#[test]
fn push_scores_isolates_per_student_failures() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);
    service.register("g1", quiz_request()).unwrap();

    let mut batch = BTreeMap::new();
    batch.insert("s1".to_string(), ScoreValue::Graded(9.0));
    batch.insert("s2".to_string(), ScoreValue::Graded(11.0));

    let results = service.push_scores("g1", "ext-1", &batch).unwrap();
    assert_eq!(results.len(), 2);

    assert_eq!(results[0].student_uid, "s1");
    assert_eq!(results[0].outcome, PushOutcome::Applied { new_version: 1 });

    assert_eq!(results[1].student_uid, "s2");
    assert!(matches!(results[1].outcome, PushOutcome::IllegalPoints(_)));

    // s1's score persisted despite s2's rejection.
    let grading = GradingService::new(
        SqliteGradingRepository::try_new(&conn).unwrap(),
        RosterAuthorizer::new(SqliteRosterRepository::try_new(&conn).unwrap()),
    );
    let prof = Principal::new("prof");
    let s1 = grading.get_score(&prof, "g1", "Quiz", "s1").unwrap().unwrap();
    assert_eq!(s1.value, ScoreValue::Graded(9.0));
    assert!(grading.get_score(&prof, "g1", "Quiz", "s2").unwrap().is_none());
}

#[test]
fn push_scores_accepts_ungraded_entries() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);
    service.register("g1", quiz_request()).unwrap();

    service
        .update_score("g1", "ext-1", "s1", ScoreValue::Graded(9.0))
        .unwrap();

    let mut batch = BTreeMap::new();
    batch.insert("s1".to_string(), ScoreValue::Ungraded);
    let results = service.push_scores("g1", "ext-1", &batch).unwrap();
    assert_eq!(results[0].outcome, PushOutcome::Applied { new_version: 2 });

    let grading = GradingService::new(
        SqliteGradingRepository::try_new(&conn).unwrap(),
        RosterAuthorizer::new(SqliteRosterRepository::try_new(&conn).unwrap()),
    );
    let score = grading
        .get_score(&Principal::new("prof"), "g1", "Quiz", "s1")
        .unwrap()
        .unwrap();
    assert_eq!(score.value, ScoreValue::Ungraded);
}

#[test]
fn push_scores_fails_whole_call_for_unknown_targets() {
    let conn = open_db_in_memory().unwrap();
    seed_gradebook(&conn);
    let service = external_service(&conn);
    service.register("g1", quiz_request()).unwrap();

    let batch: BTreeMap<String, ScoreValue> =
        [("s1".to_string(), ScoreValue::Graded(5.0))].into();

    let err = service.push_scores("ghost", "ext-1", &batch).unwrap_err();
    assert!(matches!(
        err,
        ExternalAssessmentError::GradebookNotFound { .. }
    ));

    let err = service.push_scores("g1", "ext-9", &batch).unwrap_err();
    assert!(matches!(
        err,
        ExternalAssessmentError::AssessmentNotFound { .. }
    ));
}
