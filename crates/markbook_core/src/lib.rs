//! Core domain logic for the markbook gradebook service.
//! This crate is the single source of truth for grading invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::assignment::{Assignment, AssignmentId, AssignmentValidationError, ExternalSource};
pub use model::gradebook::{Gradebook, GradebookValidationError};
pub use model::principal::{parse_roster_role, Principal, RosterRole, RosterRoleError};
pub use model::score::{
    validate_assignment_points, IllegalPointsError, ScoreAuditEntry, ScoreValue, StudentScore,
};
pub use repo::external_repo::{ExternalAssessmentRepository, SqliteExternalAssessmentRepository};
pub use repo::gradebook_repo::{GradebookRepository, SqliteGradebookRepository};
pub use repo::grading_repo::{GradingRepository, SqliteGradingRepository};
pub use repo::roster_repo::{RosterRepository, SqliteRosterRepository};
pub use repo::{RepoError, RepoResult};
pub use service::authorization::{GradeAuthorizer, NotAuthorized, RosterAuthorizer};
pub use service::external_service::{
    ExternalAssessmentError, ExternalAssessmentService, PushOutcome, RegisterExternalRequest,
    StudentPushResult, UpdateExternalRequest,
};
pub use service::gradebook_service::{GradebookDirectory, GradebookDirectoryError};
pub use service::grading_service::{GradingError, GradingService};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
