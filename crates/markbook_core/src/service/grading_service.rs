//! Grading use-case service.
//!
//! # Responsibility
//! - Provide score read/write APIs gated by authorization.
//! - Enforce point-cap validation and optimistic concurrency semantics
//!   before delegating to the grading repository.
//! - Provide internal assignment administration (create/list/probe).
//!
//! # Invariants
//! - Every score read/write routes through the authorization gate.
//! - Externally maintained assignments are never writable through this
//!   service.
//! - Stale writes surface to the caller; the service never re-reads and
//!   retries on the caller's behalf.

use crate::model::assignment::Assignment;
use crate::model::principal::Principal;
use crate::model::score::{
    validate_assignment_points, IllegalPointsError, ScoreAuditEntry, ScoreValue, StudentScore,
};
use crate::repo::grading_repo::GradingRepository;
use crate::repo::RepoError;
use crate::service::authorization::{GradeAuthorizer, NotAuthorized};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for grading use-cases.
#[derive(Debug)]
pub enum GradingError {
    /// Referenced gradebook does not exist or is deleted.
    GradebookNotFound { gradebook_uid: String },
    /// Referenced assignment does not exist in the gradebook.
    AssignmentNotFound {
        gradebook_uid: String,
        title: String,
    },
    /// Principal lacks grading rights for the target student.
    NotAuthorized(NotAuthorized),
    /// The record changed since the writer last read it.
    StaleWrite {
        gradebook_uid: String,
        title: String,
        student_uid: String,
        expected_version: i64,
        actual_version: i64,
    },
    /// Point value failed validation (negative, non-finite, over cap).
    IllegalPoints(IllegalPointsError),
    /// Assignment is owned by an external service and cannot be graded
    /// through the gradebook.
    ExternallyMaintained {
        gradebook_uid: String,
        title: String,
    },
    /// Assignment title already taken within the gradebook.
    ConflictingAssignmentName {
        gradebook_uid: String,
        title: String,
    },
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for GradingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GradebookNotFound { gradebook_uid } => {
                write!(f, "gradebook not found: {gradebook_uid}")
            }
            Self::AssignmentNotFound {
                gradebook_uid,
                title,
            } => write!(
                f,
                "assignment `{title}` not found in gradebook {gradebook_uid}"
            ),
            Self::NotAuthorized(err) => write!(f, "{err}"),
            Self::StaleWrite {
                gradebook_uid,
                title,
                student_uid,
                expected_version,
                actual_version,
            } => write!(
                f,
                "stale score write for student {student_uid} on `{title}` in gradebook \
                 {gradebook_uid}: expected version {expected_version}, found {actual_version}"
            ),
            Self::IllegalPoints(err) => write!(f, "{err}"),
            Self::ExternallyMaintained {
                gradebook_uid,
                title,
            } => write!(
                f,
                "assignment `{title}` in gradebook {gradebook_uid} is externally maintained"
            ),
            Self::ConflictingAssignmentName {
                gradebook_uid,
                title,
            } => write!(
                f,
                "assignment title `{title}` already exists in gradebook {gradebook_uid}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GradingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotAuthorized(err) => Some(err),
            Self::IllegalPoints(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NotAuthorized> for GradingError {
    fn from(value: NotAuthorized) -> Self {
        Self::NotAuthorized(value)
    }
}

impl From<IllegalPointsError> for GradingError {
    fn from(value: IllegalPointsError) -> Self {
        Self::IllegalPoints(value)
    }
}

impl From<RepoError> for GradingError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::GradebookNotFound { gradebook_uid } => {
                Self::GradebookNotFound { gradebook_uid }
            }
            RepoError::DuplicateTitle {
                gradebook_uid,
                title,
            } => Self::ConflictingAssignmentName {
                gradebook_uid,
                title,
            },
            other => Self::Repo(other),
        }
    }
}

/// Grading facade over repository and authorization gate.
pub struct GradingService<R: GradingRepository, G: GradeAuthorizer> {
    repo: R,
    gate: G,
}

impl<R: GradingRepository, G: GradeAuthorizer> GradingService<R, G> {
    /// Creates a service using the provided repository and gate.
    pub fn new(repo: R, gate: G) -> Self {
        Self { repo, gate }
    }

    /// Returns the current score for the student, or `None` when no
    /// score has been assigned yet.
    pub fn get_score(
        &self,
        principal: &Principal,
        gradebook_uid: &str,
        assignment_title: &str,
        student_uid: &str,
    ) -> Result<Option<StudentScore>, GradingError> {
        self.require_gradebook(gradebook_uid)?;
        let assignment = self.require_assignment(gradebook_uid, assignment_title, false)?;
        self.gate
            .enforce_grade(principal, gradebook_uid, student_uid)?;
        Ok(self.repo.get_score(assignment.uuid, student_uid)?)
    }

    /// Writes one score with optimistic concurrency and returns the new
    /// version.
    ///
    /// # Contract
    /// - `expected_version` is `0` when no score record has ever been
    ///   written for the student.
    /// - The caller owns re-read-and-retry semantics after `StaleWrite`.
    pub fn set_score(
        &self,
        principal: &Principal,
        gradebook_uid: &str,
        assignment_title: &str,
        student_uid: &str,
        value: ScoreValue,
        source_label: &str,
        expected_version: i64,
    ) -> Result<i64, GradingError> {
        self.require_gradebook(gradebook_uid)?;
        let assignment = self.require_assignment(gradebook_uid, assignment_title, false)?;
        if assignment.is_external() {
            return Err(GradingError::ExternallyMaintained {
                gradebook_uid: gradebook_uid.to_string(),
                title: assignment_title.to_string(),
            });
        }
        self.gate
            .enforce_grade(principal, gradebook_uid, student_uid)?;
        value.validate_against(assignment.points)?;

        let new_version = self
            .repo
            .write_score(
                assignment.uuid,
                student_uid,
                value,
                source_label,
                expected_version,
            )
            .map_err(|err| match err {
                RepoError::StaleVersion {
                    expected_version,
                    actual_version,
                } => GradingError::StaleWrite {
                    gradebook_uid: gradebook_uid.to_string(),
                    title: assignment_title.to_string(),
                    student_uid: student_uid.to_string(),
                    expected_version,
                    actual_version,
                },
                other => other.into(),
            })?;

        info!(
            "event=score_write module=grading status=ok gradebook={gradebook_uid} \
             assignment={assignment_title} student={student_uid} version={new_version} \
             source={source_label}"
        );
        Ok(new_version)
    }

    /// Creates one internal (gradebook-maintained) assignment.
    pub fn add_assignment(
        &self,
        gradebook_uid: &str,
        title: impl Into<String>,
        points: f64,
        due_at: Option<i64>,
    ) -> Result<Assignment, GradingError> {
        validate_assignment_points(points)?;

        let mut assignment = Assignment::new_internal(gradebook_uid, title, points);
        assignment.due_at = due_at;
        self.repo.create_assignment(&assignment)?;
        info!(
            "event=assignment_create module=grading status=ok gradebook={gradebook_uid} \
             assignment={}",
            assignment.title
        );
        Ok(assignment)
    }

    /// Lists assignments currently defined in the gradebook.
    pub fn list_assignments(&self, gradebook_uid: &str) -> Result<Vec<Assignment>, GradingError> {
        self.require_gradebook(gradebook_uid)?;
        Ok(self.repo.list_assignments(gradebook_uid)?)
    }

    /// Returns whether an assignment with the given title exists.
    ///
    /// Gives callers a chance to avoid `ConflictingAssignmentName`.
    pub fn is_assignment_defined(
        &self,
        gradebook_uid: &str,
        title: &str,
    ) -> Result<bool, GradingError> {
        self.require_gradebook(gradebook_uid)?;
        Ok(self
            .repo
            .find_assignment(gradebook_uid, title, false)?
            .is_some())
    }

    /// Reads the append-only audit journal for one score record.
    ///
    /// Resolves tombstoned assignments too: the journal stays readable
    /// after an external assessment is removed.
    pub fn audit_trail(
        &self,
        gradebook_uid: &str,
        assignment_title: &str,
        student_uid: &str,
    ) -> Result<Vec<ScoreAuditEntry>, GradingError> {
        self.require_gradebook(gradebook_uid)?;
        let assignment = self.require_assignment(gradebook_uid, assignment_title, true)?;
        Ok(self.repo.audit_trail(assignment.uuid, student_uid)?)
    }

    fn require_gradebook(&self, gradebook_uid: &str) -> Result<(), GradingError> {
        if !self.repo.gradebook_defined(gradebook_uid)? {
            return Err(GradingError::GradebookNotFound {
                gradebook_uid: gradebook_uid.to_string(),
            });
        }
        Ok(())
    }

    fn require_assignment(
        &self,
        gradebook_uid: &str,
        title: &str,
        include_deleted: bool,
    ) -> Result<Assignment, GradingError> {
        self.repo
            .find_assignment(gradebook_uid, title, include_deleted)?
            .ok_or_else(|| GradingError::AssignmentNotFound {
                gradebook_uid: gradebook_uid.to_string(),
                title: title.to_string(),
            })
    }
}
