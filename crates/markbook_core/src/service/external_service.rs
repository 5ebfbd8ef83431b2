//! External assessment synchronization service.
//!
//! # Responsibility
//! - Register, update and remove externally maintained assignments.
//! - Reconcile bulk score pushes from external tools against the score
//!   store with per-student partial-failure semantics.
//!
//! # Invariants
//! - External ids and titles stay unique within a gradebook; update
//!   collision checks exclude the assignment's own prior identity.
//! - Pushed scores are written with `source = external_id` through the
//!   same versioned write path as human grading.
//! - One rejected push entry never rolls back the others.

use crate::model::assignment::{Assignment, AssignmentValidationError, ExternalSource};
use crate::model::score::{validate_assignment_points, IllegalPointsError, ScoreValue};
use crate::repo::external_repo::ExternalAssessmentRepository;
use crate::repo::RepoError;
use log::info;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for external assessment use-cases.
#[derive(Debug)]
pub enum ExternalAssessmentError {
    /// Referenced gradebook does not exist or is deleted.
    GradebookNotFound { gradebook_uid: String },
    /// No live external assessment carries the external id.
    AssessmentNotFound {
        gradebook_uid: String,
        external_id: String,
    },
    /// Title collides with an existing internal or external assignment.
    ConflictingAssignmentName {
        gradebook_uid: String,
        title: String,
    },
    /// External id is already registered in the gradebook.
    ConflictingExternalId {
        gradebook_uid: String,
        external_id: String,
    },
    /// Point value failed validation.
    IllegalPoints(IllegalPointsError),
    /// A concurrent writer changed the score between read and write.
    StaleWrite {
        gradebook_uid: String,
        external_id: String,
        student_uid: String,
        expected_version: i64,
        actual_version: i64,
    },
    /// Record failed assignment-level validation.
    Validation(AssignmentValidationError),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ExternalAssessmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GradebookNotFound { gradebook_uid } => {
                write!(f, "gradebook not found: {gradebook_uid}")
            }
            Self::AssessmentNotFound {
                gradebook_uid,
                external_id,
            } => write!(
                f,
                "external assessment `{external_id}` not found in gradebook {gradebook_uid}"
            ),
            Self::ConflictingAssignmentName {
                gradebook_uid,
                title,
            } => write!(
                f,
                "assignment title `{title}` already exists in gradebook {gradebook_uid}"
            ),
            Self::ConflictingExternalId {
                gradebook_uid,
                external_id,
            } => write!(
                f,
                "external id `{external_id}` already registered in gradebook {gradebook_uid}"
            ),
            Self::IllegalPoints(err) => write!(f, "{err}"),
            Self::StaleWrite {
                gradebook_uid,
                external_id,
                student_uid,
                expected_version,
                actual_version,
            } => write!(
                f,
                "stale score write for student {student_uid} on external assessment \
                 `{external_id}` in gradebook {gradebook_uid}: expected version \
                 {expected_version}, found {actual_version}"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ExternalAssessmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IllegalPoints(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IllegalPointsError> for ExternalAssessmentError {
    fn from(value: IllegalPointsError) -> Self {
        Self::IllegalPoints(value)
    }
}

impl From<RepoError> for ExternalAssessmentError {
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
            RepoError::DuplicateExternalId {
                gradebook_uid,
                external_id,
            } => Self::ConflictingExternalId {
                gradebook_uid,
                external_id,
            },
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

/// Registration payload for one external assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterExternalRequest {
    /// Source-scoped identifier, unique within the gradebook.
    pub external_id: String,
    /// Display title, unique within the gradebook.
    pub title: String,
    /// Maximum obtainable points. Must be positive and finite.
    pub points: f64,
    /// Optional due date in epoch milliseconds.
    pub due_at: Option<i64>,
    /// Optional deep link back into the source tool.
    pub external_url: Option<String>,
    /// Display label of the owning service.
    pub service_label: Option<String>,
}

/// Update payload for one external assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExternalRequest {
    pub title: String,
    pub points: f64,
    pub due_at: Option<i64>,
    pub external_url: Option<String>,
}

/// Per-student outcome of a bulk score push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Score applied; carries the record's new version.
    Applied { new_version: i64 },
    /// Score value failed validation; nothing was written.
    IllegalPoints(IllegalPointsError),
    /// A concurrent writer won between read and write.
    Stale {
        expected_version: i64,
        actual_version: i64,
    },
    /// Persistence failure for this entry only.
    Failed { message: String },
}

impl PushOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// One entry of the per-student result list returned by `push_scores`.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentPushResult {
    pub student_uid: String,
    pub outcome: PushOutcome,
}

/// Synchronizer facade over external assessment persistence.
pub struct ExternalAssessmentService<R: ExternalAssessmentRepository> {
    repo: R,
}

impl<R: ExternalAssessmentRepository> ExternalAssessmentService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Registers one externally maintained assessment as an assignment.
    pub fn register(
        &self,
        gradebook_uid: &str,
        request: RegisterExternalRequest,
    ) -> Result<Assignment, ExternalAssessmentError> {
        self.require_gradebook(gradebook_uid)?;
        validate_assignment_points(request.points)?;

        if self
            .repo
            .find_by_external_id(gradebook_uid, &request.external_id)?
            .is_some()
        {
            return Err(ExternalAssessmentError::ConflictingExternalId {
                gradebook_uid: gradebook_uid.to_string(),
                external_id: request.external_id,
            });
        }
        if self.repo.find_by_title(gradebook_uid, &request.title)?.is_some() {
            return Err(ExternalAssessmentError::ConflictingAssignmentName {
                gradebook_uid: gradebook_uid.to_string(),
                title: request.title,
            });
        }

        let source = ExternalSource {
            external_id: request.external_id,
            external_url: request.external_url,
            service_label: request.service_label,
        };
        let mut assignment =
            Assignment::new_external(gradebook_uid, request.title, request.points, source);
        assignment.due_at = request.due_at;

        self.repo.create_assignment(&assignment)?;
        info!(
            "event=external_register module=external status=ok gradebook={gradebook_uid} \
             external_id={} assignment={}",
            assignment.external_id().unwrap_or_default(),
            assignment.title
        );
        Ok(assignment)
    }

    /// Rewrites title, points, due date and url of one external
    /// assessment, re-validating uniqueness against everything but the
    /// assessment itself.
    pub fn update(
        &self,
        gradebook_uid: &str,
        external_id: &str,
        request: UpdateExternalRequest,
    ) -> Result<(), ExternalAssessmentError> {
        self.require_gradebook(gradebook_uid)?;
        let existing = self.require_assessment(gradebook_uid, external_id)?;
        validate_assignment_points(request.points)?;

        if self
            .repo
            .title_taken_by_other(gradebook_uid, &request.title, existing.uuid)?
        {
            return Err(ExternalAssessmentError::ConflictingAssignmentName {
                gradebook_uid: gradebook_uid.to_string(),
                title: request.title,
            });
        }

        let mut candidate = existing.clone();
        candidate.title = request.title;
        candidate.points = request.points;
        candidate.due_at = request.due_at;
        if let Some(source) = candidate.external.as_mut() {
            source.external_url = request.external_url.clone();
        }
        candidate.validate().map_err(ExternalAssessmentError::Validation)?;

        self.repo.update_external(
            existing.uuid,
            &candidate.title,
            candidate.points,
            candidate.due_at,
            request.external_url.as_deref(),
        )?;
        info!(
            "event=external_update module=external status=ok gradebook={gradebook_uid} \
             external_id={external_id}"
        );
        Ok(())
    }

    /// Removes one external assessment.
    ///
    /// Soft-deletes the assignment row: existing scores stay in the
    /// audit journal but become unreachable via normal queries.
    pub fn remove(
        &self,
        gradebook_uid: &str,
        external_id: &str,
    ) -> Result<(), ExternalAssessmentError> {
        self.require_gradebook(gradebook_uid)?;
        let existing = self.require_assessment(gradebook_uid, external_id)?;
        self.repo.soft_delete_assignment(existing.uuid)?;
        info!(
            "event=external_remove module=external status=ok gradebook={gradebook_uid} \
             external_id={external_id}"
        );
        Ok(())
    }

    /// Returns whether an external assessment with the given id exists.
    pub fn is_defined(
        &self,
        gradebook_uid: &str,
        external_id: &str,
    ) -> Result<bool, ExternalAssessmentError> {
        self.require_gradebook(gradebook_uid)?;
        Ok(self
            .repo
            .find_by_external_id(gradebook_uid, external_id)?
            .is_some())
    }

    /// Pushes one student's score from the external source.
    ///
    /// Read-modify-write: the current version is fetched and used as the
    /// write basis; a concurrent writer surfaces as `StaleWrite`.
    pub fn update_score(
        &self,
        gradebook_uid: &str,
        external_id: &str,
        student_uid: &str,
        value: ScoreValue,
    ) -> Result<i64, ExternalAssessmentError> {
        self.require_gradebook(gradebook_uid)?;
        let assessment = self.require_assessment(gradebook_uid, external_id)?;
        value.validate_against(assessment.points)?;

        let basis = self
            .repo
            .get_score(assessment.uuid, student_uid)?
            .map_or(0, |score| score.version);
        self.repo
            .write_score(assessment.uuid, student_uid, value, external_id, basis)
            .map_err(|err| match err {
                RepoError::StaleVersion {
                    expected_version,
                    actual_version,
                } => ExternalAssessmentError::StaleWrite {
                    gradebook_uid: gradebook_uid.to_string(),
                    external_id: external_id.to_string(),
                    student_uid: student_uid.to_string(),
                    expected_version,
                    actual_version,
                },
                other => other.into(),
            })
    }

    /// Pushes a batch of scores from the external source.
    ///
    /// # Contract
    /// - Gradebook and external id are validated up front; those
    ///   failures fail the whole call.
    /// - Entries are processed independently in sorted student order;
    ///   one rejection never rolls back the others.
    /// - The per-student result list reports exactly one outcome per
    ///   input entry.
    pub fn push_scores(
        &self,
        gradebook_uid: &str,
        external_id: &str,
        student_to_score: &BTreeMap<String, ScoreValue>,
    ) -> Result<Vec<StudentPushResult>, ExternalAssessmentError> {
        self.require_gradebook(gradebook_uid)?;
        let assessment = self.require_assessment(gradebook_uid, external_id)?;

        let mut results = Vec::with_capacity(student_to_score.len());
        for (student_uid, value) in student_to_score {
            let outcome = self.push_one(&assessment, external_id, student_uid, *value);
            results.push(StudentPushResult {
                student_uid: student_uid.clone(),
                outcome,
            });
        }

        let applied = results.iter().filter(|r| r.outcome.is_applied()).count();
        info!(
            "event=external_push module=external status=ok gradebook={gradebook_uid} \
             external_id={external_id} applied={applied} rejected={}",
            results.len() - applied
        );
        Ok(results)
    }

    fn push_one(
        &self,
        assessment: &Assignment,
        external_id: &str,
        student_uid: &str,
        value: ScoreValue,
    ) -> PushOutcome {
        if let Err(err) = value.validate_against(assessment.points) {
            return PushOutcome::IllegalPoints(err);
        }

        let basis = match self.repo.get_score(assessment.uuid, student_uid) {
            Ok(score) => score.map_or(0, |score| score.version),
            Err(err) => {
                return PushOutcome::Failed {
                    message: err.to_string(),
                }
            }
        };
        match self
            .repo
            .write_score(assessment.uuid, student_uid, value, external_id, basis)
        {
            Ok(new_version) => PushOutcome::Applied { new_version },
            Err(RepoError::StaleVersion {
                expected_version,
                actual_version,
            }) => PushOutcome::Stale {
                expected_version,
                actual_version,
            },
            Err(err) => PushOutcome::Failed {
                message: err.to_string(),
            },
        }
    }

    fn require_gradebook(&self, gradebook_uid: &str) -> Result<(), ExternalAssessmentError> {
        if !self.repo.gradebook_defined(gradebook_uid)? {
            return Err(ExternalAssessmentError::GradebookNotFound {
                gradebook_uid: gradebook_uid.to_string(),
            });
        }
        Ok(())
    }

    fn require_assessment(
        &self,
        gradebook_uid: &str,
        external_id: &str,
    ) -> Result<Assignment, ExternalAssessmentError> {
        self.repo
            .find_by_external_id(gradebook_uid, external_id)?
            .ok_or_else(|| ExternalAssessmentError::AssessmentNotFound {
                gradebook_uid: gradebook_uid.to_string(),
                external_id: external_id.to_string(),
            })
    }
}
