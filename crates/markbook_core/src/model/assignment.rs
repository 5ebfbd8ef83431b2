//! Assignment domain model.
//!
//! # Responsibility
//! - Define the gradable-item record shared by internal and external
//!   assignments.
//! - Validate point values and external-source descriptors before
//!   persistence.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another assignment.
//! - `(gradebook_uid, title)` is unique among non-deleted assignments;
//!   the repository layer enforces the collision check.
//! - External assignments carry a well-formed `external_id`; internal
//!   assignments carry no external descriptor at all.

use crate::model::is_well_formed_uid;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for an assignment row.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type AssignmentId = Uuid;

/// Descriptor for an assignment whose authoritative source lives outside
/// the gradebook (quiz tool, assessment engine, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSource {
    /// Source-scoped identifier, unique within one gradebook.
    pub external_id: String,
    /// Optional deep link back into the source tool.
    pub external_url: Option<String>,
    /// Display label of the owning service (e.g. "quiz-engine").
    pub service_label: Option<String>,
}

/// A gradable item with a point value, internal or externally sourced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Stable row identity used for score linkage and auditing.
    pub uuid: AssignmentId,
    /// Owning gradebook uid.
    pub gradebook_uid: String,
    /// Display title, unique within the gradebook.
    pub title: String,
    /// Maximum obtainable points. Must be positive and finite.
    pub points: f64,
    /// Optional due date in epoch milliseconds.
    pub due_at: Option<i64>,
    /// `Some` when the assignment is externally maintained.
    pub external: Option<ExternalSource>,
    /// Soft delete tombstone to keep the audit trail resolvable.
    pub is_deleted: bool,
}

impl Assignment {
    /// Creates an internal (gradebook-maintained) assignment with a
    /// generated stable ID.
    pub fn new_internal(
        gradebook_uid: impl Into<String>,
        title: impl Into<String>,
        points: f64,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), gradebook_uid, title, points, None)
    }

    /// Creates an externally maintained assignment with a generated
    /// stable ID.
    pub fn new_external(
        gradebook_uid: impl Into<String>,
        title: impl Into<String>,
        points: f64,
        source: ExternalSource,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), gradebook_uid, title, points, Some(source))
    }

    /// Creates an assignment with a caller-provided stable ID.
    ///
    /// Used by read-back paths where identity already exists in storage.
    pub fn with_id(
        uuid: AssignmentId,
        gradebook_uid: impl Into<String>,
        title: impl Into<String>,
        points: f64,
        external: Option<ExternalSource>,
    ) -> Self {
        Self {
            uuid,
            gradebook_uid: gradebook_uid.into(),
            title: title.into(),
            points,
            due_at: None,
            external,
            is_deleted: false,
        }
    }

    /// Returns whether this assignment is externally maintained.
    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }

    /// Returns the external id when this assignment is externally
    /// maintained.
    pub fn external_id(&self) -> Option<&str> {
        self.external.as_ref().map(|source| source.external_id.as_str())
    }

    /// Validates record invariants before persistence.
    ///
    /// # Errors
    /// - `EmptyGradebookUid` / `EmptyTitle` when identifiers are blank.
    /// - `NonFinitePoints` / `NonPositivePoints` for illegal point values.
    /// - `EmptyExternalId` / `InvalidExternalId` for malformed external
    ///   descriptors.
    pub fn validate(&self) -> Result<(), AssignmentValidationError> {
        if self.gradebook_uid.trim().is_empty() {
            return Err(AssignmentValidationError::EmptyGradebookUid);
        }
        if self.title.trim().is_empty() {
            return Err(AssignmentValidationError::EmptyTitle);
        }
        if !self.points.is_finite() {
            return Err(AssignmentValidationError::NonFinitePoints);
        }
        if self.points <= 0.0 {
            return Err(AssignmentValidationError::NonPositivePoints(self.points));
        }
        if let Some(source) = &self.external {
            let external_id = source.external_id.trim();
            if external_id.is_empty() {
                return Err(AssignmentValidationError::EmptyExternalId);
            }
            if !is_well_formed_uid(external_id) {
                return Err(AssignmentValidationError::InvalidExternalId(
                    source.external_id.clone(),
                ));
            }
        }
        Ok(())
    }
}

/// Assignment record validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentValidationError {
    EmptyGradebookUid,
    EmptyTitle,
    NonFinitePoints,
    NonPositivePoints(f64),
    EmptyExternalId,
    InvalidExternalId(String),
}

impl Display for AssignmentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyGradebookUid => write!(f, "assignment gradebook uid must not be empty"),
            Self::EmptyTitle => write!(f, "assignment title must not be empty"),
            Self::NonFinitePoints => write!(f, "assignment points must be a finite number"),
            Self::NonPositivePoints(points) => {
                write!(f, "assignment points must be positive, got {points}")
            }
            Self::EmptyExternalId => write!(f, "external assessment id must not be empty"),
            Self::InvalidExternalId(value) => {
                write!(f, "external assessment id is malformed: `{value}`")
            }
        }
    }
}

impl Error for AssignmentValidationError {}

#[cfg(test)]
mod tests {
    use super::{Assignment, AssignmentValidationError, ExternalSource};

    fn external_source(external_id: &str) -> ExternalSource {
        ExternalSource {
            external_id: external_id.to_string(),
            external_url: None,
            service_label: Some("quiz-engine".to_string()),
        }
    }

    #[test]
    fn internal_assignment_validates() {
        let assignment = Assignment::new_internal("g1", "hw1", 100.0);
        assignment.validate().expect("valid assignment");
        assert!(!assignment.is_external());
        assert!(assignment.external_id().is_none());
    }

    #[test]
    fn external_assignment_exposes_external_id() {
        let assignment = Assignment::new_external("g1", "Quiz", 10.0, external_source("ext-1"));
        assignment.validate().expect("valid assignment");
        assert!(assignment.is_external());
        assert_eq!(assignment.external_id(), Some("ext-1"));
    }

    #[test]
    fn validate_rejects_non_positive_points() {
        let zero = Assignment::new_internal("g1", "hw1", 0.0);
        assert_eq!(
            zero.validate(),
            Err(AssignmentValidationError::NonPositivePoints(0.0))
        );

        let negative = Assignment::new_internal("g1", "hw1", -5.0);
        assert!(matches!(
            negative.validate(),
            Err(AssignmentValidationError::NonPositivePoints(_))
        ));
    }

    #[test]
    fn validate_rejects_non_finite_points() {
        let nan = Assignment::new_internal("g1", "hw1", f64::NAN);
        assert_eq!(nan.validate(), Err(AssignmentValidationError::NonFinitePoints));

        let infinite = Assignment::new_internal("g1", "hw1", f64::INFINITY);
        assert_eq!(
            infinite.validate(),
            Err(AssignmentValidationError::NonFinitePoints)
        );
    }

    #[test]
    fn validate_rejects_malformed_external_ids() {
        let blank = Assignment::new_external("g1", "Quiz", 10.0, external_source("   "));
        assert_eq!(blank.validate(), Err(AssignmentValidationError::EmptyExternalId));

        let spaced = Assignment::new_external("g1", "Quiz", 10.0, external_source("bad id"));
        assert!(matches!(
            spaced.validate(),
            Err(AssignmentValidationError::InvalidExternalId(_))
        ));
    }

    #[test]
    fn validate_rejects_blank_title_and_gradebook() {
        let no_title = Assignment::new_internal("g1", "  ", 10.0);
        assert_eq!(no_title.validate(), Err(AssignmentValidationError::EmptyTitle));

        let no_gradebook = Assignment::new_internal(" ", "hw1", 10.0);
        assert_eq!(
            no_gradebook.validate(),
            Err(AssignmentValidationError::EmptyGradebookUid)
        );
    }
}
