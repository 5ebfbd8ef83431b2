//! Score domain model.
//!
//! # Responsibility
//! - Define the graded/ungraded score value sum type.
//! - Define the versioned score record and its audit-journal entry.
//! - Validate score values against the owning assignment's point cap.
//!
//! # Invariants
//! - "Ungraded" is `ScoreValue::Ungraded`, never an accidental zero.
//! - `version` increases by exactly one per applied write; `0` means no
//!   record has ever been written.

use crate::model::assignment::AssignmentId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Score value attached to one (assignment, student) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreValue {
    /// A numeric grade in `[0, assignment.points]`.
    Graded(f64),
    /// No grade assigned; distinct from a grade of zero.
    Ungraded,
}

impl ScoreValue {
    /// Maps a nullable stored value into the explicit sum type.
    pub fn from_points(points: Option<f64>) -> Self {
        match points {
            Some(value) => Self::Graded(value),
            None => Self::Ungraded,
        }
    }

    /// Returns the numeric grade, or `None` when ungraded.
    pub fn as_points(self) -> Option<f64> {
        match self {
            Self::Graded(value) => Some(value),
            Self::Ungraded => None,
        }
    }

    /// Returns whether a grade has been assigned.
    pub fn is_graded(self) -> bool {
        matches!(self, Self::Graded(_))
    }

    /// Validates this value against the owning assignment's point cap.
    ///
    /// `Ungraded` is always legal. A graded value must be finite,
    /// non-negative and must not exceed `max_points`.
    pub fn validate_against(self, max_points: f64) -> Result<(), IllegalPointsError> {
        let Self::Graded(value) = self else {
            return Ok(());
        };
        if !value.is_finite() {
            return Err(IllegalPointsError::NotFinite { value });
        }
        if value < 0.0 {
            return Err(IllegalPointsError::Negative { value });
        }
        if value > max_points {
            return Err(IllegalPointsError::ExceedsMaximum { value, max_points });
        }
        Ok(())
    }
}

/// Illegal point value, for score writes and assignment registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IllegalPointsError {
    NotFinite { value: f64 },
    Negative { value: f64 },
    ExceedsMaximum { value: f64, max_points: f64 },
    NonPositiveAssignmentPoints { points: f64 },
}

impl Display for IllegalPointsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFinite { value } => write!(f, "score value must be finite, got {value}"),
            Self::Negative { value } => {
                write!(f, "score value must not be negative, got {value}")
            }
            Self::ExceedsMaximum { value, max_points } => write!(
                f,
                "score value {value} exceeds assignment maximum of {max_points}"
            ),
            Self::NonPositiveAssignmentPoints { points } => write!(
                f,
                "assignment points must be positive and finite, got {points}"
            ),
        }
    }
}

impl Error for IllegalPointsError {}

/// Validates an assignment point value supplied at registration time.
pub fn validate_assignment_points(points: f64) -> Result<(), IllegalPointsError> {
    if !points.is_finite() || points <= 0.0 {
        return Err(IllegalPointsError::NonPositiveAssignmentPoints { points });
    }
    Ok(())
}

/// Current score record for one (assignment, student) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentScore {
    /// Owning assignment row identity.
    pub assignment_uuid: AssignmentId,
    /// Student the score belongs to.
    pub student_uid: String,
    /// Graded value or explicit ungraded state.
    pub value: ScoreValue,
    /// Optimistic concurrency version; incremented on every write.
    pub version: i64,
    /// Who/what wrote the score last (grader client or external id).
    pub source: String,
    /// Last write timestamp in epoch milliseconds.
    pub updated_at: i64,
}

/// One append-only audit journal entry for a score write.
///
/// `old_version == 0` means no score record existed before the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAuditEntry {
    pub entry_id: i64,
    pub assignment_uuid: AssignmentId,
    pub student_uid: String,
    pub old_points: Option<f64>,
    pub new_points: Option<f64>,
    pub old_version: i64,
    pub new_version: i64,
    pub source: String,
    pub recorded_at: i64,
}

#[cfg(test)]
mod tests {
    use super::{validate_assignment_points, IllegalPointsError, ScoreValue};

    #[test]
    fn ungraded_is_distinct_from_zero() {
        assert!(ScoreValue::Graded(0.0).is_graded());
        assert!(!ScoreValue::Ungraded.is_graded());
        assert_ne!(ScoreValue::Graded(0.0), ScoreValue::Ungraded);
    }

    #[test]
    fn points_round_trip_through_option() {
        assert_eq!(ScoreValue::from_points(Some(85.0)), ScoreValue::Graded(85.0));
        assert_eq!(ScoreValue::from_points(None), ScoreValue::Ungraded);
        assert_eq!(ScoreValue::Graded(85.0).as_points(), Some(85.0));
        assert_eq!(ScoreValue::Ungraded.as_points(), None);
    }

    #[test]
    fn ungraded_is_always_legal() {
        ScoreValue::Ungraded
            .validate_against(10.0)
            .expect("ungraded is legal");
    }

    #[test]
    fn graded_values_respect_the_cap() {
        ScoreValue::Graded(0.0).validate_against(10.0).expect("zero is legal");
        ScoreValue::Graded(10.0)
            .validate_against(10.0)
            .expect("cap itself is legal");

        let over = ScoreValue::Graded(10.5).validate_against(10.0).unwrap_err();
        assert_eq!(
            over,
            IllegalPointsError::ExceedsMaximum {
                value: 10.5,
                max_points: 10.0
            }
        );
    }

    #[test]
    fn graded_values_must_be_finite_and_non_negative() {
        assert!(matches!(
            ScoreValue::Graded(f64::NAN).validate_against(10.0),
            Err(IllegalPointsError::NotFinite { .. })
        ));
        assert!(matches!(
            ScoreValue::Graded(-1.0).validate_against(10.0),
            Err(IllegalPointsError::Negative { .. })
        ));
    }

    #[test]
    fn assignment_points_must_be_positive_and_finite() {
        validate_assignment_points(100.0).expect("positive finite points");
        assert!(matches!(
            validate_assignment_points(0.0),
            Err(IllegalPointsError::NonPositiveAssignmentPoints { .. })
        ));
        assert!(matches!(
            validate_assignment_points(f64::INFINITY),
            Err(IllegalPointsError::NonPositiveAssignmentPoints { .. })
        ));
    }

    #[test]
    fn score_value_serializes_with_stable_naming() {
        let graded = serde_json::to_string(&ScoreValue::Graded(85.0)).unwrap();
        assert_eq!(graded, r#"{"graded":85.0}"#);
        let ungraded = serde_json::to_string(&ScoreValue::Ungraded).unwrap();
        assert_eq!(ungraded, r#""ungraded""#);
    }
}
