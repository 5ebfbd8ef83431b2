//! Authorization gate for grading operations.
//!
//! # Responsibility
//! - Decide whether the acting principal may read/write a student's
//!   score in a gradebook.
//! - Provide the fail-closed boolean check and the enforcing variant
//!   that grading calls route through.
//!
//! # Invariants
//! - `can_grade` never errors; any lookup failure answers `false`.
//! - The gate check and a subsequent score write are not atomic with
//!   respect to role changes; a role revoked mid-call may still let an
//!   in-flight write complete.

use crate::model::principal::{Principal, RosterRole};
use crate::repo::roster_repo::RosterRepository;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Declared authorization failure for grading operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotAuthorized {
    pub principal_uid: String,
    pub gradebook_uid: String,
    pub student_uid: String,
}

impl Display for NotAuthorized {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "user {} is not allowed to grade student {} in gradebook {}",
            self.principal_uid, self.student_uid, self.gradebook_uid
        )
    }
}

impl Error for NotAuthorized {}

/// Gate consulted by every reading/mutating grading call.
pub trait GradeAuthorizer {
    /// Returns whether the principal may grade the student.
    ///
    /// Fail-closed: lookup failures answer `false`, never an error.
    fn can_grade(&self, principal: &Principal, gradebook_uid: &str, student_uid: &str) -> bool;

    /// Errors with `NotAuthorized` when `can_grade` answers `false`.
    fn enforce_grade(
        &self,
        principal: &Principal,
        gradebook_uid: &str,
        student_uid: &str,
    ) -> Result<(), NotAuthorized> {
        if self.can_grade(principal, gradebook_uid, student_uid) {
            Ok(())
        } else {
            Err(NotAuthorized {
                principal_uid: principal.user_uid.clone(),
                gradebook_uid: gradebook_uid.to_string(),
                student_uid: student_uid.to_string(),
            })
        }
    }
}

/// Roster-backed authorization gate.
///
/// Grants grading access when the principal holds a grading role
/// (instructor or teaching assistant) in the gradebook and the target
/// user is enrolled there as a student.
pub struct RosterAuthorizer<R: RosterRepository> {
    roster: R,
}

impl<R: RosterRepository> RosterAuthorizer<R> {
    /// Creates a gate using the provided roster repository.
    pub fn new(roster: R) -> Self {
        Self { roster }
    }
}

impl<R: RosterRepository> GradeAuthorizer for RosterAuthorizer<R> {
    fn can_grade(&self, principal: &Principal, gradebook_uid: &str, student_uid: &str) -> bool {
        let grader_role = match self.roster.role_of(gradebook_uid, &principal.user_uid) {
            Ok(role) => role,
            Err(err) => {
                warn!(
                    "event=auth_check module=authorization status=error gradebook={gradebook_uid} user={} error={err}",
                    principal.user_uid
                );
                return false;
            }
        };
        let Some(grader_role) = grader_role else {
            return false;
        };
        if !grader_role.can_grade() {
            return false;
        }

        match self.roster.role_of(gradebook_uid, student_uid) {
            Ok(Some(RosterRole::Student)) => true,
            Ok(_) => false,
            Err(err) => {
                warn!(
                    "event=auth_check module=authorization status=error gradebook={gradebook_uid} student={student_uid} error={err}"
                );
                false
            }
        }
    }
}
