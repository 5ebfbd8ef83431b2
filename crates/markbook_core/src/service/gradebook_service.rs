//! Gradebook directory use-case service.
//!
//! # Responsibility
//! - Provide lifecycle and existence APIs for gradebook containers.
//! - Keep the "is this gradebook defined" check cheap and infallible
//!   for callers probing before grading operations.
//!
//! # Invariants
//! - A gradebook uid is never reused; re-creating a deleted uid is a
//!   conflict.
//! - `is_gradebook_defined` answers `false` on lookup failure instead of
//!   erroring.

use crate::model::gradebook::{Gradebook, GradebookValidationError};
use crate::repo::gradebook_repo::GradebookRepository;
use crate::repo::{RepoError, RepoResult};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for gradebook directory use-cases.
#[derive(Debug)]
pub enum GradebookDirectoryError {
    /// The uid is already taken, by a live or deleted gradebook.
    AlreadyDefined { gradebook_uid: String },
    /// Target gradebook does not exist or is deleted.
    NotFound { gradebook_uid: String },
    /// Record failed directory-level validation.
    Validation(GradebookValidationError),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for GradebookDirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyDefined { gradebook_uid } => {
                write!(f, "gradebook uid already defined: {gradebook_uid}")
            }
            Self::NotFound { gradebook_uid } => {
                write!(f, "gradebook not found: {gradebook_uid}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GradebookDirectoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for GradebookDirectoryError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::GradebookAlreadyDefined { gradebook_uid } => {
                Self::AlreadyDefined { gradebook_uid }
            }
            RepoError::GradebookNotFound { gradebook_uid } => Self::NotFound { gradebook_uid },
            RepoError::GradebookValidation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

/// Directory facade over gradebook lifecycle persistence.
pub struct GradebookDirectory<R: GradebookRepository> {
    repo: R,
}

impl<R: GradebookRepository> GradebookDirectory<R> {
    /// Creates a directory using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one gradebook container.
    pub fn create_gradebook(
        &self,
        uid: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Gradebook, GradebookDirectoryError> {
        let gradebook = Gradebook::new(uid, name);
        self.repo.create_gradebook(&gradebook)?;
        info!(
            "event=gradebook_create module=directory status=ok gradebook={}",
            gradebook.uid
        );
        Ok(gradebook)
    }

    /// Soft-deletes one gradebook and tombstones its assignments.
    ///
    /// Scores stay in the audit journal but become unreachable through
    /// normal grading queries.
    pub fn delete_gradebook(&self, uid: &str) -> Result<(), GradebookDirectoryError> {
        self.repo.soft_delete_gradebook(uid)?;
        info!("event=gradebook_delete module=directory status=ok gradebook={uid}");
        Ok(())
    }

    /// Returns whether a gradebook was created and not deleted.
    ///
    /// Never errors: lookup failures are logged and answered `false`.
    pub fn is_gradebook_defined(&self, uid: &str) -> bool {
        match self.repo.gradebook_defined(uid) {
            Ok(defined) => defined,
            Err(err) => {
                warn!(
                    "event=gradebook_defined module=directory status=error gradebook={uid} error={err}"
                );
                false
            }
        }
    }

    /// Gets one live gradebook by uid.
    pub fn get_gradebook(&self, uid: &str) -> RepoResult<Option<Gradebook>> {
        self.repo.get_gradebook(uid, false)
    }
}
