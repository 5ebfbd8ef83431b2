//! Gradebook directory record.
//!
//! # Responsibility
//! - Define the container identity that assignments and scores hang off.
//! - Provide lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `uid` is stable and never reused for another gradebook, even after
//!   soft deletion.
//! - `is_deleted` is the source of truth for tombstone state.

use crate::model::is_well_formed_uid;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A named container of assignments and scores for one course/site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gradebook {
    /// Externally supplied stable identifier (site/course uid).
    pub uid: String,
    /// Human-readable display name.
    pub name: String,
    /// Soft delete tombstone; deleted gradebooks stay on record.
    pub is_deleted: bool,
}

impl Gradebook {
    /// Creates a new active gradebook record.
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            is_deleted: false,
        }
    }

    /// Marks this gradebook as softly deleted (tombstoned).
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }

    /// Returns whether this gradebook should be considered visible/active.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    /// Validates directory-level invariants before persistence.
    ///
    /// # Errors
    /// - `EmptyUid` / `InvalidUid` when the uid is blank or malformed.
    /// - `EmptyName` when the display name is blank.
    pub fn validate(&self) -> Result<(), GradebookValidationError> {
        let uid = self.uid.trim();
        if uid.is_empty() {
            return Err(GradebookValidationError::EmptyUid);
        }
        if !is_well_formed_uid(uid) {
            return Err(GradebookValidationError::InvalidUid(self.uid.clone()));
        }
        if self.name.trim().is_empty() {
            return Err(GradebookValidationError::EmptyName);
        }
        Ok(())
    }
}

/// Gradebook record validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradebookValidationError {
    EmptyUid,
    InvalidUid(String),
    EmptyName,
}

impl Display for GradebookValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUid => write!(f, "gradebook uid must not be empty"),
            Self::InvalidUid(value) => write!(f, "gradebook uid is malformed: `{value}`"),
            Self::EmptyName => write!(f, "gradebook name must not be empty"),
        }
    }
}

impl Error for GradebookValidationError {}
