//! Acting-principal identity and roster roles for authorization gates.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// The identity on whose behalf an operation is performed.
///
/// Supplied per call and never persisted by the grading path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable user identifier from the identity provider.
    pub user_uid: String,
}

impl Principal {
    pub fn new(user_uid: impl Into<String>) -> Self {
        Self {
            user_uid: user_uid.into(),
        }
    }
}

/// Per-gradebook membership role used by the authorization gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterRole {
    Instructor,
    TeachingAssistant,
    Student,
    Observer,
}

impl RosterRole {
    /// Stable string id used in roster storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instructor => ROSTER_ROLE_INSTRUCTOR,
            Self::TeachingAssistant => ROSTER_ROLE_TEACHING_ASSISTANT,
            Self::Student => ROSTER_ROLE_STUDENT,
            Self::Observer => ROSTER_ROLE_OBSERVER,
        }
    }

    /// Returns whether this role carries grading rights.
    pub fn can_grade(self) -> bool {
        matches!(self, Self::Instructor | Self::TeachingAssistant)
    }
}

/// Storage string value for the instructor role.
pub const ROSTER_ROLE_INSTRUCTOR: &str = "instructor";
/// Storage string value for the teaching-assistant role.
pub const ROSTER_ROLE_TEACHING_ASSISTANT: &str = "teaching_assistant";
/// Storage string value for the student role.
pub const ROSTER_ROLE_STUDENT: &str = "student";
/// Storage string value for the observer role.
pub const ROSTER_ROLE_OBSERVER: &str = "observer";

/// Parses one roster role from its storage string value.
pub fn parse_roster_role(value: &str) -> Result<RosterRole, RosterRoleError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(RosterRoleError::EmptyRole);
    }

    match normalized {
        ROSTER_ROLE_INSTRUCTOR => Ok(RosterRole::Instructor),
        ROSTER_ROLE_TEACHING_ASSISTANT => Ok(RosterRole::TeachingAssistant),
        ROSTER_ROLE_STUDENT => Ok(RosterRole::Student),
        ROSTER_ROLE_OBSERVER => Ok(RosterRole::Observer),
        other => Err(RosterRoleError::UnsupportedRole(other.to_string())),
    }
}

/// Roster role parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterRoleError {
    EmptyRole,
    UnsupportedRole(String),
}

impl Display for RosterRoleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRole => write!(f, "roster role value must not be empty"),
            Self::UnsupportedRole(value) => write!(f, "roster role is unsupported: {value}"),
        }
    }
}

impl Error for RosterRoleError {}
