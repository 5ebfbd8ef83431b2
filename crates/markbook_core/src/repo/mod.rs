//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes must run model validation before SQL mutations.
//! - Repository APIs return semantic errors (`GradebookNotFound`,
//!   `StaleVersion`, `DuplicateTitle`, ...) in addition to DB transport
//!   errors.
//! - Repositories refuse to operate on connections whose schema is not
//!   fully migrated.

use crate::db::{migrations, DbError};
use crate::model::assignment::{AssignmentId, AssignmentValidationError};
use crate::model::gradebook::GradebookValidationError;
use rusqlite::Connection;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod external_repo;
pub mod gradebook_repo;
pub mod grading_repo;
pub mod roster_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for gradebook persistence and query
/// operations.
#[derive(Debug)]
pub enum RepoError {
    /// Assignment record failed model validation.
    Validation(AssignmentValidationError),
    /// Gradebook record failed model validation.
    GradebookValidation(GradebookValidationError),
    /// Transport-level SQLite failure.
    Db(DbError),
    /// Referenced gradebook does not exist or is deleted.
    GradebookNotFound { gradebook_uid: String },
    /// Gradebook uid already taken (live or tombstoned; uids are never
    /// reused).
    GradebookAlreadyDefined { gradebook_uid: String },
    /// Assignment row addressed by uuid does not exist or is deleted.
    AssignmentNotFound(AssignmentId),
    /// Optimistic concurrency version mismatch on a score write.
    StaleVersion {
        expected_version: i64,
        actual_version: i64,
    },
    /// Assignment title already taken within the gradebook.
    DuplicateTitle {
        gradebook_uid: String,
        title: String,
    },
    /// External assessment id already registered within the gradebook.
    DuplicateExternalId {
        gradebook_uid: String,
        external_id: String,
    },
    /// Persisted state failed to parse back into the domain model.
    InvalidData(String),
    /// Connection has not run migrations up to the supported version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Connection schema is missing a required table.
    MissingRequiredTable(&'static str),
    /// Connection schema is missing a required column.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::GradebookValidation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::GradebookNotFound { gradebook_uid } => {
                write!(f, "gradebook not found: {gradebook_uid}")
            }
            Self::GradebookAlreadyDefined { gradebook_uid } => {
                write!(f, "gradebook uid already defined: {gradebook_uid}")
            }
            Self::AssignmentNotFound(id) => write!(f, "assignment not found: {id}"),
            Self::StaleVersion {
                expected_version,
                actual_version,
            } => write!(
                f,
                "score version changed since read: expected {expected_version}, found {actual_version}"
            ),
            Self::DuplicateTitle {
                gradebook_uid,
                title,
            } => write!(
                f,
                "assignment title `{title}` already exists in gradebook {gradebook_uid}"
            ),
            Self::DuplicateExternalId {
                gradebook_uid,
                external_id,
            } => write!(
                f,
                "external id `{external_id}` already registered in gradebook {gradebook_uid}"
            ),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted gradebook data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version is {actual_version}, expected {expected_version}; run migrations first"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "connection schema is missing required table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "connection schema is missing required column `{table}.{column}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::GradebookValidation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AssignmentValidationError> for RepoError {
    fn from(value: AssignmentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GradebookValidationError> for RepoError {
    fn from(value: GradebookValidationError) -> Self {
        Self::GradebookValidation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One table (plus required columns) a repository depends on.
pub(crate) struct TableRequirement {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

/// Verifies the connection is migrated and carries the given tables.
///
/// Called by every repository constructor so that a half-initialized
/// connection fails fast instead of producing opaque SQL errors later.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    requirements: &[TableRequirement],
) -> RepoResult<()> {
    let expected_version = migrations::latest_version();
    let actual_version =
        conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for requirement in requirements {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
        let mut rows = stmt.query([requirement.table])?;
        let mut present: HashSet<String> = HashSet::new();
        while let Some(row) = rows.next()? {
            present.insert(row.get(0)?);
        }

        if present.is_empty() {
            return Err(RepoError::MissingRequiredTable(requirement.table));
        }
        for column in requirement.columns {
            if !present.contains(*column) {
                return Err(RepoError::MissingRequiredColumn {
                    table: requirement.table,
                    column,
                });
            }
        }
    }

    Ok(())
}
