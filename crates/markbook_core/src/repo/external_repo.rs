//! External assessment repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide external-id addressed assignment persistence for the
//!   synchronizer.
//! - Reuse the grading repository's score write path so bulk pushes hit
//!   the same versioned critical section as human grading.
//!
//! # Invariants
//! - External-id lookups are constrained to live rows; removal leaves
//!   score rows and the audit journal untouched.
//! - Updates re-validate the full record before any SQL mutation.

use crate::model::assignment::{Assignment, AssignmentId};
use crate::model::score::{ScoreValue, StudentScore};
use crate::repo::grading_repo::{
    find_assignment_by_title, get_score, gradebook_defined, insert_assignment,
    parse_assignment_row, write_score, ASSIGNMENT_SELECT_SQL,
};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult, TableRequirement};
use rusqlite::{params, Connection};

const EXTERNAL_TABLES: &[TableRequirement] = &[
    TableRequirement {
        table: "gradebooks",
        columns: &["uid", "is_deleted"],
    },
    TableRequirement {
        table: "assignments",
        columns: &[
            "uuid",
            "gradebook_uid",
            "title",
            "points",
            "due_at",
            "external_id",
            "external_url",
            "service_label",
            "is_deleted",
        ],
    },
    TableRequirement {
        table: "scores",
        columns: &["assignment_uuid", "student_uid", "points", "version", "source"],
    },
    TableRequirement {
        table: "score_audit",
        columns: &["entry_id", "assignment_uuid", "student_uid", "source"],
    },
];

/// Repository interface for external assessment synchronization.
pub trait ExternalAssessmentRepository {
    /// Returns whether the gradebook exists and is not deleted.
    fn gradebook_defined(&self, gradebook_uid: &str) -> RepoResult<bool>;
    /// Finds one live external assignment by its external id.
    fn find_by_external_id(
        &self,
        gradebook_uid: &str,
        external_id: &str,
    ) -> RepoResult<Option<Assignment>>;
    /// Returns whether a different live assignment already uses the
    /// title.
    fn title_taken_by_other(
        &self,
        gradebook_uid: &str,
        title: &str,
        exclude: AssignmentId,
    ) -> RepoResult<bool>;
    /// Finds one live assignment (internal or external) by title.
    fn find_by_title(&self, gradebook_uid: &str, title: &str)
        -> RepoResult<Option<Assignment>>;
    /// Creates one assignment; rejects title/external-id collisions.
    fn create_assignment(&self, assignment: &Assignment) -> RepoResult<AssignmentId>;
    /// Rewrites the mutable fields of one external assignment.
    fn update_external(
        &self,
        assignment_uuid: AssignmentId,
        title: &str,
        points: f64,
        due_at: Option<i64>,
        external_url: Option<&str>,
    ) -> RepoResult<()>;
    /// Soft-deletes one assignment row.
    fn soft_delete_assignment(&self, assignment_uuid: AssignmentId) -> RepoResult<()>;
    /// Gets the current score record, or `None` when never written.
    fn get_score(
        &self,
        assignment_uuid: AssignmentId,
        student_uid: &str,
    ) -> RepoResult<Option<StudentScore>>;
    /// Applies one versioned score write and returns the new version.
    fn write_score(
        &self,
        assignment_uuid: AssignmentId,
        student_uid: &str,
        value: ScoreValue,
        source: &str,
        expected_version: i64,
    ) -> RepoResult<i64>;
}

/// SQLite-backed external assessment repository.
pub struct SqliteExternalAssessmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteExternalAssessmentRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, EXTERNAL_TABLES)?;
        Ok(Self { conn })
    }
}

impl ExternalAssessmentRepository for SqliteExternalAssessmentRepository<'_> {
    fn gradebook_defined(&self, gradebook_uid: &str) -> RepoResult<bool> {
        gradebook_defined(self.conn, gradebook_uid)
    }

    fn find_by_external_id(
        &self,
        gradebook_uid: &str,
        external_id: &str,
    ) -> RepoResult<Option<Assignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSIGNMENT_SELECT_SQL}
             WHERE gradebook_uid = ?1
               AND external_id = ?2
               AND is_deleted = 0;"
        ))?;

        let mut rows = stmt.query(params![gradebook_uid, external_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_assignment_row(row)?));
        }
        Ok(None)
    }

    fn title_taken_by_other(
        &self,
        gradebook_uid: &str,
        title: &str,
        exclude: AssignmentId,
    ) -> RepoResult<bool> {
        let mut stmt = self.conn.prepare(
            "SELECT 1 FROM assignments
             WHERE gradebook_uid = ?1
               AND title = ?2
               AND uuid != ?3
               AND is_deleted = 0;",
        )?;
        let taken = stmt.exists(params![gradebook_uid, title, exclude.to_string()])?;
        Ok(taken)
    }

    fn find_by_title(
        &self,
        gradebook_uid: &str,
        title: &str,
    ) -> RepoResult<Option<Assignment>> {
        find_assignment_by_title(self.conn, gradebook_uid, title, false)
    }

    fn create_assignment(&self, assignment: &Assignment) -> RepoResult<AssignmentId> {
        insert_assignment(self.conn, assignment)
    }

    fn update_external(
        &self,
        assignment_uuid: AssignmentId,
        title: &str,
        points: f64,
        due_at: Option<i64>,
        external_url: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE assignments
             SET
                title = ?1,
                points = ?2,
                due_at = ?3,
                external_url = ?4,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?5
               AND external_id IS NOT NULL
               AND is_deleted = 0;",
            params![title, points, due_at, external_url, assignment_uuid.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::AssignmentNotFound(assignment_uuid));
        }
        Ok(())
    }

    fn soft_delete_assignment(&self, assignment_uuid: AssignmentId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE assignments
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            [assignment_uuid.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::AssignmentNotFound(assignment_uuid));
        }
        Ok(())
    }

    fn get_score(
        &self,
        assignment_uuid: AssignmentId,
        student_uid: &str,
    ) -> RepoResult<Option<StudentScore>> {
        get_score(self.conn, assignment_uuid, student_uid)
    }

    fn write_score(
        &self,
        assignment_uuid: AssignmentId,
        student_uid: &str,
        value: ScoreValue,
        source: &str,
        expected_version: i64,
    ) -> RepoResult<i64> {
        write_score(
            self.conn,
            assignment_uuid,
            student_uid,
            value,
            source,
            expected_version,
        )
    }
}
