//! Grading repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide assignment lookup and versioned score read/write APIs.
//! - Own the score write critical section: compare-and-increment on the
//!   `version` column plus the audit journal append, in one transaction.
//!
//! # Invariants
//! - Write paths must call `Assignment::validate()` before SQL mutations.
//! - The audit row is inserted before the score row is applied, inside
//!   the same transaction (log-then-apply).
//! - A write commits with `version = expected + 1` or fails
//!   `StaleVersion`; the stored score is unchanged on failure.

use crate::model::assignment::{Assignment, AssignmentId, ExternalSource};
use crate::model::score::{ScoreAuditEntry, ScoreValue, StudentScore};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult, TableRequirement};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

pub(crate) const ASSIGNMENT_SELECT_SQL: &str = "SELECT
    uuid,
    gradebook_uid,
    title,
    points,
    due_at,
    external_id,
    external_url,
    service_label,
    is_deleted
FROM assignments";

const GRADING_TABLES: &[TableRequirement] = &[
    TableRequirement {
        table: "gradebooks",
        columns: &["uid", "name", "is_deleted"],
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
            "is_deleted",
        ],
    },
    TableRequirement {
        table: "scores",
        columns: &["assignment_uuid", "student_uid", "points", "version", "source"],
    },
    TableRequirement {
        table: "score_audit",
        columns: &[
            "entry_id",
            "assignment_uuid",
            "student_uid",
            "old_points",
            "new_points",
            "old_version",
            "new_version",
            "source",
        ],
    },
];

/// Repository interface for grading operations.
pub trait GradingRepository {
    /// Returns whether the gradebook exists and is not deleted.
    fn gradebook_defined(&self, gradebook_uid: &str) -> RepoResult<bool>;
    /// Finds one assignment by title within a gradebook.
    fn find_assignment(
        &self,
        gradebook_uid: &str,
        title: &str,
        include_deleted: bool,
    ) -> RepoResult<Option<Assignment>>;
    /// Creates one assignment; rejects title/external-id collisions.
    fn create_assignment(&self, assignment: &Assignment) -> RepoResult<AssignmentId>;
    /// Lists non-deleted assignments of a gradebook, ordered by title.
    fn list_assignments(&self, gradebook_uid: &str) -> RepoResult<Vec<Assignment>>;
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
    /// Reads the append-only audit journal for one score record.
    fn audit_trail(
        &self,
        assignment_uuid: AssignmentId,
        student_uid: &str,
    ) -> RepoResult<Vec<ScoreAuditEntry>>;
}

/// SQLite-backed grading repository.
pub struct SqliteGradingRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGradingRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, GRADING_TABLES)?;
        Ok(Self { conn })
    }
}

impl GradingRepository for SqliteGradingRepository<'_> {
    fn gradebook_defined(&self, gradebook_uid: &str) -> RepoResult<bool> {
        gradebook_defined(self.conn, gradebook_uid)
    }

    fn find_assignment(
        &self,
        gradebook_uid: &str,
        title: &str,
        include_deleted: bool,
    ) -> RepoResult<Option<Assignment>> {
        find_assignment_by_title(self.conn, gradebook_uid, title, include_deleted)
    }

    fn create_assignment(&self, assignment: &Assignment) -> RepoResult<AssignmentId> {
        insert_assignment(self.conn, assignment)
    }

    fn list_assignments(&self, gradebook_uid: &str) -> RepoResult<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSIGNMENT_SELECT_SQL}
             WHERE gradebook_uid = ?1
               AND is_deleted = 0
             ORDER BY title ASC, uuid ASC;"
        ))?;

        let mut rows = stmt.query([gradebook_uid])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
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

    fn audit_trail(
        &self,
        assignment_uuid: AssignmentId,
        student_uid: &str,
    ) -> RepoResult<Vec<ScoreAuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                entry_id,
                assignment_uuid,
                student_uid,
                old_points,
                new_points,
                old_version,
                new_version,
                source,
                recorded_at
             FROM score_audit
             WHERE assignment_uuid = ?1
               AND student_uid = ?2
             ORDER BY entry_id ASC;",
        )?;

        let mut rows = stmt.query(params![assignment_uuid.to_string(), student_uid])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_audit_row(row)?);
        }
        Ok(entries)
    }
}

pub(crate) fn gradebook_defined(conn: &Connection, gradebook_uid: &str) -> RepoResult<bool> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM gradebooks WHERE uid = ?1 AND is_deleted = 0;")?;
    let defined = stmt.exists([gradebook_uid])?;
    Ok(defined)
}

pub(crate) fn find_assignment_by_title(
    conn: &Connection,
    gradebook_uid: &str,
    title: &str,
    include_deleted: bool,
) -> RepoResult<Option<Assignment>> {
    let mut stmt = conn.prepare(&format!(
        "{ASSIGNMENT_SELECT_SQL}
         WHERE gradebook_uid = ?1
           AND title = ?2
           AND (?3 = 1 OR is_deleted = 0);"
    ))?;

    let mut rows = stmt.query(params![gradebook_uid, title, bool_to_int(include_deleted)])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_assignment_row(row)?));
    }
    Ok(None)
}

/// Inserts one assignment after validation and collision checks.
///
/// The check-then-insert pair runs inside an IMMEDIATE transaction; the
/// partial unique indexes on `(gradebook_uid, title)` and
/// `(gradebook_uid, external_id)` back the same invariants at the SQL
/// level.
pub(crate) fn insert_assignment(
    conn: &Connection,
    assignment: &Assignment,
) -> RepoResult<AssignmentId> {
    assignment.validate()?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    if !gradebook_defined(&tx, &assignment.gradebook_uid)? {
        return Err(RepoError::GradebookNotFound {
            gradebook_uid: assignment.gradebook_uid.clone(),
        });
    }

    if find_assignment_by_title(&tx, &assignment.gradebook_uid, &assignment.title, false)?
        .is_some()
    {
        return Err(RepoError::DuplicateTitle {
            gradebook_uid: assignment.gradebook_uid.clone(),
            title: assignment.title.clone(),
        });
    }

    if let Some(external_id) = assignment.external_id() {
        let mut stmt = tx.prepare(
            "SELECT 1 FROM assignments
             WHERE gradebook_uid = ?1
               AND external_id = ?2
               AND is_deleted = 0;",
        )?;
        if stmt.exists(params![assignment.gradebook_uid, external_id])? {
            return Err(RepoError::DuplicateExternalId {
                gradebook_uid: assignment.gradebook_uid.clone(),
                external_id: external_id.to_string(),
            });
        }
    }

    let source = assignment.external.as_ref();
    tx.execute(
        "INSERT INTO assignments (
            uuid,
            gradebook_uid,
            title,
            points,
            due_at,
            external_id,
            external_url,
            service_label,
            is_deleted
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            assignment.uuid.to_string(),
            assignment.gradebook_uid.as_str(),
            assignment.title.as_str(),
            assignment.points,
            assignment.due_at,
            source.map(|s| s.external_id.as_str()),
            source.and_then(|s| s.external_url.as_deref()),
            source.and_then(|s| s.service_label.as_deref()),
            bool_to_int(assignment.is_deleted),
        ],
    )?;
    tx.commit()?;

    Ok(assignment.uuid)
}

pub(crate) fn get_score(
    conn: &Connection,
    assignment_uuid: AssignmentId,
    student_uid: &str,
) -> RepoResult<Option<StudentScore>> {
    let mut stmt = conn.prepare(
        "SELECT points, version, source, updated_at
         FROM scores
         WHERE assignment_uuid = ?1
           AND student_uid = ?2;",
    )?;

    let mut rows = stmt.query(params![assignment_uuid.to_string(), student_uid])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(StudentScore {
            assignment_uuid,
            student_uid: student_uid.to_string(),
            value: ScoreValue::from_points(row.get("points")?),
            version: row.get("version")?,
            source: row.get("source")?,
            updated_at: row.get("updated_at")?,
        }));
    }
    Ok(None)
}

/// Applies one versioned score write and returns the new version.
///
/// The whole check-append-apply sequence runs inside one IMMEDIATE
/// transaction so that no two writers can resolve the same expected
/// version, and so that a crash never leaves an applied score without
/// its audit row.
pub(crate) fn write_score(
    conn: &Connection,
    assignment_uuid: AssignmentId,
    student_uid: &str,
    value: ScoreValue,
    source: &str,
    expected_version: i64,
) -> RepoResult<i64> {
    let source = source.trim();
    if source.is_empty() {
        return Err(RepoError::InvalidData(
            "score source label must not be empty".to_string(),
        ));
    }
    if student_uid.trim().is_empty() {
        return Err(RepoError::InvalidData(
            "student uid must not be empty".to_string(),
        ));
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let assignment_key = assignment_uuid.to_string();
    let mut stmt = tx.prepare(
        "SELECT points, version
         FROM scores
         WHERE assignment_uuid = ?1
           AND student_uid = ?2;",
    )?;
    let mut rows = stmt.query(params![assignment_key, student_uid])?;
    let existing: Option<(Option<f64>, i64)> = match rows.next()? {
        Some(row) => Some((row.get(0)?, row.get(1)?)),
        None => None,
    };
    drop(rows);
    drop(stmt);

    let (old_points, actual_version) = existing.unwrap_or((None, 0));
    if actual_version != expected_version {
        return Err(RepoError::StaleVersion {
            expected_version,
            actual_version,
        });
    }

    let new_version = actual_version + 1;
    let new_points = value.as_points();

    tx.execute(
        "INSERT INTO score_audit (
            assignment_uuid,
            student_uid,
            old_points,
            new_points,
            old_version,
            new_version,
            source
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            assignment_key,
            student_uid,
            old_points,
            new_points,
            actual_version,
            new_version,
            source,
        ],
    )?;

    if existing.is_some() {
        let changed = tx.execute(
            "UPDATE scores
             SET
                points = ?1,
                version = ?2,
                source = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE assignment_uuid = ?4
               AND student_uid = ?5
               AND version = ?6;",
            params![
                new_points,
                new_version,
                source,
                assignment_key,
                student_uid,
                expected_version,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::StaleVersion {
                expected_version,
                actual_version,
            });
        }
    } else {
        tx.execute(
            "INSERT INTO scores (
                assignment_uuid,
                student_uid,
                points,
                version,
                source
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![assignment_key, student_uid, new_points, new_version, source],
        )?;
    }

    tx.commit()?;
    Ok(new_version)
}

pub(crate) fn parse_assignment_row(row: &Row<'_>) -> RepoResult<Assignment> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in assignments.uuid"
        ))
    })?;

    let external_id: Option<String> = row.get("external_id")?;
    let external = match external_id {
        Some(external_id) => Some(ExternalSource {
            external_id,
            external_url: row.get("external_url")?,
            service_label: row.get("service_label")?,
        }),
        None => None,
    };

    let is_deleted = match row.get::<_, i64>("is_deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_deleted value `{other}` in assignments.is_deleted"
            )));
        }
    };

    let assignment = Assignment {
        uuid,
        gradebook_uid: row.get("gradebook_uid")?,
        title: row.get("title")?,
        points: row.get("points")?,
        due_at: row.get("due_at")?,
        external,
        is_deleted,
    };
    assignment.validate()?;
    Ok(assignment)
}

fn parse_audit_row(row: &Row<'_>) -> RepoResult<ScoreAuditEntry> {
    let uuid_text: String = row.get("assignment_uuid")?;
    let assignment_uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in score_audit.assignment_uuid"
        ))
    })?;

    Ok(ScoreAuditEntry {
        entry_id: row.get("entry_id")?,
        assignment_uuid,
        student_uid: row.get("student_uid")?,
        old_points: row.get("old_points")?,
        new_points: row.get("new_points")?,
        old_version: row.get("old_version")?,
        new_version: row.get("new_version")?,
        source: row.get("source")?,
        recorded_at: row.get("recorded_at")?,
    })
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
