//! Roster repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist per-gradebook membership used by the authorization gate.
//! - Answer role lookups scoped to live (non-deleted) gradebooks.
//!
//! # Invariants
//! - One roster row per (gradebook, user); re-assigning replaces the
//!   role.
//! - Role lookups against a deleted gradebook resolve to `None`.

use crate::model::principal::{parse_roster_role, RosterRole};
use crate::repo::grading_repo::gradebook_defined;
use crate::repo::{ensure_connection_ready, RepoError, RepoResult, TableRequirement};
use rusqlite::{params, Connection};

const ROSTER_TABLES: &[TableRequirement] = &[
    TableRequirement {
        table: "gradebooks",
        columns: &["uid", "is_deleted"],
    },
    TableRequirement {
        table: "roster",
        columns: &["gradebook_uid", "user_uid", "role"],
    },
];

/// Repository interface for roster membership.
pub trait RosterRepository {
    /// Adds or replaces one membership row.
    fn set_membership(
        &self,
        gradebook_uid: &str,
        user_uid: &str,
        role: RosterRole,
    ) -> RepoResult<()>;
    /// Removes one membership row if present.
    fn remove_membership(&self, gradebook_uid: &str, user_uid: &str) -> RepoResult<()>;
    /// Returns the user's role in a live gradebook, if any.
    fn role_of(&self, gradebook_uid: &str, user_uid: &str) -> RepoResult<Option<RosterRole>>;
}

/// SQLite-backed roster repository.
pub struct SqliteRosterRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRosterRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, ROSTER_TABLES)?;
        Ok(Self { conn })
    }
}

impl RosterRepository for SqliteRosterRepository<'_> {
    fn set_membership(
        &self,
        gradebook_uid: &str,
        user_uid: &str,
        role: RosterRole,
    ) -> RepoResult<()> {
        if user_uid.trim().is_empty() {
            return Err(RepoError::InvalidData(
                "roster user uid must not be empty".to_string(),
            ));
        }
        if !gradebook_defined(self.conn, gradebook_uid)? {
            return Err(RepoError::GradebookNotFound {
                gradebook_uid: gradebook_uid.to_string(),
            });
        }

        self.conn.execute(
            "INSERT INTO roster (gradebook_uid, user_uid, role)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (gradebook_uid, user_uid)
             DO UPDATE SET
                role = excluded.role,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![gradebook_uid, user_uid, role.as_str()],
        )?;
        Ok(())
    }

    fn remove_membership(&self, gradebook_uid: &str, user_uid: &str) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM roster WHERE gradebook_uid = ?1 AND user_uid = ?2;",
            params![gradebook_uid, user_uid],
        )?;
        Ok(())
    }

    fn role_of(&self, gradebook_uid: &str, user_uid: &str) -> RepoResult<Option<RosterRole>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.role
             FROM roster r
             JOIN gradebooks g
               ON g.uid = r.gradebook_uid
              AND g.is_deleted = 0
             WHERE r.gradebook_uid = ?1
               AND r.user_uid = ?2;",
        )?;

        let mut rows = stmt.query(params![gradebook_uid, user_uid])?;
        if let Some(row) = rows.next()? {
            let stored: String = row.get(0)?;
            let role = parse_roster_role(&stored).map_err(|err| {
                RepoError::InvalidData(format!("invalid roster.role value: {err}"))
            })?;
            return Ok(Some(role));
        }
        Ok(None)
    }
}
