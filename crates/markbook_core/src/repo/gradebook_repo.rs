//! Gradebook directory repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide gradebook lifecycle persistence (create, soft delete,
//!   existence checks).
//! - Cascade gradebook soft-deletion onto the gradebook's assignments.
//!
//! # Invariants
//! - A gradebook uid is never reused: creation fails while a live or
//!   tombstoned row holds the uid.
//! - Deleting a gradebook tombstones its assignments in the same
//!   transaction; score rows and the audit journal are left untouched.

use crate::model::gradebook::Gradebook;
use crate::repo::{ensure_connection_ready, RepoError, RepoResult, TableRequirement};
use crate::repo::grading_repo::bool_to_int;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

const DIRECTORY_TABLES: &[TableRequirement] = &[
    TableRequirement {
        table: "gradebooks",
        columns: &["uid", "name", "is_deleted"],
    },
    TableRequirement {
        table: "assignments",
        columns: &["uuid", "gradebook_uid", "is_deleted"],
    },
];

/// Repository interface for gradebook directory operations.
pub trait GradebookRepository {
    /// Creates one gradebook; the uid must be unused, including by
    /// tombstoned rows.
    fn create_gradebook(&self, gradebook: &Gradebook) -> RepoResult<()>;
    /// Soft-deletes one gradebook and tombstones its assignments.
    fn soft_delete_gradebook(&self, gradebook_uid: &str) -> RepoResult<()>;
    /// Returns whether the gradebook exists and is not deleted.
    fn gradebook_defined(&self, gradebook_uid: &str) -> RepoResult<bool>;
    /// Gets one gradebook by uid with optional tombstone visibility.
    fn get_gradebook(
        &self,
        gradebook_uid: &str,
        include_deleted: bool,
    ) -> RepoResult<Option<Gradebook>>;
}

/// SQLite-backed gradebook directory repository.
pub struct SqliteGradebookRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGradebookRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, DIRECTORY_TABLES)?;
        Ok(Self { conn })
    }
}

impl GradebookRepository for SqliteGradebookRepository<'_> {
    fn create_gradebook(&self, gradebook: &Gradebook) -> RepoResult<()> {
        gradebook.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let mut stmt = tx.prepare("SELECT 1 FROM gradebooks WHERE uid = ?1;")?;
        let taken = stmt.exists([gradebook.uid.as_str()])?;
        drop(stmt);
        if taken {
            return Err(RepoError::GradebookAlreadyDefined {
                gradebook_uid: gradebook.uid.clone(),
            });
        }

        tx.execute(
            "INSERT INTO gradebooks (uid, name, is_deleted) VALUES (?1, ?2, ?3);",
            params![
                gradebook.uid.as_str(),
                gradebook.name.as_str(),
                bool_to_int(gradebook.is_deleted),
            ],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn soft_delete_gradebook(&self, gradebook_uid: &str) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE gradebooks
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uid = ?1
               AND is_deleted = 0;",
            [gradebook_uid],
        )?;
        if changed == 0 {
            return Err(RepoError::GradebookNotFound {
                gradebook_uid: gradebook_uid.to_string(),
            });
        }

        tx.execute(
            "UPDATE assignments
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE gradebook_uid = ?1
               AND is_deleted = 0;",
            [gradebook_uid],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn gradebook_defined(&self, gradebook_uid: &str) -> RepoResult<bool> {
        crate::repo::grading_repo::gradebook_defined(self.conn, gradebook_uid)
    }

    fn get_gradebook(
        &self,
        gradebook_uid: &str,
        include_deleted: bool,
    ) -> RepoResult<Option<Gradebook>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, name, is_deleted
             FROM gradebooks
             WHERE uid = ?1
               AND (?2 = 1 OR is_deleted = 0);",
        )?;

        let mut rows = stmt.query(params![gradebook_uid, bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            let is_deleted = match row.get::<_, i64>("is_deleted")? {
                0 => false,
                1 => true,
                other => {
                    return Err(RepoError::InvalidData(format!(
                        "invalid is_deleted value `{other}` in gradebooks.is_deleted"
                    )));
                }
            };
            return Ok(Some(Gradebook {
                uid: row.get("uid")?,
                name: row.get("name")?,
                is_deleted,
            }));
        }
        Ok(None)
    }
}
