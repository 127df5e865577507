//! Store session
//!
//! Every engine operation takes a `&mut Session` explicitly. Transactions are
//! scoped: a [`rusqlite::Transaction`] that is dropped without `commit()`
//! rolls back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::error::Result;
use crate::ident::{QualifiedName, quote_ident, require_confirmation};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle over one SQLite connection
pub struct Session {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Session {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "Session::open: called");
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        debug!("Session::open_in_memory: called");
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a transaction; dropping it without commit rolls back
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Round-trip a trivial query, returning the server version
    pub fn ping(&self) -> Result<String> {
        debug!("Session::ping: called");
        let version: String = self.conn.query_row("SELECT sqlite_version()", [], |r| r.get(0))?;
        Ok(version)
    }

    pub fn table_exists(&self, table: &QualifiedName) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            quote_ident(&table.schema)
        );
        let found: Option<i64> = self.conn.query_row(&sql, [&table.table], |r| r.get(0)).optional()?;
        Ok(found.is_some())
    }

    /// Column names in declaration order; empty when the table is missing
    pub fn table_columns(&self, table: &QualifiedName) -> Result<Vec<String>> {
        let sql = format!(
            "PRAGMA {}.table_info({})",
            quote_ident(&table.schema),
            quote_ident(&table.table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |r| r.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    pub fn count_rows(&self, table: &QualifiedName) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.sql());
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    /// Delete every row and commit; returns the number removed
    pub fn clear_table(&mut self, table: &QualifiedName) -> Result<usize> {
        debug!(%table, "Session::clear_table: called");
        let tx = self.conn.transaction()?;
        let removed = tx.execute(&format!("DELETE FROM {}", table.sql()), [])?;
        tx.commit()?;
        info!(%table, removed, "Table cleared");
        Ok(removed)
    }

    /// [`Session::clear_table`] guarded by the phrase `TRUNCATE <schema.table>`
    pub fn truncate_table(&mut self, table: &str, confirm: Option<&str>) -> Result<usize> {
        debug!(table, "Session::truncate_table: called");
        let name = QualifiedName::parse(table)?;
        require_confirmation("TRUNCATE", &name, confirm)?;
        self.clear_table(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;

    fn session_with_table() -> Session {
        let session = Session::open_in_memory().unwrap();
        session
            .conn()
            .execute_batch(
                "CREATE TABLE stage_people (person_id TEXT, full_name TEXT);
                 INSERT INTO stage_people VALUES ('1', 'a'), ('2', 'b');",
            )
            .unwrap();
        session
    }

    #[test]
    fn test_ping() {
        let session = Session::open_in_memory().unwrap();
        assert!(!session.ping().unwrap().is_empty());
    }

    #[test]
    fn test_table_introspection() {
        let session = session_with_table();
        let name = QualifiedName::parse("stage_people").unwrap();

        assert!(session.table_exists(&name).unwrap());
        assert!(!session.table_exists(&QualifiedName::parse("nope").unwrap()).unwrap());
        assert_eq!(session.table_columns(&name).unwrap(), vec!["person_id", "full_name"]);
        assert_eq!(session.count_rows(&name).unwrap(), 2);
    }

    #[test]
    fn test_truncate_requires_phrase() {
        let mut session = session_with_table();
        let name = QualifiedName::parse("stage_people").unwrap();

        let err = session.truncate_table("stage_people", Some("TRUNCATE stage_people")).unwrap_err();
        assert!(matches!(err, GateError::ConfirmationMismatch { .. }));
        assert_eq!(session.count_rows(&name).unwrap(), 2);

        let removed = session
            .truncate_table("stage_people", Some("TRUNCATE main.stage_people"))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(session.count_rows(&name).unwrap(), 0);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut session = session_with_table();
        {
            let tx = session.transaction().unwrap();
            tx.execute("DELETE FROM stage_people", []).unwrap();
        }
        let name = QualifiedName::parse("stage_people").unwrap();
        assert_eq!(session.count_rows(&name).unwrap(), 2);
    }
}
