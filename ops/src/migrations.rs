//! SQL migration runner
//!
//! Scripts named `NNN_description.sql` are applied in file-name order. Each
//! script runs in its own transaction together with its ledger row, so a
//! failing script leaves no trace and stops the run.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use datagate::Session;
use eyre::{Context, Result, eyre};
use rusqlite::params;
use tracing::{debug, info};

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER NOT NULL,
    name       TEXT NOT NULL PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
)";

/// One script on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub path: PathBuf,
}

/// Leading number of `NNN_name.sql`
pub fn version_from_filename(name: &str) -> Result<i64> {
    let (head, _) = name
        .split_once('_')
        .ok_or_else(|| eyre!("Migration file name must look like NNN_name.sql: {}", name))?;
    head.parse::<i64>()
        .context(format!("Migration file name must start with a number: {}", name))
}

/// Scripts in `dir`, sorted by file name
pub fn list_migrations(dir: &Path) -> Result<Vec<Migration>> {
    debug!(?dir, "list_migrations: called");
    let pattern = dir.join("*.sql");
    let pattern = pattern.to_string_lossy();

    let mut migrations = Vec::new();
    for entry in glob::glob(&pattern).context(format!("Invalid glob pattern: {}", pattern))? {
        let path = entry?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        migrations.push(Migration {
            version: version_from_filename(&name)?,
            name,
            path,
        });
    }
    migrations.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(migrations)
}

pub fn ensure_ledger(session: &Session) -> Result<()> {
    session.conn().execute_batch(LEDGER_DDL)?;
    Ok(())
}

/// Names already recorded in the ledger
pub fn applied_migrations(session: &Session) -> Result<BTreeSet<String>> {
    ensure_ledger(session)?;
    let mut stmt = session.conn().prepare("SELECT name FROM schema_migrations")?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(names)
}

/// Apply every pending script in `dir`; returns the names applied
pub fn apply_migrations(session: &mut Session, dir: &Path) -> Result<Vec<String>> {
    debug!(?dir, "apply_migrations: called");
    let done = applied_migrations(session)?;

    let mut applied = Vec::new();
    for migration in list_migrations(dir)? {
        if done.contains(&migration.name) {
            debug!(name = %migration.name, "apply_migrations: already applied");
            continue;
        }

        let sql = fs::read_to_string(&migration.path)
            .context(format!("Failed to read {}", migration.path.display()))?;
        let tx = session.transaction()?;
        tx.execute_batch(&sql)
            .context(format!("Migration {} failed", migration.name))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;

        info!(name = %migration.name, "Migration applied");
        applied.push(migration.name);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version_from_filename() {
        assert_eq!(version_from_filename("002_people.sql").unwrap(), 2);
        assert!(version_from_filename("people.sql").is_err());
        assert!(version_from_filename("abc_people.sql").is_err());
    }

    #[test]
    fn test_apply_in_order_and_skip_applied() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("002_add_col.sql"), "ALTER TABLE t ADD COLUMN b TEXT;").unwrap();
        fs::write(dir.path().join("001_create_t.sql"), "CREATE TABLE t (a TEXT);").unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let mut session = Session::open_in_memory().unwrap();
        let applied = apply_migrations(&mut session, dir.path()).unwrap();
        assert_eq!(applied, vec!["001_create_t.sql", "002_add_col.sql"]);

        let again = apply_migrations(&mut session, dir.path()).unwrap();
        assert!(again.is_empty());
        assert_eq!(applied_migrations(&session).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_script_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_ok.sql"), "CREATE TABLE t (a TEXT);").unwrap();
        fs::write(
            dir.path().join("002_bad.sql"),
            "CREATE TABLE u (a TEXT); INSERT INTO missing VALUES (1);",
        )
        .unwrap();

        let mut session = Session::open_in_memory().unwrap();
        assert!(apply_migrations(&mut session, dir.path()).is_err());

        let done = applied_migrations(&session).unwrap();
        assert!(done.contains("001_ok.sql"));
        assert!(!done.contains("002_bad.sql"));
        let u = datagate::QualifiedName::parse("u").unwrap();
        assert!(!session.table_exists(&u).unwrap());
    }

    #[test]
    fn test_missing_dir_has_no_migrations() {
        assert!(list_migrations(Path::new("/nonexistent/migrations")).unwrap().is_empty());
    }
}
