//! People repository and CSV import/export

use std::fs::{self, File};
use std::path::Path;

use datagate::Session;
use eyre::{Context, Result, bail};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const PEOPLE_DDL: &str = "CREATE TABLE IF NOT EXISTS people (
    person_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name  TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub person_id: i64,
    pub full_name: String,
    pub created_at: Option<String>,
}

impl Person {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            person_id: row.get(0)?,
            full_name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

/// Counts from a CSV import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub read: u64,
    pub inserted: u64,
    pub skipped: u64,
}

/// CRUD over the `people` table
pub struct PeopleRepo<'a> {
    session: &'a mut Session,
}

impl<'a> PeopleRepo<'a> {
    /// Wrap a session, creating the table if needed
    pub fn new(session: &'a mut Session) -> Result<Self> {
        session.conn().execute_batch(PEOPLE_DDL)?;
        Ok(Self { session })
    }

    pub fn add(&mut self, full_name: &str) -> Result<i64> {
        debug!(full_name, "PeopleRepo::add: called");
        let conn = self.session.conn();
        conn.execute("INSERT INTO people (full_name) VALUES (?1)", [full_name])?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first
    pub fn list(&self, top: usize) -> Result<Vec<Person>> {
        let mut stmt = self.session.conn().prepare(
            "SELECT person_id, full_name, created_at FROM people ORDER BY person_id DESC LIMIT ?1",
        )?;
        let people = stmt
            .query_map([top as i64], Person::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(people)
    }

    /// Substring match on `full_name`, newest first
    pub fn find(&self, like: &str, top: usize) -> Result<Vec<Person>> {
        let mut stmt = self.session.conn().prepare(
            "SELECT person_id, full_name, created_at FROM people
             WHERE full_name LIKE ?1 ORDER BY person_id DESC LIMIT ?2",
        )?;
        let pattern = format!("%{}%", like);
        let people = stmt
            .query_map(params![pattern, top as i64], Person::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(people)
    }

    pub fn get(&self, person_id: i64) -> Result<Option<Person>> {
        let person = self
            .session
            .conn()
            .query_row(
                "SELECT person_id, full_name, created_at FROM people WHERE person_id = ?1",
                [person_id],
                Person::from_row,
            )
            .optional()?;
        Ok(person)
    }

    /// Returns rows updated (0 or 1)
    pub fn update_name(&mut self, person_id: i64, full_name: &str) -> Result<usize> {
        debug!(person_id, full_name, "PeopleRepo::update_name: called");
        let updated = self.session.conn().execute(
            "UPDATE people SET full_name = ?1 WHERE person_id = ?2",
            params![full_name, person_id],
        )?;
        Ok(updated)
    }

    /// Returns rows deleted (0 or 1)
    pub fn delete(&mut self, person_id: i64) -> Result<usize> {
        debug!(person_id, "PeopleRepo::delete: called");
        let deleted = self
            .session
            .conn()
            .execute("DELETE FROM people WHERE person_id = ?1", [person_id])?;
        Ok(deleted)
    }

    /// Insert unless a person with exactly this name exists; returns the new id
    pub fn add_if_missing(&mut self, full_name: &str) -> Result<Option<i64>> {
        let tx = self.session.transaction()?;
        let existing: Option<i64> = tx
            .query_row("SELECT person_id FROM people WHERE full_name = ?1", [full_name], |r| r.get(0))
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }
        tx.execute("INSERT INTO people (full_name) VALUES (?1)", [full_name])?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some(id))
    }

    /// Write `person_id,full_name,created_at` rows, newest first
    pub fn export_csv(&self, out: &Path, top: Option<usize>) -> Result<usize> {
        debug!(?out, ?top, "PeopleRepo::export_csv: called");
        if let Some(parent) = out.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let people = self.list(top.unwrap_or(i64::MAX as usize))?;
        let mut writer = csv::Writer::from_path(out).context(format!("Failed to create {}", out.display()))?;
        for person in &people {
            writer.serialize(person)?;
        }
        writer.flush()?;

        info!(?out, rows = people.len(), "People exported");
        Ok(people.len())
    }

    /// Insert people by `full_name`, skipping blanks and names already present
    pub fn import_csv(&mut self, input: &Path) -> Result<ImportStats> {
        debug!(?input, "PeopleRepo::import_csv: called");
        if !input.exists() {
            bail!("Input file not found: {}", input.display());
        }

        let mut reader = csv::Reader::from_reader(File::open(input)?);
        let Some(name_col) = reader.headers()?.iter().position(|h| h.trim() == "full_name") else {
            bail!("CSV must include a 'full_name' column");
        };

        let mut stats = ImportStats::default();
        for record in reader.records() {
            let record = record?;
            stats.read += 1;

            let name = record.get(name_col).unwrap_or("").trim();
            if name.is_empty() {
                stats.skipped += 1;
                continue;
            }
            match self.add_if_missing(name)? {
                Some(_) => stats.inserted += 1,
                None => stats.skipped += 1,
            }
        }

        info!(read = stats.read, inserted = stats.inserted, skipped = stats.skipped, "People imported");
        Ok(stats)
    }
}
