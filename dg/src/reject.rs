//! Reject recorder
//!
//! Rows that fail validation are written to the shared `dataset_rejects`
//! table with their raw payload, ordered reasons and a SHA-256 digest of the
//! raw row. Writes are buffered; a full buffer is flushed in its own
//! transaction, so a crash loses at most one unflushed batch.

use rusqlite::{Row, params};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::Result;
use crate::ident::{QualifiedName, quote_ident};
use crate::row::RawRow;
use crate::session::Session;
use crate::validate::{Reason, join_reasons};
use crate::{DEFAULT_BATCH_SIZE, REJECTS_TABLE};

/// Length of a content digest in bytes
pub const DIGEST_LEN: usize = 32;

/// SHA-256 over the raw row as sorted-key compact JSON
///
/// Column order in the staging table does not affect the digest.
pub fn content_digest(raw: &RawRow) -> Result<[u8; DIGEST_LEN]> {
    let canonical = serde_json::to_string(&raw.canonical())?;
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&Sha256::digest(canonical.as_bytes()));
    Ok(digest)
}

fn rejects_table() -> QualifiedName {
    QualifiedName {
        schema: crate::ident::DEFAULT_SCHEMA.to_string(),
        table: REJECTS_TABLE.to_string(),
    }
}

/// Create the shared reject table and its lookup index if missing
pub fn ensure_rejects_table(session: &Session) -> Result<()> {
    debug!("ensure_rejects_table: called");
    let table = rejects_table();
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            reject_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_name   TEXT NOT NULL,
            source_file    TEXT NULL,
            row_num        INTEGER NOT NULL CHECK (row_num > 0),
            row_hash       BLOB NOT NULL CHECK (length(row_hash) = {len}),
            reject_reasons TEXT NOT NULL,
            raw_json       TEXT NOT NULL,
            rejected_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );
        CREATE INDEX IF NOT EXISTS {index} ON {bare} (dataset_name, reject_id);",
        table = table.sql(),
        len = DIGEST_LEN,
        index = table.sibling_sql("IX_dataset_rejects_dataset"),
        bare = quote_ident(&table.table),
    );
    session.conn().execute_batch(&sql)?;
    Ok(())
}

/// One pending reject, ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectRecord {
    pub dataset_name: String,
    pub source_file: Option<String>,
    pub row_num: u64,
    pub row_hash: [u8; DIGEST_LEN],
    pub reject_reasons: String,
    pub raw_json: String,
}

impl RejectRecord {
    pub fn new(
        raw: &RawRow,
        dataset_name: &str,
        source_file: Option<&str>,
        row_num: u64,
        reasons: &[Reason],
    ) -> Result<Self> {
        Ok(Self {
            dataset_name: dataset_name.to_string(),
            source_file: source_file.map(str::to_string),
            row_num,
            row_hash: content_digest(raw)?,
            reject_reasons: join_reasons(reasons),
            raw_json: serde_json::to_string(raw)?,
        })
    }
}

/// Buffered writer of reject records for one dataset run
#[derive(Debug)]
pub struct RejectRecorder {
    dataset_name: String,
    source_file: Option<String>,
    batch_size: usize,
    pending: Vec<RejectRecord>,
    written: u64,
}

impl RejectRecorder {
    pub fn new(dataset_name: impl Into<String>, source_file: Option<String>, batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
        Self {
            dataset_name: dataset_name.into(),
            source_file,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            written: 0,
        }
    }

    /// Buffer one rejected row; flushes when the buffer is full
    pub fn record(&mut self, session: &mut Session, raw: &RawRow, row_num: u64, reasons: &[Reason]) -> Result<()> {
        let record = RejectRecord::new(raw, &self.dataset_name, self.source_file.as_deref(), row_num, reasons)?;
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            self.flush(session)?;
        }
        Ok(())
    }

    /// Write and commit everything buffered
    pub fn flush(&mut self, session: &mut Session) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        debug!(count = self.pending.len(), "RejectRecorder::flush: called");

        let sql = format!(
            "INSERT INTO {} (dataset_name, source_file, row_num, row_hash, reject_reasons, raw_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rejects_table().sql()
        );
        let tx = session.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for r in &self.pending {
                stmt.execute(params![
                    r.dataset_name,
                    r.source_file,
                    r.row_num as i64,
                    &r.row_hash[..],
                    r.reject_reasons,
                    r.raw_json,
                ])?;
            }
        }
        tx.commit()?;

        self.written += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }

    /// Flush the remainder and return the total written
    pub fn finish(mut self, session: &mut Session) -> Result<u64> {
        self.flush(session)?;
        Ok(self.written)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Remove every reject of a dataset; returns the number removed
pub fn clear_rejects(session: &mut Session, dataset_name: &str) -> Result<usize> {
    debug!(dataset_name, "clear_rejects: called");
    ensure_rejects_table(session)?;
    let sql = format!("DELETE FROM {} WHERE dataset_name = ?1", rejects_table().sql());
    let tx = session.transaction()?;
    let removed = tx.execute(&sql, [dataset_name])?;
    tx.commit()?;
    info!(dataset_name, removed, "Rejects cleared");
    Ok(removed)
}

pub fn count_rejects(session: &Session, dataset_name: &str) -> Result<i64> {
    ensure_rejects_table(session)?;
    let sql = format!("SELECT COUNT(*) FROM {} WHERE dataset_name = ?1", rejects_table().sql());
    Ok(session.conn().query_row(&sql, [dataset_name], |r| r.get(0))?)
}

fn hex_digest<S: Serializer>(digest: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(digest))
}

/// A reject read back from the store, payload decoded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReject {
    pub reject_id: i64,
    pub dataset_name: String,
    pub source_file: Option<String>,
    pub row_num: i64,
    #[serde(serialize_with = "hex_digest")]
    pub row_hash: Vec<u8>,
    pub reject_reasons: String,
    pub raw: serde_json::Value,
    pub rejected_at: String,
}

impl StoredReject {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<(Self, String)> {
        let raw_json: String = row.get(6)?;
        Ok((
            Self {
                reject_id: row.get(0)?,
                dataset_name: row.get(1)?,
                source_file: row.get(2)?,
                row_num: row.get(3)?,
                row_hash: row.get(4)?,
                reject_reasons: row.get(5)?,
                raw: serde_json::Value::Null,
                rejected_at: row.get(7)?,
            },
            raw_json,
        ))
    }

    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.reject_reasons.split('|').filter(|r| !r.is_empty())
    }
}

/// Most recent rejects of a dataset, newest first; `top = None` means all
pub fn list_rejects(session: &Session, dataset_name: &str, top: Option<usize>) -> Result<Vec<StoredReject>> {
    debug!(dataset_name, ?top, "list_rejects: called");
    ensure_rejects_table(session)?;
    let sql = format!(
        "SELECT reject_id, dataset_name, source_file, row_num, row_hash, reject_reasons, raw_json, rejected_at
         FROM {} WHERE dataset_name = ?1 ORDER BY reject_id DESC LIMIT ?2",
        rejects_table().sql()
    );
    // LIMIT -1 is unbounded in SQLite
    let limit = top.map(|n| n as i64).unwrap_or(-1);

    let mut stmt = session.conn().prepare(&sql)?;
    let rows = stmt
        .query_map(params![dataset_name, limit], StoredReject::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(mut reject, raw_json)| {
            reject.raw = if raw_json.is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                serde_json::from_str(&raw_json)?
            };
            Ok(reject)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawRow {
        RawRow::new()
            .with("person_id", Some("abc"))
            .with("full_name", Some("John"))
            .with("created_at", Some(""))
    }

    #[test]
    fn test_digest_is_stable_and_order_independent() {
        let a = content_digest(&raw()).unwrap();
        let b = content_digest(&raw()).unwrap();
        let reordered = RawRow::new()
            .with("created_at", Some(""))
            .with("full_name", Some("John"))
            .with("person_id", Some("abc"));

        assert_eq!(a, b);
        assert_eq!(a, content_digest(&reordered).unwrap());
        assert_ne!(a, content_digest(&RawRow::new().with("person_id", Some("abd"))).unwrap());
    }

    #[test]
    fn test_record_flushes_full_batches() {
        let mut session = Session::open_in_memory().unwrap();
        ensure_rejects_table(&session).unwrap();

        let mut recorder = RejectRecorder::new("people", Some("people.csv".to_string()), 2);
        let reasons = vec![Reason::Required("person_id".to_string())];
        for row_num in 1..=3 {
            recorder.record(&mut session, &raw(), row_num, &reasons).unwrap();
        }
        assert_eq!(recorder.written(), 2);
        assert_eq!(recorder.pending(), 1);
        assert_eq!(count_rejects(&session, "people").unwrap(), 2);

        assert_eq!(recorder.finish(&mut session).unwrap(), 3);
        assert_eq!(count_rejects(&session, "people").unwrap(), 3);
    }

    #[test]
    fn test_list_rejects_newest_first_with_payload() {
        let mut session = Session::open_in_memory().unwrap();
        ensure_rejects_table(&session).unwrap();

        let mut recorder = RejectRecorder::new("people", None, 10);
        recorder
            .record(&mut session, &raw(), 1, &[Reason::Required("person_id".into())])
            .unwrap();
        recorder
            .record(
                &mut session,
                &raw(),
                2,
                &[Reason::Required("person_id".into()), Reason::Cross("x".into())],
            )
            .unwrap();
        recorder.finish(&mut session).unwrap();

        let rejects = list_rejects(&session, "people", Some(1)).unwrap();
        assert_eq!(rejects.len(), 1);
        let newest = &rejects[0];
        assert_eq!(newest.row_num, 2);
        assert_eq!(newest.reasons().collect::<Vec<_>>(), vec!["required:person_id", "cross:x"]);
        assert_eq!(newest.raw["person_id"], "abc");
        assert_eq!(newest.row_hash.len(), DIGEST_LEN);
        assert_eq!(newest.source_file, None);

        let json = serde_json::to_value(newest).unwrap();
        assert_eq!(json["row_hash"].as_str().unwrap().len(), DIGEST_LEN * 2);

        assert_eq!(list_rejects(&session, "people", None).unwrap().len(), 2);
        assert!(list_rejects(&session, "other", None).unwrap().is_empty());
    }

    #[test]
    fn test_clear_rejects_is_per_dataset() {
        let mut session = Session::open_in_memory().unwrap();
        ensure_rejects_table(&session).unwrap();

        for dataset in ["people", "orders"] {
            let mut recorder = RejectRecorder::new(dataset, None, 10);
            recorder
                .record(&mut session, &raw(), 1, &[Reason::Required("a".into())])
                .unwrap();
            recorder.finish(&mut session).unwrap();
        }

        assert_eq!(clear_rejects(&mut session, "people").unwrap(), 1);
        assert_eq!(count_rejects(&session, "people").unwrap(), 0);
        assert_eq!(count_rejects(&session, "orders").unwrap(), 1);
    }
}
