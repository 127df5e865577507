//! Paged staging scan
//!
//! Staging rows are read in rowid order, one page at a time, so a transform
//! pass can commit destination batches on the same connection between pages
//! without holding an open cursor.

use rusqlite::types::ValueRef;
use tracing::debug;

use crate::error::{GateError, Result};
use crate::ident::{QualifiedName, quote_ident};
use crate::row::RawRow;
use crate::session::Session;

/// Staging values are text, but anything SQLite hands back is rendered as text
fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

/// Cursor over a staging table, keyed by rowid
#[derive(Debug)]
pub struct StagePager {
    table: QualifiedName,
    columns: Vec<String>,
    sql: String,
    page_size: usize,
    last_rowid: i64,
    done: bool,
}

impl StagePager {
    /// Validate the staging table and prepare the page query
    ///
    /// Fails when the table is missing or lacks one of `columns`.
    pub fn new(session: &Session, table: &str, columns: &[&str], page_size: usize) -> Result<Self> {
        debug!(table, ?columns, page_size, "StagePager::new: called");
        let table = QualifiedName::parse(table)?;
        if !session.table_exists(&table)? {
            return Err(GateError::InvalidDefinition(format!("staging table {} does not exist", table)));
        }

        let present: Vec<String> = session
            .table_columns(&table)?
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();
        let mut wanted: Vec<String> = Vec::new();
        for column in columns {
            if !present.contains(&column.to_lowercase()) {
                return Err(GateError::InvalidDefinition(format!(
                    "staging table {} has no column '{}'",
                    table, column
                )));
            }
            if !wanted.iter().any(|w| w == column) {
                wanted.push(column.to_string());
            }
        }

        let select_list = wanted.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT rowid, {} FROM {} WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
            select_list,
            table.sql()
        );

        Ok(Self {
            table,
            columns: wanted,
            sql,
            page_size: page_size.max(1),
            last_rowid: i64::MIN,
            done: false,
        })
    }

    pub fn table(&self) -> &QualifiedName {
        &self.table
    }

    /// Next page of rows; empty once the table is exhausted
    pub fn next_page(&mut self, session: &Session) -> Result<Vec<RawRow>> {
        if self.done {
            return Ok(Vec::new());
        }

        let mut stmt = session.conn().prepare_cached(&self.sql)?;
        let mut rows = stmt.query(rusqlite::params![self.last_rowid, self.page_size as i64])?;
        let mut page = Vec::with_capacity(self.page_size);
        while let Some(row) = rows.next()? {
            self.last_rowid = row.get(0)?;
            let mut raw = RawRow::new();
            for (i, column) in self.columns.iter().enumerate() {
                raw.push(column.clone(), cell_text(row.get_ref(i + 1)?));
            }
            page.push(raw);
        }

        if page.len() < self.page_size {
            self.done = true;
        }
        debug!(table = %self.table, rows = page.len(), "StagePager::next_page: fetched");
        Ok(page)
    }
}
