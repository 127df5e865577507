//! Promoter
//!
//! Writes validated rows into the destination table in batches, each batch in
//! its own transaction. Two policies:
//!
//! - [`PromotionPolicy::FullReload`] clears the destination (committed) before
//!   the first insert.
//! - [`PromotionPolicy::Incremental`] inserts a row only when no destination
//!   row has the same primary-key value. Existing rows are never updated.

use std::fmt;
use std::str::FromStr;

use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::DEFAULT_BATCH_SIZE;
use crate::error::{GateError, Result};
use crate::ident::{QualifiedName, quote_ident};
use crate::row::TypedRow;
use crate::session::Session;
use crate::spec::DatasetSpec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromotionPolicy {
    FullReload,
    #[default]
    Incremental,
}

impl fmt::Display for PromotionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullReload => write!(f, "full-reload"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

impl FromStr for PromotionPolicy {
    type Err = GateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full-reload" | "full_reload" | "full" => Ok(Self::FullReload),
            "incremental" => Ok(Self::Incremental),
            other => Err(GateError::InvalidDefinition(format!("unknown promotion policy: {}", other))),
        }
    }
}

/// Rows written versus rows left alone because their key already existed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromoteStats {
    pub inserted: u64,
    pub skipped: u64,
}

/// Insert statement for `spec` under `policy`
///
/// Parameters are the destination fields in order; the incremental form
/// reuses `?1` (the primary key) in its existence check. `IS` keeps a null
/// key from being inserted again on every pass.
pub fn insert_sql(spec: &DatasetSpec, policy: PromotionPolicy) -> Result<String> {
    let table = QualifiedName::parse(&spec.final_table)?;
    let pk = spec.primary_key().ok_or_else(|| GateError::NoFields(spec.name.clone()))?;

    let columns = spec
        .fields
        .iter()
        .map(|f| quote_ident(&f.field))
        .collect::<Vec<_>>()
        .join(", ");
    let params = (1..=spec.fields.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(match policy {
        PromotionPolicy::FullReload => format!("INSERT INTO {} ({}) VALUES ({})", table.sql(), columns, params),
        PromotionPolicy::Incremental => format!(
            "INSERT INTO {t} ({columns}) SELECT {params} WHERE NOT EXISTS (SELECT 1 FROM {t} WHERE {pk} IS ?1)",
            t = table.sql(),
            columns = columns,
            params = params,
            pk = quote_ident(&pk.field),
        ),
    })
}

/// Batched writer for one promotion pass
#[derive(Debug)]
pub struct Promoter {
    table: QualifiedName,
    fields: Vec<String>,
    policy: PromotionPolicy,
    batch_size: usize,
    sql: String,
    pending: Vec<TypedRow>,
    stats: PromoteStats,
}

impl Promoter {
    /// Prepare a pass; a full reload clears the destination here
    pub fn begin(
        session: &mut Session,
        spec: &DatasetSpec,
        policy: PromotionPolicy,
        batch_size: usize,
    ) -> Result<Self> {
        debug!(dataset = %spec.name, %policy, batch_size, "Promoter::begin: called");
        let sql = insert_sql(spec, policy)?;
        let table = QualifiedName::parse(&spec.final_table)?;
        if !session.table_exists(&table)? {
            return Err(GateError::InvalidDefinition(format!(
                "destination table {} does not exist",
                table
            )));
        }

        if policy == PromotionPolicy::FullReload {
            session.clear_table(&table)?;
        }

        let batch_size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
        Ok(Self {
            table,
            fields: spec.fields.iter().map(|f| f.field.clone()).collect(),
            policy,
            batch_size,
            sql,
            pending: Vec::with_capacity(batch_size),
            stats: PromoteStats::default(),
        })
    }

    pub fn policy(&self) -> PromotionPolicy {
        self.policy
    }

    pub fn push(&mut self, session: &mut Session, row: TypedRow) -> Result<()> {
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            self.flush(session)?;
        }
        Ok(())
    }

    /// Write and commit the buffered batch
    pub fn flush(&mut self, session: &mut Session) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        debug!(table = %self.table, count = self.pending.len(), "Promoter::flush: called");

        let mut batch = PromoteStats::default();
        let tx = session.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&self.sql)?;
            for row in &self.pending {
                let values = self.fields.iter().map(|f| row.get(f));
                if stmt.execute(params_from_iter(values))? == 0 {
                    batch.skipped += 1;
                } else {
                    batch.inserted += 1;
                }
            }
        }
        tx.commit()?;

        self.stats.inserted += batch.inserted;
        self.stats.skipped += batch.skipped;
        self.pending.clear();
        Ok(())
    }

    pub fn finish(mut self, session: &mut Session) -> Result<PromoteStats> {
        self.flush(session)?;
        info!(
            table = %self.table,
            policy = %self.policy,
            inserted = self.stats.inserted,
            skipped = self.stats.skipped,
            "Promotion complete"
        );
        Ok(self.stats)
    }
}

/// Promote a finished set of good rows in one call
pub fn promote<I>(
    session: &mut Session,
    rows: I,
    spec: &DatasetSpec,
    policy: PromotionPolicy,
    batch_size: usize,
) -> Result<PromoteStats>
where
    I: IntoIterator<Item = TypedRow>,
{
    let mut promoter = Promoter::begin(session, spec, policy, batch_size)?;
    for row in rows {
        promoter.push(session, row)?;
    }
    promoter.finish(session)
}
