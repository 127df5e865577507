//! CSV to staging table loader
//!
//! Staging tables are all-text. Header names are normalized into safe column
//! names; rows are padded or trimmed to the header width and inserted in
//! batches, each committed on its own.

use std::fs::File;
use std::path::Path;

use clap::ValueEnum;
use datagate::ident::quote_ident;
use datagate::{QualifiedName, Session, require_confirmation};
use eyre::{Context, Result, bail};
use rusqlite::params_from_iter;
use tracing::{debug, info};

/// How an existing staging table must match the CSV header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MatchMode {
    /// Same columns in the same order
    #[default]
    Strict,
    /// Same columns in any order
    Set,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,
    /// Drop and recreate the table from the header (`DROP_CREATE <table>`)
    pub drop_create: bool,
    /// Empty an existing table first (`TRUNCATE <table>`)
    pub truncate: bool,
    pub delimiter: u8,
    pub quote: u8,
    /// Records skipped before the header
    pub skip_rows: usize,
    pub match_mode: MatchMode,
    pub confirm: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: 2000,
            drop_create: false,
            truncate: false,
            delimiter: b',',
            quote: b'"',
            skip_rows: 0,
            match_mode: MatchMode::Strict,
            confirm: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub table: QualifiedName,
    pub rows: u64,
    pub columns: usize,
}

/// Turn a CSV header cell into a safe column name
pub fn normalize_col(name: &str) -> String {
    let s: String = name
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    match s.chars().next() {
        None => "col".to_string(),
        Some(c) if c.is_ascii_digit() => format!("c_{}", s),
        Some(_) => s,
    }
}

/// Suffix repeated names with `_1`, `_2`, ...
pub fn make_unique(cols: Vec<String>) -> Vec<String> {
    let mut seen: Vec<(String, usize)> = Vec::new();
    cols.into_iter()
        .map(|c| match seen.iter_mut().find(|(name, _)| *name == c) {
            Some((_, count)) => {
                *count += 1;
                format!("{}_{}", c, count)
            }
            None => {
                seen.push((c.clone(), 0));
                c
            }
        })
        .collect()
}

fn columns_match(mode: MatchMode, table: &[String], header: &[String]) -> bool {
    let lower = |cols: &[String]| cols.iter().map(|c| c.to_lowercase()).collect::<Vec<_>>();
    let (mut t, mut h) = (lower(table), lower(header));
    if mode == MatchMode::Set {
        t.sort();
        t.dedup();
        h.sort();
        h.dedup();
    }
    t == h
}

fn create_staging_table(session: &mut Session, table: &QualifiedName, header: &[String]) -> Result<()> {
    debug!(%table, columns = header.len(), "create_staging_table: called");
    let columns = header
        .iter()
        .map(|c| format!("    {} TEXT NULL", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(",\n");
    let tx = session.transaction()?;
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", table.sql()))?;
    tx.execute_batch(&format!("CREATE TABLE {} (\n{}\n)", table.sql(), columns))?;
    tx.commit()?;
    Ok(())
}

fn insert_batch(session: &mut Session, sql: &str, batch: &[Vec<String>]) -> Result<()> {
    let tx = session.transaction()?;
    {
        let mut stmt = tx.prepare_cached(sql)?;
        for row in batch {
            stmt.execute(params_from_iter(row.iter()))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Load `csv_path` into the staging table `table`
pub fn load_csv(session: &mut Session, csv_path: &Path, table: &str, options: &LoadOptions) -> Result<LoadReport> {
    debug!(?csv_path, table, ?options, "load_csv: called");
    let name = QualifiedName::parse(table)?;
    if options.truncate && options.drop_create {
        bail!("--truncate and --drop-create cannot be combined");
    }
    if !csv_path.exists() {
        bail!("CSV not found: {}", csv_path.display());
    }

    let file = File::open(csv_path).context(format!("Failed to open {}", csv_path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(options.delimiter)
        .quote(options.quote)
        .from_reader(file);
    let mut records = reader.records();

    for _ in 0..options.skip_rows {
        if records.next().transpose()?.is_none() {
            break;
        }
    }
    let Some(raw_header) = records.next().transpose()? else {
        bail!("CSV appears empty (no header row): {}", csv_path.display());
    };
    let header = make_unique(raw_header.iter().map(normalize_col).collect());

    let mut exists = session.table_exists(&name)?;
    if options.truncate {
        if !exists {
            bail!("--truncate requires table to exist: {}", name);
        }
        require_confirmation("TRUNCATE", &name, options.confirm.as_deref())?;
        session.clear_table(&name)?;
    }
    if options.drop_create {
        require_confirmation("DROP_CREATE", &name, options.confirm.as_deref())?;
        create_staging_table(session, &name, &header)?;
        exists = true;
    }
    if !exists {
        bail!("Table does not exist: {}. Use --drop-create or create it first.", name);
    }
    if !options.drop_create {
        let table_cols = session.table_columns(&name)?;
        if !columns_match(options.match_mode, &table_cols, &header) {
            bail!(
                "Column mismatch ({:?}). Table columns={:?} vs CSV columns={:?}",
                options.match_mode,
                table_cols,
                header
            );
        }
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        name.sql(),
        header.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        (1..=header.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
    );

    let batch_size = options.batch_size.max(1);
    let mut batch: Vec<Vec<String>> = Vec::with_capacity(batch_size);
    let mut total = 0u64;
    for record in records {
        let record = record?;
        let mut row: Vec<String> = record.iter().take(header.len()).map(str::to_string).collect();
        row.resize(header.len(), String::new());
        batch.push(row);

        if batch.len() >= batch_size {
            insert_batch(session, &sql, &batch)?;
            total += batch.len() as u64;
            info!(%name, total, "loaded...");
            batch.clear();
        }
    }
    if !batch.is_empty() {
        insert_batch(session, &sql, &batch)?;
        total += batch.len() as u64;
    }

    info!(%name, rows = total, columns = header.len(), "CSV load complete");
    Ok(LoadReport {
        table: name,
        rows: total,
        columns: header.len(),
    })
}
