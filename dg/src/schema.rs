//! Schema synthesizer and index manager
//!
//! Derives the destination table from a [`DatasetSpec`] and keeps its
//! indexes in place. Existing tables are never reconciled with the spec.

use std::fmt;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{GateError, Result};
use crate::ident::{QualifiedName, quote_ident, require_confirmation};
use crate::session::Session;
use crate::spec::{CastKind, DatasetSpec, IndexSpec};

/// Phrase prefix authorizing a drop and recreate
pub const DROP_CREATE: &str = "DROP_CREATE";

/// Destination column type for a cast kind
pub fn sql_type(kind: CastKind) -> &'static str {
    match kind {
        CastKind::Text => "VARCHAR(4000)",
        CastKind::Integer => "INTEGER",
        CastKind::Float => "FLOAT",
        CastKind::Money => "DECIMAL(19,4)",
        CastKind::Date => "DATE",
    }
}

/// What `ensure_table` did to the table itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    Created,
    Recreated,
    Existing,
}

/// What `ensure_index` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    Skipped,
}

impl fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Recreated => write!(f, "recreated"),
            Self::Existing => write!(f, "existing"),
        }
    }
}

impl fmt::Display for IndexOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of ensuring a destination table and its indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureReport {
    pub table: QualifiedName,
    pub outcome: TableOutcome,
    pub indexes: Vec<(String, IndexOutcome)>,
}

/// `CREATE TABLE` statement for the destination, one nullable column per field
pub fn create_table_sql(spec: &DatasetSpec) -> Result<String> {
    let table = QualifiedName::parse(&spec.final_table)?;
    if spec.fields.is_empty() {
        return Err(GateError::NoFields(spec.name.clone()));
    }
    let columns = spec
        .fields
        .iter()
        .map(|f| format!("    {} {} NULL", quote_ident(&f.field), sql_type(f.cast)))
        .collect::<Vec<_>>()
        .join(",\n");
    Ok(format!("CREATE TABLE {} (\n{}\n)", table.sql(), columns))
}

/// `CREATE INDEX` statement for `index` on `table`
///
/// SQLite has no INCLUDE clause: included columns extend the key of a
/// non-unique index and are dropped from a unique one.
pub fn create_index_sql(table: &QualifiedName, index: &IndexSpec) -> Result<String> {
    if index.name.trim().is_empty() {
        return Err(GateError::EmptyIndexName);
    }
    if index.columns.is_empty() {
        return Err(GateError::InvalidDefinition(format!("index '{}' has no columns", index.name)));
    }

    let mut key: Vec<&str> = index.columns.iter().map(String::as_str).collect();
    if !index.include.is_empty() {
        if index.unique {
            warn!(index = %index.name, include = ?index.include, "Included columns ignored on unique index");
        } else {
            for column in &index.include {
                if !key.contains(&column.as_str()) {
                    key.push(column);
                }
            }
        }
    }

    let mut sql = format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        table.sibling_sql(&index.name),
        quote_ident(&table.table),
        key.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
    );
    if let Some(filter) = index.filter.as_deref().map(str::trim)
        && !filter.is_empty()
    {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
    Ok(sql)
}

fn index_exists(conn: &Connection, table: &QualifiedName, name: &str) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {}.sqlite_master WHERE type = 'index' AND name = ?1 AND tbl_name = ?2",
        quote_ident(&table.schema)
    );
    let found: Option<i64> = conn
        .query_row(&sql, [name, table.table.as_str()], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn ensure_index_on(conn: &Connection, table: &QualifiedName, index: &IndexSpec) -> Result<IndexOutcome> {
    let sql = create_index_sql(table, index)?;
    if index.if_not_exists && index_exists(conn, table, &index.name)? {
        debug!(index = %index.name, "ensure_index: already present");
        return Ok(IndexOutcome::Skipped);
    }
    conn.execute_batch(&sql)?;
    info!(%table, index = %index.name, "Index created");
    Ok(IndexOutcome::Created)
}

/// Create `index` on `table` unless it is already there
pub fn ensure_index(session: &mut Session, table: &str, index: &IndexSpec) -> Result<IndexOutcome> {
    debug!(table, index = %index.name, "ensure_index: called");
    let table = QualifiedName::parse(table)?;
    ensure_index_on(session.conn(), &table, index)
}

/// Make sure the destination of `spec` exists, then ensure its indexes
///
/// With `drop_and_recreate`, `confirm` must equal `DROP_CREATE <schema.table>`;
/// the phrase and the spec are checked before the store is touched. Table and
/// indexes are created in one transaction.
pub fn ensure_table(
    session: &mut Session,
    spec: &DatasetSpec,
    drop_and_recreate: bool,
    confirm: Option<&str>,
) -> Result<EnsureReport> {
    debug!(dataset = %spec.name, drop_and_recreate, "ensure_table: called");
    spec.check()?;
    let table = QualifiedName::parse(&spec.final_table)?;
    if drop_and_recreate {
        require_confirmation(DROP_CREATE, &table, confirm)?;
    }
    let create_sql = create_table_sql(spec)?;
    for index in &spec.indexes {
        create_index_sql(&table, index)?;
    }

    let existed = session.table_exists(&table)?;
    let tx = session.transaction()?;
    let outcome = match (existed, drop_and_recreate) {
        (true, true) => {
            tx.execute_batch(&format!("DROP TABLE {}", table.sql()))?;
            tx.execute_batch(&create_sql)?;
            TableOutcome::Recreated
        }
        (false, _) => {
            tx.execute_batch(&create_sql)?;
            TableOutcome::Created
        }
        (true, false) => TableOutcome::Existing,
    };

    let mut indexes = Vec::with_capacity(spec.indexes.len());
    for index in &spec.indexes {
        indexes.push((index.name.clone(), ensure_index_on(&tx, &table, index)?));
    }
    tx.commit()?;

    info!(%table, %outcome, indexes = indexes.len(), "Destination ensured");
    Ok(EnsureReport {
        table,
        outcome,
        indexes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FieldRule;

    fn spec() -> DatasetSpec {
        DatasetSpec::new("people", "main.stage_people", "main.people_typed")
            .field(FieldRule::new("person_id", "person_id", CastKind::Integer).required())
            .field(FieldRule::new("full_name", "full_name", CastKind::Text).required())
            .field(FieldRule::new("balance", "balance", CastKind::Money))
            .field(FieldRule::new("created_at", "created_at", CastKind::Date))
            .index(IndexSpec::new("IX_people_typed_person_id", ["person_id"]).unique())
            .index(IndexSpec::new("IX_people_typed_full_name", ["full_name"]))
    }

    #[test]
    fn test_create_table_sql_types() {
        let sql = create_table_sql(&spec()).unwrap();
        assert!(sql.starts_with("CREATE TABLE \"main\".\"people_typed\""));
        assert!(sql.contains("\"person_id\" INTEGER NULL"));
        assert!(sql.contains("\"full_name\" VARCHAR(4000) NULL"));
        assert!(sql.contains("\"balance\" DECIMAL(19,4) NULL"));
        assert!(sql.contains("\"created_at\" DATE NULL"));
    }

    #[test]
    fn test_create_index_sql_include_and_filter() {
        let table = QualifiedName::parse("main.t").unwrap();

        let covering = IndexSpec::new("IX_t_a", ["a"]).include(["b", "a"]).filter("b IS NOT NULL");
        assert_eq!(
            create_index_sql(&table, &covering).unwrap(),
            "CREATE INDEX \"main\".\"IX_t_a\" ON \"t\" (\"a\", \"b\") WHERE b IS NOT NULL"
        );

        let unique = IndexSpec::new("UX_t_a", ["a"]).unique().include(["b"]);
        assert_eq!(
            create_index_sql(&table, &unique).unwrap(),
            "CREATE UNIQUE INDEX \"main\".\"UX_t_a\" ON \"t\" (\"a\")"
        );

        let unnamed = IndexSpec::new("", ["a"]);
        assert!(matches!(create_index_sql(&table, &unnamed), Err(GateError::EmptyIndexName)));
    }

    #[test]
    fn test_ensure_table_creates_then_leaves_existing() {
        let mut session = Session::open_in_memory().unwrap();

        let first = ensure_table(&mut session, &spec(), false, None).unwrap();
        assert_eq!(first.outcome, TableOutcome::Created);
        assert!(first.indexes.iter().all(|(_, o)| *o == IndexOutcome::Created));

        let second = ensure_table(&mut session, &spec(), false, None).unwrap();
        assert_eq!(second.outcome, TableOutcome::Existing);
        assert!(second.indexes.iter().all(|(_, o)| *o == IndexOutcome::Skipped));
    }

    #[test]
    fn test_drop_and_recreate_requires_exact_phrase() {
        let mut session = Session::open_in_memory().unwrap();
        ensure_table(&mut session, &spec(), false, None).unwrap();
        session
            .conn()
            .execute("INSERT INTO people_typed (person_id, full_name) VALUES (1, 'a')", [])
            .unwrap();

        let missing = ensure_table(&mut session, &spec(), true, None).unwrap_err();
        assert!(matches!(missing, GateError::ConfirmationMissing { .. }));
        let wrong = ensure_table(&mut session, &spec(), true, Some("DROP_CREATE people_typed")).unwrap_err();
        assert!(matches!(wrong, GateError::ConfirmationMismatch { .. }));

        let table = QualifiedName::parse("main.people_typed").unwrap();
        assert_eq!(session.count_rows(&table).unwrap(), 1);

        let report = ensure_table(&mut session, &spec(), true, Some("DROP_CREATE main.people_typed")).unwrap();
        assert_eq!(report.outcome, TableOutcome::Recreated);
        assert_eq!(session.count_rows(&table).unwrap(), 0);
        assert!(report.indexes.iter().all(|(_, o)| *o == IndexOutcome::Created));
    }

    #[test]
    fn test_ensure_index_twice_creates_once() {
        let mut session = Session::open_in_memory().unwrap();
        ensure_table(&mut session, &DatasetSpec { indexes: Vec::new(), ..spec() }, false, None).unwrap();

        let ix = IndexSpec::new("IX_people_typed_person_id", ["person_id"]).unique();
        assert_eq!(ensure_index(&mut session, "main.people_typed", &ix).unwrap(), IndexOutcome::Created);
        assert_eq!(ensure_index(&mut session, "main.people_typed", &ix).unwrap(), IndexOutcome::Skipped);

        let forced = ix.clone().always_create();
        assert!(ensure_index(&mut session, "main.people_typed", &forced).is_err());
    }

    #[test]
    fn test_empty_index_name_fails_before_store() {
        let mut session = Session::open_in_memory().unwrap();
        let bad = spec().index(IndexSpec::new("", ["full_name"]));

        assert!(matches!(
            ensure_table(&mut session, &bad, false, None),
            Err(GateError::EmptyIndexName)
        ));
        let table = QualifiedName::parse("main.people_typed").unwrap();
        assert!(!session.table_exists(&table).unwrap());
    }
}
