//! Table names, identifier quoting and confirmation phrases

use std::fmt;

use crate::error::{GateError, Result};

/// Schema used when a table name is not qualified
pub const DEFAULT_SCHEMA: &str = "main";

/// Quote an identifier for SQLite, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn check_ident(ident: &str, full: &str) -> Result<()> {
    if ident.is_empty() || ident.contains('\0') {
        return Err(GateError::InvalidIdentifier(full.to_string()));
    }
    Ok(())
}

/// A `schema.table` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: String,
    pub table: String,
}

impl QualifiedName {
    /// Split `schema.table`; a bare name lands in [`DEFAULT_SCHEMA`]
    pub fn parse(full: &str) -> Result<Self> {
        let s = full.trim();
        let (schema, table) = match s.split_once('.') {
            Some((schema, table)) => (schema.trim(), table.trim()),
            None => (DEFAULT_SCHEMA, s),
        };
        check_ident(schema, full)?;
        check_ident(table, full)?;
        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Quoted `"schema"."table"` for use in SQL text
    pub fn sql(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Quoted schema-qualified name of a sibling object (indexes live in the table's schema)
    pub fn sibling_sql(&self, name: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(name))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Check an operator-supplied phrase against `"<action> <target>"`
///
/// The phrase must match exactly. Nothing is touched before this passes.
pub fn require_confirmation(action: &str, target: &QualifiedName, confirm: Option<&str>) -> Result<()> {
    let expected = format!("{} {}", action, target);
    match confirm {
        None => Err(GateError::ConfirmationMissing { expected }),
        Some(got) if got == expected => Ok(()),
        Some(got) => Err(GateError::ConfirmationMismatch {
            expected,
            got: got.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_schema() {
        let name = QualifiedName::parse("people_typed").unwrap();
        assert_eq!(name.schema, "main");
        assert_eq!(name.table, "people_typed");
        assert_eq!(name.to_string(), "main.people_typed");
    }

    #[test]
    fn test_parse_qualified() {
        let name = QualifiedName::parse(" aux.stage_people ").unwrap();
        assert_eq!(name.schema, "aux");
        assert_eq!(name.table, "stage_people");
        assert_eq!(name.sql(), "\"aux\".\"stage_people\"");
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        assert!(QualifiedName::parse("").is_err());
        assert!(QualifiedName::parse("main.").is_err());
        assert!(QualifiedName::parse(".t").is_err());
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_require_confirmation() {
        let target = QualifiedName::parse("main.people_typed").unwrap();

        assert!(require_confirmation("DROP_CREATE", &target, Some("DROP_CREATE main.people_typed")).is_ok());

        let missing = require_confirmation("DROP_CREATE", &target, None).unwrap_err();
        assert!(matches!(missing, GateError::ConfirmationMissing { .. }));

        let wrong = require_confirmation("DROP_CREATE", &target, Some("DROP_CREATE people_typed")).unwrap_err();
        assert!(matches!(wrong, GateError::ConfirmationMismatch { .. }));

        // Exact match only
        let padded = require_confirmation("DROP_CREATE", &target, Some(" DROP_CREATE main.people_typed"));
        assert!(padded.is_err());
    }
}
