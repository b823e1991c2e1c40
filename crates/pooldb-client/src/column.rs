//! References to integer identifier columns.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

#[allow(clippy::expect_used)]
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]{0,127}$").expect("identifier regex"));

/// A validated `table.column` pair naming an integer identifier column.
///
/// Both parts are checked to be plain identifiers so they can be spliced
/// into scan statements without quoting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    table: String,
    column: String,
}

impl ColumnRef {
    /// Create a column reference, validating both identifiers.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let column = column.into();
        validate_identifier(&table)?;
        validate_identifier(&column)?;
        Ok(Self { table, column })
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The ascending scan statement for SQL-speaking stores.
    #[must_use]
    pub fn scan_sql(&self) -> String {
        format!(
            "SELECT {col} FROM {table} ORDER BY {col} ASC",
            col = self.column,
            table = self.table
        )
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Validate an identifier (table or column name) to prevent SQL injection.
fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidIdentifier(
            "identifier cannot be empty".into(),
        ));
    }

    if !IDENTIFIER_RE.is_match(name) {
        return Err(Error::InvalidIdentifier(format!(
            "invalid identifier '{name}': must start with letter/underscore, \
             contain only alphanumerics/_, and be 1-128 characters"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_valid() {
        assert!(validate_identifier("guilds").is_ok());
        assert!(validate_identifier("Item123").is_ok());
        assert!(validate_identifier("_private").is_ok());
    }

    #[test]
    fn test_validate_identifier_invalid() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("123abc").is_err());
        assert!(validate_identifier("guild-name").is_err());
        assert!(validate_identifier("guild name").is_err());
        assert!(validate_identifier("id;DROP TABLE guilds").is_err());
    }

    #[test]
    fn test_scan_sql() {
        let column = ColumnRef::new("guilds", "id").unwrap();
        assert_eq!(column.scan_sql(), "SELECT id FROM guilds ORDER BY id ASC");
        assert_eq!(column.to_string(), "guilds.id");
    }
}
