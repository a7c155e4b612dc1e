//! # Statements
//!
//! Rendered SQL plus its ordered parameters.
//!
//! Placeholders are always written as `$1, $2, ...`. PostgreSQL requires this
//! form and SQLite accepts it as numbered parameters, so one rendering serves
//! both dialects.
//!
//! ## Write Statements
//! ```text
//! Statement::insert("notes", [("id", 1), ("title", "a")])
//!   → INSERT INTO notes (id, title) VALUES ($1, $2)
//!
//! Statement::update("notes", "id", [("id", 1), ("title", "b")])
//!   → UPDATE notes SET title = $1 WHERE id = $2
//!
//! Statement::delete("notes", "id", 1)
//!   → DELETE FROM notes WHERE id = $1
//! ```

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// SQL text with its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    /// Creates a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Statement {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a statement with pre-rendered placeholders and parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }

    /// Appends one parameter.
    ///
    /// ## Example
    /// ```rust
    /// use strata_core::Statement;
    ///
    /// let stmt = Statement::new("SELECT * FROM notes WHERE id = $1").bind(42);
    /// assert_eq!(stmt.params().len(), 1);
    /// ```
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// The SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The parameters, in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Builds `INSERT INTO table (..) VALUES (..)` over every given column.
    pub fn insert(table: &str, columns: &[(&str, Value)]) -> QueryResult<Self> {
        validate_identifier(table)?;
        if columns.is_empty() {
            return Err(QueryError::EmptyColumns {
                table: table.to_string(),
            });
        }

        let mut placeholders = Placeholders::default();
        let mut names = Vec::with_capacity(columns.len());
        let mut markers = Vec::with_capacity(columns.len());
        let mut params = Vec::with_capacity(columns.len());

        for (name, value) in columns {
            names.push(validate_identifier(name)?);
            markers.push(placeholders.next_marker());
            params.push(value.clone());
        }

        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                names.join(", "),
                markers.join(", ")
            ),
            params,
        })
    }

    /// Builds a full-row `UPDATE` keyed by `primary_key`.
    ///
    /// Every column except the key is written; the key's value is taken
    /// from `columns`.
    pub fn update(table: &str, primary_key: &str, columns: &[(&str, Value)]) -> QueryResult<Self> {
        validate_identifier(table)?;
        validate_identifier(primary_key)?;

        let key = key_value(table, primary_key, columns)?;
        let mut placeholders = Placeholders::default();
        let mut assignments = Vec::new();
        let mut params = Vec::new();

        for (name, value) in columns.iter().filter(|(name, _)| *name != primary_key) {
            assignments.push(format!(
                "{} = {}",
                validate_identifier(name)?,
                placeholders.next_marker()
            ));
            params.push(value.clone());
        }

        if assignments.is_empty() {
            return Err(QueryError::EmptyColumns {
                table: table.to_string(),
            });
        }

        let key_marker = placeholders.next_marker();
        params.push(key);

        Ok(Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = {}",
                table,
                assignments.join(", "),
                primary_key,
                key_marker
            ),
            params,
        })
    }

    /// Builds `DELETE FROM table WHERE primary_key = $1`.
    pub fn delete(table: &str, primary_key: &str, key: Value) -> QueryResult<Self> {
        validate_identifier(table)?;
        validate_identifier(primary_key)?;

        Ok(Statement {
            sql: format!("DELETE FROM {} WHERE {} = $1", table, primary_key),
            params: vec![key],
        })
    }

    /// Builds `SELECT * FROM table WHERE primary_key = $1`.
    pub fn select_by_key(table: &str, primary_key: &str, key: Value) -> QueryResult<Self> {
        validate_identifier(table)?;
        validate_identifier(primary_key)?;

        Ok(Statement {
            sql: format!("SELECT * FROM {} WHERE {} = $1", table, primary_key),
            params: vec![key],
        })
    }
}

/// Finds the primary key's value among an entity's columns.
pub fn key_value(table: &str, primary_key: &str, columns: &[(&str, Value)]) -> QueryResult<Value> {
    columns
        .iter()
        .find(|(name, _)| *name == primary_key)
        .map(|(_, value)| value.clone())
        .ok_or_else(|| QueryError::MissingColumn {
            table: table.to_string(),
            column: primary_key.to_string(),
        })
}

/// Checks that `name` is a plain (optionally schema-qualified) identifier.
///
/// Identifiers are interpolated into SQL text, so anything other than
/// `[A-Za-z_][A-Za-z0-9_]*` segments joined by `.` is rejected.
pub fn validate_identifier(name: &str) -> QueryResult<&str> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(name)
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}

/// Hands out `$1, $2, ...` in order.
#[derive(Debug, Default)]
pub(crate) struct Placeholders {
    issued: usize,
}

impl Placeholders {
    pub(crate) fn next_marker(&mut self) -> String {
        self.issued += 1;
        format!("${}", self.issued)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn note_columns() -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(7)),
            ("title", Value::from("groceries")),
            ("views", Value::from(3)),
        ]
    }

    #[test]
    fn test_insert_renders_every_column() {
        let stmt = Statement::insert("notes", &note_columns()).unwrap();

        assert_eq!(
            stmt.sql(),
            "INSERT INTO notes (id, title, views) VALUES ($1, $2, $3)"
        );
        assert_eq!(stmt.params().len(), 3);
        assert_eq!(stmt.params()[1], Value::from("groceries"));
    }

    #[test]
    fn test_update_moves_key_to_where_clause() {
        let stmt = Statement::update("notes", "id", &note_columns()).unwrap();

        assert_eq!(
            stmt.sql(),
            "UPDATE notes SET title = $1, views = $2 WHERE id = $3"
        );
        assert_eq!(stmt.params()[2], Value::Int(7));
    }

    #[test]
    fn test_update_without_key_fails() {
        let columns = vec![("title", Value::from("x"))];
        let err = Statement::update("notes", "id", &columns).unwrap_err();

        assert_eq!(
            err,
            QueryError::MissingColumn {
                table: "notes".to_string(),
                column: "id".to_string()
            }
        );
    }

    #[test]
    fn test_insert_rejects_hostile_identifiers() {
        let columns = vec![("title; DROP TABLE notes", Value::from("x"))];
        assert!(matches!(
            Statement::insert("notes", &columns),
            Err(QueryError::InvalidIdentifier(_))
        ));
        assert!(Statement::insert("notes", &[]).is_err());
    }

    #[test]
    fn test_validate_identifier_accepts_schema_qualified_names() {
        assert!(validate_identifier("public.notes").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("1notes").is_err());
        assert!(validate_identifier("notes.").is_err());
    }

    #[test]
    fn test_delete_and_select_by_key() {
        let delete = Statement::delete("notes", "id", Value::from(1)).unwrap();
        assert_eq!(delete.sql(), "DELETE FROM notes WHERE id = $1");

        let select = Statement::select_by_key("notes", "id", Value::from(1)).unwrap();
        assert_eq!(select.sql(), "SELECT * FROM notes WHERE id = $1");
    }
}
