//! # Error Types
//!
//! Errors raised while composing SQL, before anything reaches a database.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  strata-core errors (this file)                                        │
//! │  └── QueryError      - Invalid identifiers, placeholder mismatches     │
//! │                                                                         │
//! │  strata-db errors (separate crate)                                     │
//! │  └── DbError         - Configuration, binding, persistence failures    │
//! │                                                                         │
//! │  Flow: QueryError → DbError::Query → caller                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Query composition errors.
///
/// All of these indicate programmer error (a bad column name, a raw clause
/// with the wrong number of parameters). They are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// A table or column name is not a plain SQL identifier.
    ///
    /// ## When This Occurs
    /// - Column names with spaces, quotes or punctuation
    /// - Empty names
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// A raw clause has a different number of `?` markers than parameters.
    #[error("Clause '{sql}' has {placeholders} placeholder(s) but {params} parameter(s)")]
    ParameterCount {
        sql: String,
        placeholders: usize,
        params: usize,
    },

    /// A write statement was built without any columns.
    #[error("No columns to write for table {table}")]
    EmptyColumns { table: String },

    /// The primary key column is missing from an entity's columns.
    #[error("Column {column} is missing for table {table}")]
    MissingColumn { table: String, column: String },
}

/// Result type for query composition.
pub type QueryResult<T> = Result<T, QueryError>;
