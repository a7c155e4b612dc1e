//! # Database Error Types
//!
//! Error types for engine configuration, session handling and repositories.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  EngineConfig::build ──► Configuration   (fails before any connect)    │
//! │  Repository::new     ──► Binding         (no model class / session)    │
//! │  strata-core         ──► Query           (bad identifier, ? count)     │
//! │  sqlx::Error         ──► Persistence     (execute / commit failures)   │
//! │  Session::flush fails ──► PendingRollback (until rollback)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Scoped transaction: rollback → close → return the SAME error          │
//! │                                                                         │
//! │  Nothing here is retried. Transient connection drops are absorbed by   │
//! │  pre-ping and recycling, not by re-running queries.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database layer errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Missing configuration, unresolvable connection URL, no engine.
    ///
    /// ## When This Occurs
    /// - A required field (host, port, name, credentials, path) is absent
    /// - `create_engine` is given an empty URL
    /// - A session is requested before any engine was installed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A repository cannot resolve what it operates on.
    ///
    /// ## When This Occurs
    /// - No model class from the argument or the entity's static binding
    /// - An operation needs a session and none is bound
    #[error("Binding error: {0}")]
    Binding(String),

    /// Failure surfaced by the underlying store.
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// A write failed part way through a flush; the session refuses further
    /// work until it is rolled back.
    #[error("Session must be rolled back after a failed write: {0}")]
    PendingRollback(String),

    /// A single-row read matched more than one row.
    #[error("Expected at most one row from {table}, found several")]
    MultipleRows { table: String },

    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// SQL could not be composed.
    #[error("Query error: {0}")]
    Query(#[from] strata_core::QueryError),

    /// A parameter could not be encoded for the driver.
    #[error("Bind error: {0}")]
    Bind(String),

    /// No Tokio runtime is available, or one could not be built.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Configuration error for a missing required field.
    pub fn missing(field: &str) -> Self {
        DbError::Configuration(format!("{} is required", field))
    }

    /// The error raised when an operation needs a bound session.
    pub fn no_session() -> Self {
        DbError::Binding("session is None".to_string())
    }

    /// True for failures raised by the store rather than by this crate.
    pub fn is_persistence(&self) -> bool {
        matches!(self, DbError::Persistence(_))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
