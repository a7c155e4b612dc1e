//! # strata-core: Pure Building Blocks for Strata
//!
//! Everything in this crate is computed without touching a database.
//! `strata-db` renders its SQL through these types and only then hands the
//! result to a connection.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Strata Data Flow                                 │
//! │                                                                         │
//! │  Repository::readall(Select::new().filter_by("title", "x"))            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ strata-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   value   │  │   query   │  │ statement │  │   cache   │  │   │
//! │  │   │   Value   │  │  Filter   │  │  INSERT   │  │ Cache<T>  │  │   │
//! │  │   │           │  │  Clause   │  │  UPDATE   │  │  (TTL)    │  │   │
//! │  │   │           │  │  Criteria │  │  DELETE   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │  Statement { sql, params }                                      │
//! │       ▼                                                                 │
//! │  strata-db (binds params, runs on a Session)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`value`] - Dialect-neutral bind values
//! - [`query`] - Filters, raw clauses and their composition into a SELECT
//! - [`statement`] - Rendered SQL plus parameters, write statement builders
//! - [`cache`] - Expiring key-value store with lazy eviction
//! - [`error`] - Query composition errors
//!
//! ## Example Usage
//!
//! ```rust
//! use strata_core::query::{Criteria, Filter};
//!
//! let statement = Criteria::default()
//!     .filter_by("title", "groceries")
//!     .filter(Filter::gt("views", 10))
//!     .to_select("notes")
//!     .unwrap();
//!
//! assert_eq!(
//!     statement.sql(),
//!     "SELECT * FROM notes WHERE title = $1 AND views > $2"
//! );
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod query;
pub mod statement;
pub mod value;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::Cache;
pub use error::{QueryError, QueryResult};
pub use query::{Clause, Criteria, Filter, Operator, Order};
pub use statement::Statement;
pub use value::Value;
