//! # Entities
//!
//! A persisted type describes itself to repositories through [`Entity`]:
//! which table it lives in, which column identifies a row, and how to turn
//! a value into column/value pairs. Reading rows back goes through sqlx's
//! `FromRow`, usually derived.
//!
//! ## Example
//! ```rust
//! use strata_core::Value;
//! use strata_db::{Entity, ModelClass};
//!
//! #[derive(Debug, sqlx::FromRow)]
//! struct Note {
//!     id: i64,
//!     title: String,
//! }
//!
//! impl Entity for Note {
//!     const MODEL: Option<ModelClass> = Some(ModelClass::new("notes", "id"));
//!
//!     fn columns(&self) -> Vec<(&'static str, Value)> {
//!         vec![("id", self.id.into()), ("title", self.title.clone().into())]
//!     }
//! }
//! ```

use sqlx::any::AnyRow;
use sqlx::FromRow;
use strata_core::Value;

use crate::error::{DbError, DbResult};

/// Table binding for an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelClass {
    table: &'static str,
    primary_key: &'static str,
}

impl ModelClass {
    pub const fn new(table: &'static str, primary_key: &'static str) -> Self {
        ModelClass { table, primary_key }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    /// Picks the explicit binding if given, else the entity's static one.
    ///
    /// ## Errors
    /// `Binding` when neither exists.
    pub fn resolve<M: Entity>(explicit: Option<ModelClass>) -> DbResult<ModelClass> {
        explicit.or(M::MODEL).ok_or_else(|| {
            DbError::Binding(
                "model class must be passed to the repository or set on the entity".to_string(),
            )
        })
    }
}

/// A type stored as one row of one table.
pub trait Entity: for<'r> FromRow<'r, AnyRow> + Send + Sync + Unpin + 'static {
    /// Static table binding. Repositories fall back to it when constructed
    /// without an explicit [`ModelClass`].
    const MODEL: Option<ModelClass> = None;

    /// Every persisted column with its current value, primary key included.
    fn columns(&self) -> Vec<(&'static str, Value)>;
}
