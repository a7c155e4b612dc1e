//! # Repositories
//!
//! Generic CRUD over one entity type and one session.
//!
//! ## Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Repository<'s, M>                                │
//! │                                                                         │
//! │  ModelClass ── table + primary key (argument, else M::MODEL)           │
//! │  &'s mut Session ── borrowed, never owned                              │
//! │                                                                         │
//! │  create / update / delete ──► Statement staged on the session          │
//! │  select / read / readall  ──► Criteria → SELECT → rows → relations     │
//! │  commit / close / begin   ──► session lifecycle                        │
//! │                                                                         │
//! │  Repository             async, over Session                            │
//! │  BlockingRepository     same contracts, over BlockingSession           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes are staged, not sent: nothing reaches the database until the
//! session flushes (on the next read, an explicit flush, or commit).
//!
//! ## Queries
//! A [`Select`] collects equality filters, predicate filters and raw where
//! clauses, all ANDed, plus relation options that run after the base query.
//! Nothing is ordered or limited unless the caller asks.

mod asynchronous;
mod blocking;

pub use asynchronous::{with_repository, Repository};
pub use blocking::{with_blocking_repository, BlockingRepository};

use async_trait::async_trait;
use std::fmt;
use strata_core::statement::key_value;
use strata_core::{Clause, Criteria, Filter, Order, Statement, Value};
use tracing::debug;

use crate::entity::{Entity, ModelClass};
use crate::error::{DbError, DbResult};
use crate::session::Session;

// =============================================================================
// Relations
// =============================================================================

/// An eager-loading option, run over the rows of a base query.
///
/// Relations never change which parent rows are returned.
#[async_trait]
pub trait Relation<M: Entity>: Send + Sync {
    async fn load(&self, session: &mut Session, parents: &mut [M]) -> DbResult<()>;
}

/// Loads child rows whose `foreign_key` matches a parent's key with a
/// single `IN` query, then hands each parent its children.
///
/// ## Example
/// ```rust,ignore
/// let tags = HasMany::new(TAGS, "note_id", |note: &Note| note.id.into(), |note, tags| note.tags = tags);
/// let notes = repo.readall(Select::new().option(tags)).await?;
/// ```
pub struct HasMany<M, C> {
    child: ModelClass,
    foreign_key: &'static str,
    parent_key: fn(&M) -> Value,
    attach: fn(&mut M, Vec<C>),
}

impl<M, C> HasMany<M, C> {
    pub fn new(
        child: ModelClass,
        foreign_key: &'static str,
        parent_key: fn(&M) -> Value,
        attach: fn(&mut M, Vec<C>),
    ) -> Self {
        HasMany {
            child,
            foreign_key,
            parent_key,
            attach,
        }
    }
}

#[async_trait]
impl<M: Entity, C: Entity> Relation<M> for HasMany<M, C> {
    async fn load(&self, session: &mut Session, parents: &mut [M]) -> DbResult<()> {
        if parents.is_empty() {
            return Ok(());
        }

        let keys: Vec<Value> = parents.iter().map(|parent| (self.parent_key)(parent)).collect();
        let statement = Criteria::default()
            .filter(Filter::in_list(self.foreign_key, keys.clone()))
            .to_select(self.child.table())?;
        let children: Vec<C> = session.fetch_all(&statement).await?;

        let mut buckets: Vec<Vec<C>> = parents.iter().map(|_| Vec::new()).collect();
        for child in children {
            let owner = key_value(self.child.table(), self.foreign_key, &child.columns())?;
            if let Some(index) = keys.iter().position(|key| *key == owner) {
                buckets[index].push(child);
            }
        }

        debug!(
            table = self.child.table(),
            parents = parents.len(),
            "Relation loaded"
        );

        for (parent, children) in parents.iter_mut().zip(buckets) {
            (self.attach)(parent, children);
        }
        Ok(())
    }
}

// =============================================================================
// Select
// =============================================================================

/// Query description for `select`, `read` and `readall`.
pub struct Select<M> {
    criteria: Criteria,
    options: Vec<Box<dyn Relation<M>>>,
}

impl<M: Entity> Select<M> {
    /// Matches every row.
    pub fn new() -> Self {
        Select {
            criteria: Criteria::default(),
            options: Vec::new(),
        }
    }

    /// `column = value`.
    pub fn filter_by(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria = self.criteria.filter_by(column, value);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.criteria = self.criteria.filter(filter);
        self
    }

    /// Raw boolean SQL with `?` markers, e.g. `"views > ? OR title = ?"`.
    ///
    /// Quoted `?` are left alone and `??` renders as a literal `?`.
    pub fn where_raw(
        mut self,
        sql: impl Into<String>,
        params: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.criteria = self.criteria.where_clause(Clause::new(sql, params));
        self
    }

    /// Adds a relation to load after the base query.
    pub fn option(mut self, relation: impl Relation<M> + 'static) -> Self {
        self.options.push(Box::new(relation));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.criteria = self.criteria.order_by(column, order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.criteria = self.criteria.limit(limit);
        self
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }
}

impl<M: Entity> Default for Select<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Select<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("criteria", &self.criteria)
            .field("options", &self.options.len())
            .finish()
    }
}

// =============================================================================
// Rows
// =============================================================================

/// Result of `select`: every matching row, in store order.
#[derive(Debug)]
pub struct Rows<M> {
    table: &'static str,
    rows: Vec<M>,
}

impl<M> Rows<M> {
    /// The single row, or `None`; several rows are an error.
    pub fn one_or_none(mut self) -> DbResult<Option<M>> {
        if self.rows.len() > 1 {
            return Err(DbError::MultipleRows {
                table: self.table.to_string(),
            });
        }
        Ok(self.rows.pop())
    }

    pub fn all(self) -> Vec<M> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// Shared Operations
// =============================================================================

pub(crate) fn stage_insert<M: Entity>(
    model: &ModelClass,
    session: &mut Session,
    entity: &M,
) -> DbResult<()> {
    session.add(Statement::insert(model.table(), &entity.columns())?);
    Ok(())
}

pub(crate) fn stage_update<M: Entity>(
    model: &ModelClass,
    session: &mut Session,
    entity: &M,
) -> DbResult<()> {
    session.add(Statement::update(model.table(), model.primary_key(), &entity.columns())?);
    Ok(())
}

pub(crate) fn stage_delete<M: Entity>(
    model: &ModelClass,
    session: &mut Session,
    entity: &M,
) -> DbResult<()> {
    let key = key_value(model.table(), model.primary_key(), &entity.columns())?;
    session.add(Statement::delete(model.table(), model.primary_key(), key)?);
    Ok(())
}

pub(crate) async fn select<M: Entity>(
    model: &ModelClass,
    session: &mut Session,
    query: Select<M>,
) -> DbResult<Rows<M>> {
    let statement = query.criteria.to_select(model.table())?;
    debug!(table = model.table(), sql = %statement.sql(), "Select composed");

    let mut rows: Vec<M> = session.fetch_all(&statement).await?;
    for relation in &query.options {
        relation.load(session, &mut rows).await?;
    }

    Ok(Rows {
        table: model.table(),
        rows,
    })
}

pub(crate) async fn read<M: Entity>(
    model: &ModelClass,
    session: &mut Session,
    query: Select<M>,
) -> DbResult<Option<M>> {
    let statement = query.criteria.to_select(model.table())?;
    debug!(table = model.table(), sql = %statement.sql(), "Read composed");

    let Some(row) = session.fetch_optional::<M>(&statement, model.table()).await? else {
        return Ok(None);
    };

    let mut rows = [row];
    for relation in &query.options {
        relation.load(session, &mut rows).await?;
    }
    let [row] = rows;
    Ok(Some(row))
}

pub(crate) async fn refresh<M: Entity>(
    model: &ModelClass,
    session: &mut Session,
    entity: &mut M,
) -> DbResult<()> {
    session.flush().await?;

    let key = key_value(model.table(), model.primary_key(), &entity.columns())?;
    let statement = Statement::select_by_key(model.table(), model.primary_key(), key.clone())?;

    match session.fetch_optional::<M>(&statement, model.table()).await? {
        Some(fresh) => {
            *entity = fresh;
            Ok(())
        }
        None => Err(DbError::not_found(model.table(), describe(&key))),
    }
}

fn describe(key: &Value) -> String {
    match key {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Bytes(v) => format!("{} bytes", v.len()),
    }
}
