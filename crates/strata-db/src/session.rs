//! # Sessions
//!
//! A session is a unit of work against one engine: staged writes, the
//! transaction they run in, and reads that see those writes.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Session Lifecycle                                │
//! │                                                                         │
//! │  engine.session()            no connection held yet                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  add(stmt) ──► pending       staged, nothing sent                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  flush / execute / fetch ──► BEGIN on first use, pending sent in order │
//! │       │                                                                 │
//! │       ├── commit()   ──► flush + COMMIT                                │
//! │       ├── rollback() ──► discard pending + ROLLBACK                    │
//! │       ▼                                                                 │
//! │  close()                     rollback anything open, release conn      │
//! │                                                                         │
//! │  Dropped while a transaction is open (e.g. a cancelled future):        │
//! │  the transaction is rolled back and the connection returned.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Read Routing
//! A session created with a replica reads from it while no transaction is
//! open. Once a write has been flushed every later read goes to the primary,
//! including reads after the commit, so a session always sees its own writes.
//!
//! ## Failed Writes
//! A statement that fails during a flush poisons the session: flush, execute,
//! fetch and commit answer `PendingRollback` until `rollback` or `close`.
//! Writes sent before the failure can therefore never be committed alone.

use futures_util::TryStreamExt;
use sqlx::any::AnyArguments;
use sqlx::{Any, Arguments, Executor, Transaction};
use std::fmt;
use strata_core::{Statement, Value};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::entity::Entity;
use crate::error::{DbError, DbResult};

/// A unit of work on one engine.
pub struct Session {
    engine: Engine,
    replica: Option<Engine>,
    tx: Option<Transaction<'static, Any>>,
    pending: Vec<Statement>,
    open: bool,
    /// The open transaction carries writes.
    dirty: bool,
    /// A write has been sent at some point; reads stay on the primary.
    wrote: bool,
    /// Cause of a failed write, cleared by rollback or close.
    failed: Option<String>,
}

impl Session {
    pub(crate) fn new(engine: Engine, replica: Option<Engine>) -> Self {
        engine.record_open();
        Session {
            engine,
            replica,
            tx: None,
            pending: Vec::new(),
            open: true,
            dirty: false,
            wrote: false,
            failed: None,
        }
    }

    /// The engine writes go to.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Statements staged but not yet sent.
    pub fn pending(&self) -> &[Statement] {
        &self.pending
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// True after a failed write until `rollback` or `close`.
    pub fn needs_rollback(&self) -> bool {
        self.failed.is_some()
    }

    /// Stages a write for the next flush.
    pub fn add(&mut self, statement: Statement) {
        self.reopen();
        debug!(sql = %statement.sql(), "Statement staged");
        self.pending.push(statement);
    }

    /// Sends every staged statement, in order, inside the transaction.
    ///
    /// ## Errors
    /// If a statement fails, the ones after it are discarded and the session
    /// answers `PendingRollback` to every flush, execute, fetch and commit
    /// until it is rolled back. Statements sent before the failure are never
    /// committed.
    pub async fn flush(&mut self) -> DbResult<()> {
        self.check_usable()?;
        if self.pending.is_empty() {
            return Ok(());
        }

        self.transaction().await?;
        self.mark_written();

        let pending = std::mem::take(&mut self.pending);
        let mut result = Ok(());
        if let Some(tx) = self.tx.as_mut() {
            for statement in &pending {
                if let Err(err) = execute_on(&mut **tx, statement).await {
                    result = Err(err);
                    break;
                }
            }
        }

        match result {
            Ok(()) => {
                debug!(count = pending.len(), "Session flushed");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Runs one statement immediately and returns the affected row count.
    pub async fn execute(&mut self, statement: &Statement) -> DbResult<u64> {
        self.flush().await?;
        self.transaction().await?;
        self.mark_written();

        let result = match self.tx.as_mut() {
            Some(tx) => execute_on(&mut **tx, statement).await,
            None => Ok(0),
        };
        result.map_err(|err| self.fail(err))
    }

    /// Runs a query and maps every row.
    pub async fn fetch_all<M: Entity>(&mut self, statement: &Statement) -> DbResult<Vec<M>> {
        self.fetch(statement, None).await
    }

    /// Runs a query expected to match at most one row.
    ///
    /// ## Errors
    /// `MultipleRows` if a second row exists.
    pub async fn fetch_optional<M: Entity>(
        &mut self,
        statement: &Statement,
        table: &str,
    ) -> DbResult<Option<M>> {
        let mut rows = self.fetch(statement, Some(2)).await?;
        if rows.len() > 1 {
            return Err(DbError::MultipleRows {
                table: table.to_string(),
            });
        }
        Ok(rows.pop())
    }

    async fn fetch<M: Entity>(
        &mut self,
        statement: &Statement,
        max: Option<usize>,
    ) -> DbResult<Vec<M>> {
        self.flush().await?;

        if self.tx.is_none() && !self.wrote {
            if let Some(replica) = &self.replica {
                debug!("Reading from replica");
                return fetch_rows(replica.pool(), statement, max).await;
            }
        }

        let tx = self.transaction().await?;
        fetch_rows(&mut **tx, statement, max).await
    }

    /// Flushes staged writes and commits the transaction.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.flush().await?;
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }

        self.dirty = false;
        self.engine.record_commit();
        debug!("Session committed");
        Ok(())
    }

    /// Discards staged writes and rolls back the transaction.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.pending.clear();
        self.failed = None;
        self.dirty = false;
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }

        self.engine.record_rollback();
        debug!("Session rolled back");
        Ok(())
    }

    /// Releases the connection. An open transaction is rolled back.
    ///
    /// Only a transaction that carried writes counts as a rollback in the
    /// engine statistics. A closed session may be used again; it begins a
    /// new transaction on its next operation.
    pub async fn close(&mut self) -> DbResult<()> {
        self.pending.clear();
        self.failed = None;
        let result = match self.tx.take() {
            Some(tx) => {
                if std::mem::take(&mut self.dirty) {
                    self.engine.record_rollback();
                }
                tx.rollback().await
            }
            None => Ok(()),
        };

        if self.open {
            self.open = false;
            self.engine.record_close();
            debug!("Session closed");
        }

        result.map_err(DbError::from)
    }

    /// Drops an open transaction without awaiting its rollback.
    ///
    /// The driver issues the rollback when the connection goes back to the
    /// pool, which spawns onto the current runtime.
    pub(crate) fn discard_transaction(&mut self) -> bool {
        let dirty = std::mem::take(&mut self.dirty);
        match self.tx.take() {
            Some(tx) => {
                if dirty {
                    warn!("Session dropped with uncommitted writes, rolling back");
                    self.engine.record_rollback();
                }
                drop(tx);
                true
            }
            None => false,
        }
    }

    async fn transaction(&mut self) -> DbResult<&mut Transaction<'static, Any>> {
        self.reopen();
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                let tx = self.engine.pool().begin().await?;
                debug!("Transaction begun");
                tx
            }
        };
        Ok(self.tx.insert(tx))
    }

    fn check_usable(&self) -> DbResult<()> {
        match &self.failed {
            Some(cause) => Err(DbError::PendingRollback(cause.clone())),
            None => Ok(()),
        }
    }

    fn mark_written(&mut self) {
        self.dirty = true;
        self.wrote = true;
    }

    /// Poisons the session until it is rolled back.
    fn fail(&mut self, err: DbError) -> DbError {
        warn!(error = %err, "Write failed, session needs a rollback");
        self.failed = Some(err.to_string());
        err
    }

    fn reopen(&mut self) {
        if !self.open {
            self.open = true;
            self.engine.record_open();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine.url())
            .field("replica", &self.replica.as_ref().map(Engine::url))
            .field("in_transaction", &self.tx.is_some())
            .field("pending", &self.pending.len())
            .field("open", &self.open)
            .field("needs_rollback", &self.failed.is_some())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.discard_transaction();
        if self.open {
            self.open = false;
            self.engine.record_close();
        }
    }
}

// =============================================================================
// Execution Helpers
// =============================================================================

async fn execute_on<'e, E>(executor: E, statement: &'e Statement) -> DbResult<u64>
where
    E: Executor<'e, Database = Any>,
{
    let args = arguments(statement.params())?;
    let result = sqlx::query_with(statement.sql(), args)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

async fn fetch_rows<'e, M, E>(
    executor: E,
    statement: &'e Statement,
    max: Option<usize>,
) -> DbResult<Vec<M>>
where
    M: Entity,
    E: Executor<'e, Database = Any>,
{
    let args = arguments(statement.params())?;
    let mut stream = sqlx::query_as_with::<Any, M, _>(statement.sql(), args).fetch(executor);

    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        rows.push(row);
        if max.is_some_and(|max| rows.len() >= max) {
            break;
        }
    }
    Ok(rows)
}

/// Encodes parameters for the `Any` driver.
///
/// `NULL` is sent as a text-typed null.
pub(crate) fn arguments(params: &[Value]) -> DbResult<AnyArguments<'_>> {
    let mut args = AnyArguments::default();
    for value in params {
        let added = match value {
            Value::Null => args.add(Option::<String>::None),
            Value::Bool(v) => args.add(*v),
            Value::Int(v) => args.add(*v),
            Value::Float(v) => args.add(*v),
            Value::Text(v) => args.add(v.as_str()),
            Value::Bytes(v) => args.add(v.as_slice()),
        };
        added.map_err(|e| DbError::Bind(e.to_string()))?;
    }
    Ok(args)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{temp_engine, Note};

    fn all_notes() -> Statement {
        Statement::new("SELECT * FROM notes ORDER BY id")
    }

    #[tokio::test]
    async fn test_staged_writes_are_invisible_until_flushed() {
        let (_dir, engine) = temp_engine().await;
        let mut session = engine.session();

        session.add(Note::new(1, "draft").insert_statement());
        assert_eq!(session.pending().len(), 1);
        assert!(!session.in_transaction());

        // Reads autoflush first
        let rows: Vec<Note> = session.fetch_all(&all_notes()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(session.pending().is_empty());
        assert!(session.in_transaction());

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_discards_flushed_writes() {
        let (_dir, engine) = temp_engine().await;
        let mut session = engine.session();

        session.add(Note::new(1, "gone").insert_statement());
        session.flush().await.unwrap();
        session.rollback().await.unwrap();

        let rows: Vec<Note> = session.fetch_all(&all_notes()).await.unwrap();
        assert!(rows.is_empty());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_persists_across_sessions() {
        let (_dir, engine) = temp_engine().await;

        let mut writer = engine.session();
        writer.add(Note::new(1, "kept").insert_statement());
        writer.commit().await.unwrap();
        writer.close().await.unwrap();

        let mut reader = engine.session();
        let note: Option<Note> = reader
            .fetch_optional(&Statement::new("SELECT * FROM notes WHERE id = $1").bind(1), "notes")
            .await
            .unwrap();
        assert_eq!(note.map(|n| n.title), Some("kept".to_string()));
        reader.close().await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_fetch_optional_rejects_several_rows() {
        let (_dir, engine) = temp_engine().await;
        let mut session = engine.session();
        session.add(Note::new(1, "a").insert_statement());
        session.add(Note::new(2, "b").insert_statement());

        let result: DbResult<Option<Note>> = session
            .fetch_optional(&Statement::new("SELECT * FROM notes"), "notes")
            .await;
        assert!(matches!(result, Err(DbError::MultipleRows { .. })));
    }

    #[tokio::test]
    async fn test_dropping_session_rolls_back() {
        let (_dir, engine) = temp_engine().await;

        {
            let mut session = engine.session();
            session.add(Note::new(1, "abandoned").insert_statement());
            session.flush().await.unwrap();
        }

        let mut session = engine.session();
        let rows: Vec<Note> = session.fetch_all(&all_notes()).await.unwrap();
        assert!(rows.is_empty());
        session.close().await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(stats.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_closed_session_can_be_reused() {
        let (_dir, engine) = temp_engine().await;
        let mut session = engine.session();
        session.close().await.unwrap();
        assert!(!session.is_open());

        let rows: Vec<Note> = session.fetch_all(&all_notes()).await.unwrap();
        assert!(rows.is_empty());
        assert!(session.is_open());
        session.close().await.unwrap();

        assert_eq!(engine.stats().sessions_opened, 2);
        assert_eq!(engine.stats().closes, 2);
    }

    #[tokio::test]
    async fn test_failed_flush_cannot_commit_partial_work() {
        let (_dir, engine) = temp_engine().await;
        let mut session = engine.session();

        session.add(Note::new(1, "first").insert_statement());
        session.add(Note::new(1, "duplicate").insert_statement());
        session.add(Note::new(3, "never sent").insert_statement());

        let first = session.commit().await;
        assert!(matches!(first, Err(DbError::Persistence(_))));
        assert!(session.needs_rollback());
        assert!(session.pending().is_empty());

        // Note 1 went out before the failure; it must not be committed
        let second = session.commit().await;
        assert!(matches!(second, Err(DbError::PendingRollback(_))));
        let read: DbResult<Vec<Note>> = session.fetch_all(&all_notes()).await;
        assert!(matches!(read, Err(DbError::PendingRollback(_))));

        session.rollback().await.unwrap();
        assert!(!session.needs_rollback());
        session.commit().await.unwrap();

        let rows: Vec<Note> = session.fetch_all(&all_notes()).await.unwrap();
        assert!(rows.is_empty());
        session.close().await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(stats.commits, 1);
    }

    #[tokio::test]
    async fn test_close_clears_failed_write() {
        let (_dir, engine) = temp_engine().await;
        let mut session = engine.session();

        session.add(Note::new(1, "a").insert_statement());
        session.add(Note::new(1, "b").insert_statement());
        assert!(session.flush().await.is_err());

        session.close().await.unwrap();
        assert!(!session.needs_rollback());
        assert_eq!(engine.stats().rollbacks, 1);

        session.add(Note::new(2, "after close").insert_statement());
        session.commit().await.unwrap();
        let rows: Vec<Note> = session.fetch_all(&all_notes()).await.unwrap();
        assert_eq!(rows, vec![Note::new(2, "after close")]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closing_a_read_only_transaction_is_not_a_rollback() {
        let (_dir, engine) = temp_engine().await;
        let mut session = engine.session();

        let rows: Vec<Note> = session.fetch_all(&all_notes()).await.unwrap();
        assert!(rows.is_empty());
        assert!(session.in_transaction());
        session.close().await.unwrap();

        {
            let mut dropped = engine.session();
            let _: Vec<Note> = dropped.fetch_all(&all_notes()).await.unwrap();
        }

        let stats = engine.stats();
        assert_eq!(stats.rollbacks, 0);
        assert_eq!(stats.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_reads_stay_on_primary_after_commit() {
        let (_dir, primary) = temp_engine().await;
        let (_dir2, replica) = temp_engine().await;
        let mut session = Session::new(primary.clone(), Some(replica.clone()));

        session.add(Note::new(1, "mine").insert_statement());
        session.commit().await.unwrap();
        assert!(!session.in_transaction());

        // The replica has not caught up; the session must still see its row
        let note: Option<Note> = session
            .fetch_optional(&Statement::new("SELECT * FROM notes WHERE id = $1").bind(1), "notes")
            .await
            .unwrap();
        assert_eq!(note, Some(Note::new(1, "mine")));
        session.close().await.unwrap();
    }

    #[test]
    fn test_arguments_accept_every_value_kind() {
        let params = vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(1),
            Value::Float(1.5),
            Value::from("text"),
            Value::from(vec![1u8, 2]),
        ];
        assert!(arguments(&params).is_ok());
    }
}
