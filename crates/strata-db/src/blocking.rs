//! # Blocking Sessions
//!
//! The synchronous face of [`Session`]. Every call blocks the current thread
//! on the engine's private runtime, so the contracts (staging, autoflush,
//! commit, rollback, close) are exactly those of the async session.
//!
//! Calling any method from inside an async task panics, as blocking on a
//! runtime from within a runtime is not allowed.

use std::sync::Arc;
use strata_core::Statement;
use tokio::runtime::Runtime;

use crate::engine::Engine;
use crate::entity::Entity;
use crate::error::DbResult;
use crate::session::Session;

/// A unit of work for callers on plain threads.
#[derive(Debug)]
pub struct BlockingSession {
    runtime: Arc<Runtime>,
    session: Session,
}

impl BlockingSession {
    pub(crate) fn new(runtime: Arc<Runtime>, session: Session) -> Self {
        BlockingSession { runtime, session }
    }

    pub fn engine(&self) -> &Engine {
        self.session.engine()
    }

    pub fn pending(&self) -> &[Statement] {
        self.session.pending()
    }

    pub fn in_transaction(&self) -> bool {
        self.session.in_transaction()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn add(&mut self, statement: Statement) {
        self.session.add(statement);
    }

    pub fn flush(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.session.flush())
    }

    pub fn execute(&mut self, statement: &Statement) -> DbResult<u64> {
        self.runtime.block_on(self.session.execute(statement))
    }

    pub fn fetch_all<M: Entity>(&mut self, statement: &Statement) -> DbResult<Vec<M>> {
        self.runtime.block_on(self.session.fetch_all(statement))
    }

    pub fn fetch_optional<M: Entity>(
        &mut self,
        statement: &Statement,
        table: &str,
    ) -> DbResult<Option<M>> {
        self.runtime.block_on(self.session.fetch_optional(statement, table))
    }

    pub fn commit(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.session.commit())
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.session.rollback())
    }

    pub fn close(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.session.close())
    }

    /// The runtime and the async session it drives.
    pub(crate) fn split(&mut self) -> (&Runtime, &mut Session) {
        (&self.runtime, &mut self.session)
    }
}

impl Drop for BlockingSession {
    fn drop(&mut self) {
        // Returning the connection spawns onto a runtime
        let _guard = self.runtime.enter();
        self.session.discard_transaction();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::engine::create_blocking_engine;
    use crate::testing::{note_schema, Note};
    use strata_core::Statement;

    #[test]
    fn test_blocking_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::sqlite(dir.path().join("blocking.db")).unwrap();
        let engine = create_blocking_engine(&config).unwrap();

        let mut session = engine.session();
        session.execute(&note_schema()).unwrap();
        session.add(Note::new(1, "sync").insert_statement());
        session.commit().unwrap();
        session.close().unwrap();

        let mut reader = engine.session();
        let notes: Vec<Note> = reader.fetch_all(&Statement::new("SELECT * FROM notes")).unwrap();
        assert_eq!(notes, vec![Note::new(1, "sync")]);
        reader.close().unwrap();

        assert_eq!(engine.stats().open_sessions(), 0);
    }

    #[test]
    fn test_dropped_blocking_session_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::sqlite(dir.path().join("blocking.db")).unwrap();
        let engine = create_blocking_engine(&config).unwrap();

        let mut setup = engine.session();
        setup.execute(&note_schema()).unwrap();
        setup.commit().unwrap();
        drop(setup);

        {
            let mut session = engine.session();
            session.add(Note::new(1, "lost").insert_statement());
            session.flush().unwrap();
        }

        let mut reader = engine.session();
        let notes: Vec<Note> = reader.fetch_all(&Statement::new("SELECT * FROM notes")).unwrap();
        assert!(notes.is_empty());
        assert_eq!(engine.stats().rollbacks, 1);
    }
}
