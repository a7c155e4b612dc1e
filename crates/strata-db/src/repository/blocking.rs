//! Blocking repository over [`BlockingSession`].
//!
//! Same contracts as [`Repository`](super::Repository); each call blocks on
//! the session's engine runtime.

use std::marker::PhantomData;
use tracing::debug;

use super::{Rows, Select};
use crate::blocking::BlockingSession;
use crate::entity::{Entity, ModelClass};
use crate::error::{DbError, DbResult};
use crate::registry::BlockingSessionFactory;

/// CRUD for entity `M` through a borrowed blocking session.
pub struct BlockingRepository<'s, M> {
    model: ModelClass,
    session: Option<&'s mut BlockingSession>,
    factory: Option<BlockingSessionFactory>,
    _entity: PhantomData<fn() -> M>,
}

impl<'s, M: Entity> BlockingRepository<'s, M> {
    pub fn new(model: Option<ModelClass>) -> DbResult<Self> {
        Ok(BlockingRepository {
            model: ModelClass::resolve::<M>(model)?,
            session: None,
            factory: None,
            _entity: PhantomData,
        })
    }

    fn scoped(model: ModelClass, session: &'s mut BlockingSession) -> Self {
        BlockingRepository {
            model,
            session: Some(session),
            factory: None,
            _entity: PhantomData,
        }
    }

    pub fn with_session(mut self, session: &'s mut BlockingSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_factory(mut self, factory: BlockingSessionFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn model(&self) -> ModelClass {
        self.model
    }

    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&mut self) -> DbResult<&mut BlockingSession> {
        self.session.as_deref_mut().ok_or_else(DbError::no_session)
    }

    pub fn create(&mut self, entity: M) -> DbResult<M> {
        let model = self.model;
        let (_, session) = self.session()?.split();
        super::stage_insert(&model, session, &entity)?;
        Ok(entity)
    }

    pub fn create_model(&mut self, fields: impl Into<M>) -> DbResult<M> {
        self.create(fields.into())
    }

    pub fn select(&mut self, query: Select<M>) -> DbResult<Rows<M>> {
        let model = self.model;
        let (runtime, session) = self.session()?.split();
        runtime.block_on(super::select(&model, session, query))
    }

    pub fn read(&mut self, query: Select<M>) -> DbResult<Option<M>> {
        let model = self.model;
        let (runtime, session) = self.session()?.split();
        runtime.block_on(super::read(&model, session, query))
    }

    pub fn readall(&mut self, query: Select<M>) -> DbResult<Vec<M>> {
        Ok(self.select(query)?.all())
    }

    pub fn update(&mut self, entity: M) -> DbResult<M> {
        let model = self.model;
        let (_, session) = self.session()?.split();
        super::stage_update(&model, session, &entity)?;
        Ok(entity)
    }

    pub fn delete(&mut self, entity: &M) -> DbResult<()> {
        let model = self.model;
        let (_, session) = self.session()?.split();
        super::stage_delete(&model, session, entity)
    }

    pub fn refresh(&mut self, entity: &mut M) -> DbResult<()> {
        let model = self.model;
        let (runtime, session) = self.session()?.split();
        runtime.block_on(super::refresh(&model, session, entity))
    }

    pub fn commit(&mut self) -> DbResult<()> {
        self.session()?.commit()
    }

    /// Commits, closes the session and unbinds it.
    pub fn close(&mut self) -> DbResult<()> {
        let session = self.session.take().ok_or_else(DbError::no_session)?;
        let committed = session.commit();
        let closed = session.close();
        debug!(table = self.model.table(), "Repository closed");
        committed.and(closed)
    }

    /// Runs `body` as one unit of work; see [`Repository::begin`](super::Repository::begin).
    pub fn begin<T, X, F>(&mut self, body: F) -> Result<T, X>
    where
        X: From<DbError>,
        F: FnOnce(&mut BlockingRepository<'_, M>) -> Result<T, X>,
    {
        let model = self.model;

        if let Some(session) = self.session.as_deref_mut() {
            let value = body(&mut BlockingRepository::scoped(model, &mut *session))?;
            session.commit()?;
            return Ok(value);
        }

        let factory = self.factory.clone().ok_or_else(|| {
            X::from(DbError::Binding(
                "no session is bound and no factory is set".to_string(),
            ))
        })?;

        factory.transaction(None, |session| {
            body(&mut BlockingRepository::scoped(model, session))
        })
    }
}

/// Blocking counterpart of [`with_repository`](super::with_repository).
pub fn with_blocking_repository<M, T, X, F>(
    factory: &BlockingSessionFactory,
    body: F,
) -> Result<T, X>
where
    M: Entity,
    X: From<DbError>,
    F: FnOnce(&mut BlockingRepository<'_, M>) -> Result<T, X>,
{
    BlockingRepository::<M>::new(None)
        .map_err(X::from)?
        .with_factory(factory.clone())
        .begin(body)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::testing::{note_schema, Note};
    use strata_core::Order;

    fn factory() -> (tempfile::TempDir, BlockingSessionFactory) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::sqlite(dir.path().join("repo.db")).unwrap();
        let factory = BlockingSessionFactory::new();
        factory.create_and_set_engine(&config).unwrap();
        factory
            .transaction(None, |session| session.execute(&note_schema()))
            .unwrap();
        (dir, factory)
    }

    #[test]
    fn test_blocking_create_commit_read() {
        let (_dir, factory) = factory();
        let mut session = factory.session(None).unwrap();
        let mut repo = BlockingRepository::<Note>::new(None).unwrap().with_session(&mut session);

        let created = repo.create(Note::new(1, "sync")).unwrap();
        repo.commit().unwrap();

        assert_eq!(repo.read(Select::new().filter_by("id", 1)).unwrap(), Some(created));
        repo.close().unwrap();
        assert!(matches!(repo.close(), Err(DbError::Binding(_))));
    }

    #[test]
    fn test_blocking_update_and_refresh() {
        let (_dir, factory) = factory();
        let mut session = factory.session(None).unwrap();
        let mut repo = BlockingRepository::<Note>::new(None).unwrap().with_session(&mut session);

        repo.create(Note::new(1, "before")).unwrap();
        let mut note = Note::new(1, "after");
        note.views = 2;
        repo.update(note.clone()).unwrap();

        let mut copy = Note::new(1, "");
        repo.refresh(&mut copy).unwrap();
        assert_eq!(copy, note);

        repo.delete(&note).unwrap();
        assert!(repo.readall(Select::new()).unwrap().is_empty());
    }

    #[test]
    fn test_blocking_begin_scopes() {
        let (_dir, factory) = factory();

        with_blocking_repository::<Note, _, DbError, _>(&factory, |notes| {
            notes.create(Note::new(1, "a"))?;
            notes.create(Note::new(2, "b"))?;
            Ok(())
        })
        .unwrap();

        let failed: Result<(), DbError> =
            with_blocking_repository::<Note, _, _, _>(&factory, |notes| {
                notes.create(Note::new(3, "c"))?;
                Err(DbError::not_found("notes", "3"))
            });
        assert!(failed.is_err());

        let ids: Vec<i64> = with_blocking_repository::<Note, _, DbError, _>(&factory, |notes| {
            Ok(notes
                .readall(Select::new().order_by("id", Order::Asc))?
                .into_iter()
                .map(|note| note.id)
                .collect())
        })
        .unwrap();
        assert_eq!(ids, vec![1, 2]);

        let stats = factory.get_engine().unwrap().stats();
        assert_eq!(stats.open_sessions(), 0);
    }
}
