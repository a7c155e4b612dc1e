//! Async repository over [`Session`].

use futures_util::future::BoxFuture;
use std::marker::PhantomData;
use tracing::debug;

use super::{Rows, Select};
use crate::entity::{Entity, ModelClass};
use crate::error::{DbError, DbResult};
use crate::registry::SessionFactory;
use crate::session::Session;

/// CRUD for entity `M` through a borrowed session.
///
/// The repository never commits on its own: `create`, `update` and
/// `delete` only stage statements.
///
/// ## Example
/// ```rust,ignore
/// let mut session = factory.session(None)?;
/// let mut notes = Repository::<Note>::new(None)?.with_session(&mut session);
///
/// notes.create(Note::new(1, "groceries")).await?;
/// notes.commit().await?;
///
/// let found = notes.read(Select::new().filter_by("id", 1)).await?;
/// ```
pub struct Repository<'s, M> {
    model: ModelClass,
    session: Option<&'s mut Session>,
    factory: Option<SessionFactory>,
    _entity: PhantomData<fn() -> M>,
}

impl<'s, M: Entity> Repository<'s, M> {
    /// Creates an unbound repository.
    ///
    /// ## Errors
    /// `Binding` if `model` is `None` and `M` has no static binding.
    pub fn new(model: Option<ModelClass>) -> DbResult<Self> {
        Ok(Repository {
            model: ModelClass::resolve::<M>(model)?,
            session: None,
            factory: None,
            _entity: PhantomData,
        })
    }

    fn scoped(model: ModelClass, session: &'s mut Session) -> Self {
        Repository {
            model,
            session: Some(session),
            factory: None,
            _entity: PhantomData,
        }
    }

    /// Binds an externally owned session.
    pub fn with_session(mut self, session: &'s mut Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Lets [`begin`](Self::begin) open its own session when unbound.
    pub fn with_factory(mut self, factory: SessionFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn model(&self) -> ModelClass {
        self.model
    }

    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }

    /// The bound session.
    ///
    /// ## Errors
    /// `Binding("session is None")` when unbound.
    pub fn session(&mut self) -> DbResult<&mut Session> {
        self.session.as_deref_mut().ok_or_else(DbError::no_session)
    }

    /// Stages an insert of `entity` and hands it back.
    pub async fn create(&mut self, entity: M) -> DbResult<M> {
        let model = self.model;
        super::stage_insert(&model, self.session()?, &entity)?;
        Ok(entity)
    }

    /// Converts `fields` into an entity, then stages its insert.
    pub async fn create_model(&mut self, fields: impl Into<M>) -> DbResult<M> {
        self.create(fields.into()).await
    }

    /// Runs the query; every matching row, in store order.
    pub async fn select(&mut self, query: Select<M>) -> DbResult<Rows<M>> {
        let model = self.model;
        super::select(&model, self.session()?, query).await
    }

    /// The single matching row, or `None`.
    ///
    /// ## Errors
    /// `MultipleRows` if more than one row matches.
    pub async fn read(&mut self, query: Select<M>) -> DbResult<Option<M>> {
        let model = self.model;
        super::read(&model, self.session()?, query).await
    }

    pub async fn readall(&mut self, query: Select<M>) -> DbResult<Vec<M>> {
        Ok(self.select(query).await?.all())
    }

    /// Stages a full-row update keyed by the primary key.
    pub async fn update(&mut self, entity: M) -> DbResult<M> {
        let model = self.model;
        super::stage_update(&model, self.session()?, &entity)?;
        Ok(entity)
    }

    /// Stages a delete of the row with `entity`'s primary key.
    pub async fn delete(&mut self, entity: &M) -> DbResult<()> {
        let model = self.model;
        super::stage_delete(&model, self.session()?, entity)
    }

    /// Overwrites `entity` with its stored row.
    ///
    /// ## Errors
    /// `NotFound` if the row no longer exists.
    pub async fn refresh(&mut self, entity: &mut M) -> DbResult<()> {
        let model = self.model;
        super::refresh(&model, self.session()?, entity).await
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        self.session()?.commit().await
    }

    /// Commits, closes the session and unbinds it.
    pub async fn close(&mut self) -> DbResult<()> {
        let session = self.session.take().ok_or_else(DbError::no_session)?;
        let committed = session.commit().await;
        let closed = session.close().await;
        debug!(table = self.model.table(), "Repository closed");
        committed.and(closed)
    }

    /// Runs `body` as one unit of work.
    ///
    /// ## Bound
    /// `body` runs on the bound session, which is committed if it succeeds
    /// and left open either way.
    ///
    /// ## Unbound
    /// A session is taken from the factory's scoped transaction: committed
    /// on success, rolled back on failure, always closed. The repository is
    /// still unbound afterwards.
    pub async fn begin<T, X, F>(&mut self, body: F) -> Result<T, X>
    where
        X: From<DbError>,
        F: for<'r> FnOnce(&'r mut Repository<'r, M>) -> BoxFuture<'r, Result<T, X>>
            + Send
            + 'static,
    {
        let model = self.model;

        if let Some(session) = self.session.as_deref_mut() {
            let value = {
                let mut scoped = Repository::scoped(model, &mut *session);
                body(&mut scoped).await?
            };
            session.commit().await?;
            return Ok(value);
        }

        let factory = self.factory.clone().ok_or_else(|| {
            X::from(DbError::Binding(
                "no session is bound and no factory is set".to_string(),
            ))
        })?;

        factory
            .transaction(None, move |session| {
                Box::pin(async move {
                    let mut scoped = Repository::scoped(model, &mut *session);
                    body(&mut scoped).await
                })
            })
            .await
    }
}

/// Runs `body` with a repository on a fresh scoped session from `factory`.
///
/// ## Example
/// ```rust,ignore
/// let note = with_repository::<Note, _, DbError, _>(&factory, |notes| {
///     Box::pin(async move { notes.create(Note::new(1, "a")).await })
/// })
/// .await?;
/// ```
pub async fn with_repository<M, T, X, F>(factory: &SessionFactory, body: F) -> Result<T, X>
where
    M: Entity,
    X: From<DbError>,
    F: for<'r> FnOnce(&'r mut Repository<'r, M>) -> BoxFuture<'r, Result<T, X>> + Send + 'static,
{
    let mut repository = Repository::<M>::new(None)
        .map_err(X::from)?
        .with_factory(factory.clone());
    repository.begin(body).await
}

// =============================================================================
// Unit Tests
// =============================================================================
