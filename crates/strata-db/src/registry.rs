//! # Engine Registry
//!
//! Holds the current engine (and an optional read replica) and hands out
//! sessions bound to it. A registry is an ordinary value: construct one at
//! startup and share it by clone.
//!
//! ## Scoped Transactions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              factory.transaction(bind, |session| ...)                   │
//! │                                                                         │
//! │  session(bind) ──► body(&mut session)                                  │
//! │                        │                                                │
//! │            ┌───────────┴────────────┐                                  │
//! │            ▼                        ▼                                   │
//! │         Ok(value)                Err(e)                                 │
//! │            │                        │                                   │
//! │         commit ──fails──► rollback ◄┘   (rollback failure: logged)     │
//! │            │                  │                                         │
//! │            ▼                  ▼                                         │
//! │         close              close                                        │
//! │            │                  │                                         │
//! │            ▼                  ▼                                         │
//! │        Ok(value)     Err(e), unchanged                                  │
//! │                                                                         │
//! │  Future dropped mid-body: Session's Drop rolls back and releases.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Replacing Engines
//! `set_engine` only affects sessions created afterwards. A session keeps a
//! clone of the engine it was opened on, so replacing the current engine
//! never disturbs work in flight.

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use crate::blocking::BlockingSession;
use crate::config::EngineConfig;
use crate::engine::{create_blocking_engine, create_engine, BlockingEngine, Engine};
use crate::error::{DbError, DbResult};
use crate::session::Session;

/// An engine type a [`Registry`] can hold.
pub trait EngineHandle: Clone + Send + Sync + 'static {
    type Session;

    fn from_config(config: &EngineConfig) -> DbResult<Self>;

    /// Opens a session on `self`, reading from `replica` when given.
    fn open_session(&self, replica: Option<&Self>) -> Self::Session;

    fn url(&self) -> &str;
}

impl EngineHandle for Engine {
    type Session = Session;

    fn from_config(config: &EngineConfig) -> DbResult<Self> {
        create_engine(config)
    }

    fn open_session(&self, replica: Option<&Self>) -> Session {
        Session::new(self.clone(), replica.cloned())
    }

    fn url(&self) -> &str {
        Engine::url(self)
    }
}

impl EngineHandle for BlockingEngine {
    type Session = BlockingSession;

    fn from_config(config: &EngineConfig) -> DbResult<Self> {
        create_blocking_engine(config)
    }

    fn open_session(&self, replica: Option<&Self>) -> BlockingSession {
        let session = Session::new(self.engine().clone(), replica.map(|r| r.engine().clone()));
        BlockingSession::new(self.runtime().clone(), session)
    }

    fn url(&self) -> &str {
        self.engine().url()
    }
}

/// Current engine plus optional replica.
#[derive(Debug)]
pub struct Registry<E> {
    engine: Arc<RwLock<Option<E>>>,
    replica: Arc<RwLock<Option<E>>>,
}

/// Registry of async engines.
pub type SessionFactory = Registry<Engine>;

/// Registry of blocking engines.
pub type BlockingSessionFactory = Registry<BlockingEngine>;

impl<E> Clone for Registry<E> {
    fn clone(&self) -> Self {
        Registry {
            engine: self.engine.clone(),
            replica: self.replica.clone(),
        }
    }
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Registry {
            engine: Arc::new(RwLock::new(None)),
            replica: Arc::new(RwLock::new(None)),
        }
    }
}

impl<E: EngineHandle> Registry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: E) -> Self {
        let registry = Self::new();
        registry.set_engine(engine);
        registry
    }

    /// Installs `engine` as current, replacing any previous one.
    pub fn set_engine(&self, engine: E) {
        info!(url = %engine.url(), "Engine installed");
        *self.engine.write() = Some(engine);
    }

    /// The current engine, if one is installed.
    pub fn get_engine(&self) -> Option<E> {
        self.engine.read().clone()
    }

    /// Builds an engine from `config` and installs it.
    pub fn create_and_set_engine(&self, config: &EngineConfig) -> DbResult<E> {
        let engine = E::from_config(config)?;
        self.set_engine(engine.clone());
        Ok(engine)
    }

    /// Installs (or with `None`, removes) the read replica.
    pub fn set_replica(&self, replica: Option<E>) {
        if let Some(replica) = &replica {
            info!(url = %replica.url(), "Read replica installed");
        }
        *self.replica.write() = replica;
    }

    pub fn replica(&self) -> Option<E> {
        self.replica.read().clone()
    }

    /// Opens a session on `bind`, or on the current engine.
    ///
    /// Only sessions on the current engine read from the replica.
    ///
    /// ## Errors
    /// `Configuration` when no engine is bound or installed.
    pub fn session(&self, bind: Option<&E>) -> DbResult<E::Session> {
        if let Some(engine) = bind {
            return Ok(engine.open_session(None));
        }

        let engine = self
            .get_engine()
            .ok_or_else(|| DbError::Configuration("engine is not configured".to_string()))?;
        let replica = self.replica();
        Ok(engine.open_session(replica.as_ref()))
    }
}

impl Registry<Engine> {
    /// Runs `body` in a session that is committed on success, rolled back on
    /// failure and closed either way.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let id = factory
    ///     .transaction(None, |session| {
    ///         Box::pin(async move {
    ///             session.add(statement);
    ///             Ok::<_, DbError>(42)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, X, F>(&self, bind: Option<&Engine>, body: F) -> Result<T, X>
    where
        X: From<DbError>,
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, X>>,
    {
        let mut session = self.session(bind).map_err(X::from)?;
        let outcome = body(&mut session).await;
        settle(&mut session, outcome).await
    }
}

impl Registry<BlockingEngine> {
    /// Blocking counterpart of [`SessionFactory::transaction`].
    pub fn transaction<T, X, F>(&self, bind: Option<&BlockingEngine>, body: F) -> Result<T, X>
    where
        X: From<DbError>,
        F: FnOnce(&mut BlockingSession) -> Result<T, X>,
    {
        let mut session = self.session(bind).map_err(X::from)?;
        let outcome = body(&mut session);
        let (runtime, inner) = session.split();
        runtime.block_on(settle(inner, outcome))
    }
}

/// Commits or rolls back according to `outcome`, then closes.
pub(crate) async fn settle<T, X>(session: &mut Session, outcome: Result<T, X>) -> Result<T, X>
where
    X: From<DbError>,
{
    let outcome = match outcome {
        Ok(value) => match session.commit().await {
            Ok(()) => Ok(value),
            Err(err) => {
                rollback_quietly(session).await;
                Err(X::from(err))
            }
        },
        Err(err) => {
            rollback_quietly(session).await;
            Err(err)
        }
    };

    if let Err(err) = session.close().await {
        warn!(error = %err, "Failed to close session");
    }

    outcome
}

async fn rollback_quietly(session: &mut Session) {
    if let Err(err) = session.rollback().await {
        warn!(error = %err, "Rollback failed, keeping the original error");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
