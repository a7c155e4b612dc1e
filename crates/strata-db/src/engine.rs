//! # Engines
//!
//! An engine is a connection pool bound to one database URL. Creating one
//! never opens a connection: the pool is lazy and connects on first use.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Engine                                        │
//! │                                                                         │
//! │  create_engine(&EngineConfig)                                          │
//! │       │  url(Driver::Async) + pool_settings()                          │
//! │       ▼                                                                 │
//! │  Engine::from_url_with(url, settings)                                  │
//! │       │  strip "+async", parse, lazy pool                              │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────────────────┐                          │
//! │  │               AnyPool                     │                          │
//! │  │  pool_size + max_overflow connections     │                          │
//! │  │  pre-ping on checkout                     │                          │
//! │  │  recycled after 30 minutes                │                          │
//! │  └──────────────────────────────────────────┘                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Session ──► Session ──► Session   (each borrows one connection        │
//! │                                     while a transaction is open)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Blocking Engines
//! [`BlockingEngine`] wraps the same pool together with a private
//! single-worker Tokio runtime. Callers on plain threads block on that
//! runtime; they must not hold a `BlockingEngine` inside async code.

use sqlx::any::{install_default_drivers, AnyConnectOptions, AnyPoolOptions};
use sqlx::AnyPool;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

use crate::blocking::BlockingSession;
use crate::config::{ConnectionUrl, Dialect, Driver, EngineConfig, PoolSettings};
use crate::error::{DbError, DbResult};
use crate::session::Session;

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    sessions_opened: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    closes: AtomicU64,
}

/// Point-in-time view of an engine's session activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub sessions_opened: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub closes: u64,
    /// Connections currently open, idle or in use.
    pub connections: u32,
    pub idle_connections: usize,
}

impl EngineStats {
    /// Sessions opened but not yet closed.
    pub fn open_sessions(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.closes)
    }
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug)]
struct EngineInner {
    pool: AnyPool,
    dialect: Dialect,
    settings: PoolSettings,
    display_url: String,
    counters: Counters,
}

/// Pooled connection handle for the async driver.
///
/// Cloning is cheap and every clone shares the pool.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine with the pool defaults for the URL's dialect.
    pub fn from_url(url: &str) -> DbResult<Self> {
        let parsed = ConnectionUrl::parse(url)?;
        let settings = default_settings(&parsed);
        Self::build(parsed, settings, Driver::Async)
    }

    /// Creates an engine with explicit pool settings.
    ///
    /// ## Errors
    /// - `Configuration` for an empty or unsupported URL, or a URL that
    ///   selects the blocking driver
    /// - `Runtime` when called outside a Tokio runtime
    pub fn from_url_with(url: &str, settings: PoolSettings) -> DbResult<Self> {
        Self::build(ConnectionUrl::parse(url)?, settings, Driver::Async)
    }

    fn build(parsed: ConnectionUrl, settings: PoolSettings, expected: Driver) -> DbResult<Self> {
        if parsed.driver() != expected {
            return Err(DbError::Configuration(format!(
                "url selects the {} driver, expected {}",
                parsed.driver().tag(),
                expected.tag()
            )));
        }

        // The pool spawns its maintenance task on the current runtime
        Handle::try_current().map_err(|_| {
            DbError::Runtime("engine must be created inside a Tokio runtime".to_string())
        })?;

        install_default_drivers();

        let options = AnyConnectOptions::from_str(parsed.target())
            .map_err(|e| DbError::Configuration(format!("invalid database url: {}", e)))?;

        let pool = pool_options(&parsed, &settings).connect_lazy_with(options);

        let display_url = parsed.redacted();
        info!(
            url = %display_url,
            driver = expected.tag(),
            min_connections = pool.options().get_min_connections(),
            max_connections = pool.options().get_max_connections(),
            "Engine created"
        );

        Ok(Engine {
            inner: Arc::new(EngineInner {
                pool,
                dialect: parsed.dialect(),
                settings,
                display_url,
                counters: Counters::default(),
            }),
        })
    }

    /// Opens a session bound to this engine.
    pub fn session(&self) -> Session {
        Session::new(self.clone(), None)
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn pool_settings(&self) -> PoolSettings {
        self.inner.settings
    }

    /// The connection URL with its password masked.
    pub fn url(&self) -> &str {
        &self.inner.display_url
    }

    pub(crate) fn pool(&self) -> &AnyPool {
        &self.inner.pool
    }

    /// True if both handles share one pool.
    pub fn ptr_eq(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Runs `SELECT 1` on a pooled connection.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(self.pool()).await.is_ok()
    }

    /// Closes every pooled connection. Later checkouts fail.
    pub async fn close(&self) {
        info!(url = %self.inner.display_url, "Closing engine");
        self.inner.pool.close().await;
    }

    pub fn stats(&self) -> EngineStats {
        let counters = &self.inner.counters;
        EngineStats {
            sessions_opened: counters.sessions_opened.load(Ordering::Relaxed),
            commits: counters.commits.load(Ordering::Relaxed),
            rollbacks: counters.rollbacks.load(Ordering::Relaxed),
            closes: counters.closes.load(Ordering::Relaxed),
            connections: self.inner.pool.size(),
            idle_connections: self.inner.pool.num_idle(),
        }
    }

    pub(crate) fn record_open(&self) {
        self.inner.counters.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.inner.counters.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.inner.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self) {
        self.inner.counters.closes.fetch_add(1, Ordering::Relaxed);
    }
}

fn default_settings(parsed: &ConnectionUrl) -> PoolSettings {
    match parsed.dialect() {
        Dialect::Postgres => PoolSettings::default(),
        Dialect::Sqlite => PoolSettings::embedded(parsed.is_memory()),
    }
}

/// Builds an async engine from configuration.
pub fn create_engine(config: &EngineConfig) -> DbResult<Engine> {
    debug!(dialect = ?config.dialect(), "Creating engine from config");
    Engine::from_url_with(&config.url(Driver::Async)?, config.pool_settings())
}

// =============================================================================
// BlockingEngine
// =============================================================================

/// Pooled connection handle for the blocking driver.
///
/// Owns a private runtime; dropping the last clone shuts it down, which
/// panics if done from inside another runtime.
#[derive(Debug, Clone)]
pub struct BlockingEngine {
    engine: Engine,
    runtime: Arc<Runtime>,
}

impl BlockingEngine {
    pub fn from_url(url: &str) -> DbResult<Self> {
        let parsed = ConnectionUrl::parse(url)?;
        let settings = default_settings(&parsed);
        Self::build(parsed, settings)
    }

    pub fn from_url_with(url: &str, settings: PoolSettings) -> DbResult<Self> {
        Self::build(ConnectionUrl::parse(url)?, settings)
    }

    fn build(parsed: ConnectionUrl, settings: PoolSettings) -> DbResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("strata-blocking")
            .enable_all()
            .build()
            .map_err(|e| DbError::Runtime(e.to_string()))?;

        let engine = {
            let _guard = runtime.enter();
            Engine::build(parsed, settings, Driver::Blocking)?
        };

        Ok(BlockingEngine {
            engine,
            runtime: Arc::new(runtime),
        })
    }

    /// Opens a blocking session bound to this engine.
    pub fn session(&self) -> BlockingSession {
        BlockingSession::new(self.runtime.clone(), self.engine.session())
    }

    /// The async engine sharing this pool.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn ptr_eq(&self, other: &BlockingEngine) -> bool {
        self.engine.ptr_eq(&other.engine)
    }

    pub fn health_check(&self) -> bool {
        self.runtime.block_on(self.engine.health_check())
    }

    pub fn close(&self) {
        self.runtime.block_on(self.engine.close());
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }
}

/// Builds a blocking engine from configuration.
pub fn create_blocking_engine(config: &EngineConfig) -> DbResult<BlockingEngine> {
    debug!(dialect = ?config.dialect(), "Creating blocking engine from config");
    BlockingEngine::from_url_with(&config.url(Driver::Blocking)?, config.pool_settings())
}

/// Translates pool settings into sqlx options.
///
/// An in-memory SQLite database lives exactly as long as its connection, so
/// that connection is opened eagerly and never recycled or reaped.
fn pool_options(url: &ConnectionUrl, settings: &PoolSettings) -> AnyPoolOptions {
    let options = AnyPoolOptions::new()
        .max_connections(settings.max_connections())
        .acquire_timeout(settings.acquire_timeout())
        .test_before_acquire(settings.pre_ping);

    if url.is_memory() {
        options
            .min_connections(1)
            .max_lifetime(None::<Duration>)
            .idle_timeout(None::<Duration>)
    } else {
        options
            .min_connections(settings.pool_size.min(settings.max_connections()))
            .max_lifetime(settings.recycle())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
