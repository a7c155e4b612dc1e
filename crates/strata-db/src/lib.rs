//! # strata-db: Database Layer for Strata
//!
//! Engines, scoped transactional sessions and generic repositories over
//! PostgreSQL and SQLite, with async and blocking variants.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Strata Data Flow                                │
//! │                                                                         │
//! │  Settings::load(files + STRATA__ env)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    strata-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐    ┌──────────────┐    ┌───────────────┐   │   │
//! │  │   │ EngineConfig │───►│   Registry   │───►│    Session    │   │   │
//! │  │   │ (config.rs)  │    │ (registry.rs)│    │ (session.rs)  │   │   │
//! │  │   │              │    │              │    │               │   │   │
//! │  │   │ url(Driver)  │    │ current      │    │ staged writes │   │   │
//! │  │   │ pool sizes   │    │ replica      │    │ lazy BEGIN    │   │   │
//! │  │   └──────────────┘    └──────────────┘    └───────┬───────┘   │   │
//! │  │                                                    │           │   │
//! │  │                                   ┌────────────────▼────────┐  │   │
//! │  │                                   │  Repository<'s, M>      │  │   │
//! │  │                                   │  (repository/)          │  │   │
//! │  │                                   └─────────────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sqlx AnyPool ──► PostgreSQL | SQLite                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Dialect configuration and connection URLs
//! - [`engine`] - Lazily connecting pools, async and blocking
//! - [`registry`] - Current engine, replica and scoped transactions
//! - [`session`] / [`blocking`] - Units of work
//! - [`repository`] - Generic CRUD over an [`Entity`]
//! - [`settings`] - Layered settings files
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_db::{Repository, Select, SessionFactory, Settings};
//!
//! let settings = Settings::load(&["strata.toml"])?;
//! let factory = SessionFactory::new();
//! factory.create_and_set_engine(settings.require_db()?)?;
//!
//! let notes = strata_db::with_repository::<Note, _, DbError, _>(&factory, |repo| {
//!     Box::pin(async move { repo.readall(Select::new().filter_by("title", "groceries")).await })
//! })
//! .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod blocking;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod registry;
pub mod repository;
pub mod session;
pub mod settings;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use blocking::BlockingSession;
pub use config::{Dialect, Driver, EngineConfig, EngineConfigBuilder, PoolSettings};
pub use engine::{create_blocking_engine, create_engine, BlockingEngine, Engine, EngineStats};
pub use entity::{Entity, ModelClass};
pub use error::{DbError, DbResult};
pub use registry::{BlockingSessionFactory, EngineHandle, Registry, SessionFactory};
pub use repository::{
    with_blocking_repository, with_repository, BlockingRepository, HasMany, Relation, Repository,
    Rows, Select,
};
pub use session::Session;
pub use settings::Settings;

// Query building lives in strata-core
pub use strata_core::{Cache, Clause, Filter, Operator, Order, Statement, Value};
